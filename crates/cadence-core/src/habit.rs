use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::tags;

/// How often a habit is meant to be completed. Determines the shape of its
/// period keys, so changing it invalidates all prior completion history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Default for Frequency {
    fn default() -> Self {
        Self::Daily
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
            Self::Monthly => write!(f, "monthly"),
        }
    }
}

impl std::str::FromStr for Frequency {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(format!("unknown frequency: {other}")),
        }
    }
}

/// A habit's identity: a stable integer issued by the remote store, or an
/// `offline-<millis>` placeholder assigned locally before first sync.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HabitId {
    Remote(i64),
    Offline(String),
}

impl HabitId {
    /// Mint a fresh offline id. Stable for the habit's whole pre-sync life,
    /// which is what makes create retries duplicate-free.
    pub fn offline_now() -> Self {
        Self::Offline(format!("offline-{}", Utc::now().timestamp_millis()))
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline(_))
    }

    /// The server-issued id, if this habit has one.
    pub fn remote(&self) -> Option<i64> {
        match self {
            Self::Remote(id) => Some(*id),
            Self::Offline(_) => None,
        }
    }
}

impl std::fmt::Display for HabitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote(id) => write!(f, "{id}"),
            Self::Offline(s) => write!(f, "{s}"),
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// A habit record as cached locally and as returned by the remote store.
///
/// `streak_count`, `completed_today`, and `total_completions` are derived
/// from completion history at read time; they are display values, never a
/// source of truth. `deleted`/`updated` are local-only dirty flags and are
/// omitted from serialization once clean.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    pub id: HabitId,
    pub title: String,
    pub frequency: Frequency,
    #[serde(default, deserialize_with = "tags::deserialize")]
    pub tags: Vec<String>,
    pub created_at: String,
    #[serde(default)]
    pub streak_count: u32,
    #[serde(default)]
    pub completed_today: bool,
    #[serde(default)]
    pub total_completions: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub updated: bool,
}

impl Habit {
    /// A freshly created offline habit: temporary id, creation time stamped
    /// client-side, no dirty flags (offline identity itself marks it for
    /// creation).
    pub fn new_offline(title: String, frequency: Frequency, tags: Vec<String>) -> Self {
        Self {
            id: HabitId::offline_now(),
            title,
            frequency,
            tags,
            created_at: Utc::now().to_rfc3339(),
            streak_count: 0,
            completed_today: false,
            total_completions: 0,
            deleted: false,
            updated: false,
        }
    }

    pub fn is_clean(&self) -> bool {
        !self.deleted && !self.updated && !self.id.is_offline()
    }
}

/// One completion row, uniquely keyed by `(habit_id, period_key)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub habit_id: HabitId,
    #[serde(rename = "date")]
    pub period_key: String,
    pub completed: bool,
}

/// A completion recorded while offline, queued for the next sync pass.
///
/// Carries `frequency` explicitly: the owning habit may not be resolvable
/// from the local cache by the time the queue is flushed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingCompletion {
    pub habit_id: HabitId,
    #[serde(rename = "date")]
    pub period_key: String,
    pub completed: bool,
    #[serde(default)]
    pub frequency: Option<Frequency>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_roundtrip() {
        for f in [Frequency::Daily, Frequency::Weekly, Frequency::Monthly] {
            let s = f.to_string();
            assert_eq!(s.parse::<Frequency>().unwrap(), f);
        }
        assert!("yearly".parse::<Frequency>().is_err());
    }

    #[test]
    fn habit_id_untagged_serde() {
        let remote: HabitId = serde_json::from_str("42").unwrap();
        assert_eq!(remote, HabitId::Remote(42));
        assert!(!remote.is_offline());

        let offline: HabitId = serde_json::from_str("\"offline-1700000000000\"").unwrap();
        assert!(offline.is_offline());
        assert_eq!(offline.remote(), None);

        assert_eq!(serde_json::to_string(&HabitId::Remote(7)).unwrap(), "7");
    }

    #[test]
    fn offline_id_format() {
        let id = HabitId::offline_now();
        match &id {
            HabitId::Offline(s) => assert!(s.starts_with("offline-")),
            HabitId::Remote(_) => panic!("expected offline id"),
        }
    }

    #[test]
    fn clean_habit_omits_dirty_flags() {
        let mut habit = Habit::new_offline("Read".into(), Frequency::Daily, vec!["learning".into()]);
        habit.id = HabitId::Remote(1);
        let json = serde_json::to_string(&habit).unwrap();
        assert!(!json.contains("deleted"));
        assert!(!json.contains("updated"));

        habit.deleted = true;
        let json = serde_json::to_string(&habit).unwrap();
        assert!(json.contains("\"deleted\":true"));
    }

    #[test]
    fn habit_tolerates_missing_derived_fields() {
        let habit: Habit = serde_json::from_str(
            r#"{"id":3,"title":"Run","frequency":"weekly","tags":["fitness"],"created_at":"2025-06-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(habit.streak_count, 0);
        assert!(!habit.completed_today);
        assert!(habit.is_clean());
    }

    #[test]
    fn habit_parses_stringified_tags() {
        let habit: Habit = serde_json::from_str(
            r#"{"id":3,"title":"Run","frequency":"daily","tags":"[\"a\",\"b\"]","created_at":"x"}"#,
        )
        .unwrap();
        assert_eq!(habit.tags, vec!["a", "b"]);
    }
}
