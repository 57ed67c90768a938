use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use cadence_core::Habit;

use crate::error::RemoteError;
use crate::service::{
    CompletionService, CompletionUpsert, HabitPatch, HabitService, HabitStats, NewHabit, UpsertAck,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Reqwest-backed client for the remote habit API described in the server's
/// REST surface. One instance per base URL; cheap to clone.
#[derive(Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
    token: Option<SecretString>,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>, token: Option<SecretString>) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self.client.request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {}", token.expose_secret()));
        }
        req.header("accept", "application/json")
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, RemoteError> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::from_status(status.as_u16(), body));
        }
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| RemoteError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl HabitService for HttpRemote {
    async fn list(&self) -> Result<Vec<Habit>, RemoteError> {
        self.send(self.request(Method::GET, "/habits")).await
    }

    async fn create(&self, habit: NewHabit) -> Result<Habit, RemoteError> {
        self.send(self.request(Method::POST, "/habits").json(&habit))
            .await
    }

    async fn update(&self, id: i64, patch: HabitPatch) -> Result<Habit, RemoteError> {
        self.send(self.request(Method::PUT, &format!("/habits/{id}")).json(&patch))
            .await
    }

    async fn delete(&self, id: i64) -> Result<(), RemoteError> {
        // Success body is an indicator object; only the status matters here.
        let _: serde_json::Value = self
            .send(self.request(Method::DELETE, &format!("/habits/{id}")))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CompletionService for HttpRemote {
    async fn upsert(&self, completion: CompletionUpsert) -> Result<UpsertAck, RemoteError> {
        self.send(self.request(Method::POST, "/completions").json(&completion))
            .await
    }

    async fn stats(&self, habit_id: i64) -> Result<HabitStats, RemoteError> {
        self.send(self.request(Method::GET, &format!("/completions/stats/{habit_id}")))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let remote = HttpRemote::new("http://localhost:3000/", None);
        assert_eq!(remote.base_url, "http://localhost:3000");
    }

    #[test]
    fn upsert_body_uses_wire_field_names() {
        let body = CompletionUpsert {
            habit_id: 4,
            period_key: "2025-W23".into(),
            completed: true,
            frequency: cadence_core::Frequency::Weekly,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"date\":\"2025-W23\""));
        assert!(json.contains("\"frequency\":\"weekly\""));
        assert!(!json.contains("period_key"));
    }
}
