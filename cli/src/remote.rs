use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;

use ada_core::remote::{
    AssistantReply, MacroTargetsDto, MealDto, MealPayload, RemoteClient, RemoteError, WaterDto,
    WaterPayload, WeightDto, WeightPayload, WorkoutLogDto, WorkoutLogPayload, WorkoutPlanDto,
};

/// The backend's REST API, authenticated with a bearer token.
pub struct HttpRemoteClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpRemoteClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(format!("ada-cli/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, RemoteError> {
        let resp = builder.send().await.map_err(transport_error)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(RemoteError::Unauthorized);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(RemoteError::Http {
            status: status.as_u16(),
            body,
        })
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, RemoteError> {
        let bytes = self
            .send(builder)
            .await?
            .bytes()
            .await
            .map_err(transport_error)?;
        serde_json::from_slice(&bytes).map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        self.send(self.request(Method::DELETE, path)).await?;
        Ok(())
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else if err.is_decode() {
        RemoteError::InvalidResponse(err.to_string())
    } else {
        RemoteError::Network(err.to_string())
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn send_chat_message(
        &self,
        text: &str,
        conversation_id: Option<&str>,
    ) -> Result<AssistantReply, RemoteError> {
        let body = json!({ "message": text, "conversation_id": conversation_id });
        self.json(self.request(Method::POST, "/ai/chat").json(&body))
            .await
    }

    async fn fetch_meal(&self, id: &str) -> Result<MealDto, RemoteError> {
        self.json(self.request(Method::GET, &format!("/nutrition/meals/{id}")))
            .await
    }

    async fn fetch_workout_log(&self, id: &str) -> Result<WorkoutLogDto, RemoteError> {
        self.json(self.request(Method::GET, &format!("/workouts/logs/{id}")))
            .await
    }

    async fn fetch_workout_plan(&self, id: &str) -> Result<WorkoutPlanDto, RemoteError> {
        self.json(self.request(Method::GET, &format!("/workouts/plans/{id}")))
            .await
    }

    async fn fetch_macro_targets(&self) -> Result<Option<MacroTargetsDto>, RemoteError> {
        match self.json(self.request(Method::GET, "/user/targets")).await {
            Err(err) if err.is_not_found() => Ok(None),
            other => other,
        }
    }

    async fn create_meal(&self, payload: &MealPayload) -> Result<MealDto, RemoteError> {
        self.json(self.request(Method::POST, "/nutrition/meals").json(payload))
            .await
    }

    async fn create_workout_log(
        &self,
        payload: &WorkoutLogPayload,
    ) -> Result<WorkoutLogDto, RemoteError> {
        self.json(self.request(Method::POST, "/workouts/logs").json(payload))
            .await
    }

    async fn create_water_entry(&self, payload: &WaterPayload) -> Result<WaterDto, RemoteError> {
        self.json(self.request(Method::POST, "/tracking/water").json(payload))
            .await
    }

    async fn create_weight_entry(
        &self,
        payload: &WeightPayload,
    ) -> Result<WeightDto, RemoteError> {
        self.json(self.request(Method::POST, "/tracking/weight").json(payload))
            .await
    }

    async fn delete_meal(&self, id: &str) -> Result<(), RemoteError> {
        self.delete(&format!("/nutrition/meals/{id}")).await
    }

    async fn delete_workout_log(&self, id: &str) -> Result<(), RemoteError> {
        self.delete(&format!("/workouts/logs/{id}")).await
    }

    async fn delete_workout_plan(&self, id: &str) -> Result<(), RemoteError> {
        self.delete(&format!("/workouts/plans/{id}")).await
    }
}
