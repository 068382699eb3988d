//! In-process `RemoteClient` double for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::remote::{
    AssistantReply, FoodItemPayload, MacroTargetsDto, MealDto, MealPayload, RemoteClient, RemoteError, WaterDto,
    WaterPayload, WeightDto, WeightPayload, WorkoutLogDto, WorkoutLogPayload, WorkoutPlanDto,
};

/// Answers from canned data and records every call as `"op"` or `"op:id"`.
/// Unknown fetches answer 404; creates echo the payload under a fresh id.
#[derive(Default)]
pub struct ScriptedRemote {
    meals: Mutex<HashMap<String, Result<MealDto, RemoteError>>>,
    logs: Mutex<HashMap<String, Result<WorkoutLogDto, RemoteError>>>,
    plans: Mutex<HashMap<String, Result<WorkoutPlanDto, RemoteError>>>,
    targets: Mutex<Option<Result<Option<MacroTargetsDto>, RemoteError>>>,
    replies: Mutex<Vec<Result<AssistantReply, RemoteError>>>,
    create_error: Mutex<Option<RemoteError>>,
    delete_error: Mutex<Option<RemoteError>>,
    delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<String>>,
    next_id: AtomicUsize,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_meal(self, dto: MealDto) -> Self {
        self.meals.lock().unwrap().insert(dto.id.clone(), Ok(dto));
        self
    }

    pub fn with_meal_error(self, id: &str, err: RemoteError) -> Self {
        self.meals.lock().unwrap().insert(id.to_string(), Err(err));
        self
    }

    pub fn with_workout_log(self, dto: WorkoutLogDto) -> Self {
        self.logs.lock().unwrap().insert(dto.id.clone(), Ok(dto));
        self
    }

    pub fn with_workout_plan(self, dto: WorkoutPlanDto) -> Self {
        self.plans.lock().unwrap().insert(dto.id.clone(), Ok(dto));
        self
    }

    pub fn with_targets(self, answer: Result<Option<MacroTargetsDto>, RemoteError>) -> Self {
        *self.targets.lock().unwrap() = Some(answer);
        self
    }

    /// Replies are handed out in the order they were added.
    pub fn with_reply(self, reply: Result<AssistantReply, RemoteError>) -> Self {
        self.replies.lock().unwrap().push(reply);
        self
    }

    pub fn failing_creates(self, err: RemoteError) -> Self {
        *self.create_error.lock().unwrap() = Some(err);
        self
    }

    pub fn failing_deletes(self, err: RemoteError) -> Self {
        *self.delete_error.lock().unwrap() = Some(err);
        self
    }

    /// Every call sleeps this long first (pair with a paused tokio clock).
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    async fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn fresh_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn create_error(&self) -> Option<RemoteError> {
        self.create_error.lock().unwrap().clone()
    }

    fn not_found() -> RemoteError {
        RemoteError::Http {
            status: 404,
            body: "not found".to_string(),
        }
    }
}

#[async_trait]
impl RemoteClient for ScriptedRemote {
    async fn send_chat_message(
        &self,
        text: &str,
        conversation_id: Option<&str>,
    ) -> Result<AssistantReply, RemoteError> {
        self.record(format!(
            "send_chat_message:{text}:{}",
            conversation_id.unwrap_or("-")
        ))
        .await;
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Ok(AssistantReply::default());
        }
        replies.remove(0)
    }

    async fn fetch_meal(&self, id: &str) -> Result<MealDto, RemoteError> {
        self.record(format!("fetch_meal:{id}")).await;
        let meals = self.meals.lock().unwrap();
        meals.get(id).cloned().unwrap_or_else(|| Err(Self::not_found()))
    }

    async fn fetch_workout_log(&self, id: &str) -> Result<WorkoutLogDto, RemoteError> {
        self.record(format!("fetch_workout_log:{id}")).await;
        let logs = self.logs.lock().unwrap();
        logs.get(id).cloned().unwrap_or_else(|| Err(Self::not_found()))
    }

    async fn fetch_workout_plan(&self, id: &str) -> Result<WorkoutPlanDto, RemoteError> {
        self.record(format!("fetch_workout_plan:{id}")).await;
        let plans = self.plans.lock().unwrap();
        plans.get(id).cloned().unwrap_or_else(|| Err(Self::not_found()))
    }

    async fn fetch_macro_targets(&self) -> Result<Option<MacroTargetsDto>, RemoteError> {
        self.record("fetch_macro_targets".to_string()).await;
        self.targets.lock().unwrap().clone().unwrap_or(Ok(None))
    }

    async fn create_meal(&self, payload: &MealPayload) -> Result<MealDto, RemoteError> {
        self.record("create_meal".to_string()).await;
        if let Some(err) = self.create_error() {
            return Err(err);
        }
        let items: Vec<_> = payload
            .items
            .iter()
            .map(|i| {
                json!({
                    "name": i.name, "source": i.source, "grams": i.grams,
                    "calories": i.calories, "protein_g": i.protein_g,
                    "carbs_g": i.carbs_g, "fat_g": i.fat_g,
                })
            })
            .collect();
        let sum = |f: fn(&FoodItemPayload) -> f64| payload.items.iter().map(f).sum::<f64>();
        serde_json::from_value(json!({
            "id": self.fresh_id("meal"),
            "name": payload.name,
            "meal_type": payload.meal_type,
            "timestamp": payload.timestamp.to_rfc3339(),
            "notes": payload.notes,
            "total_calories": sum(|i| i.calories as f64),
            "total_protein_g": sum(|i| i.protein_g),
            "total_carbs_g": sum(|i| i.carbs_g),
            "total_fat_g": sum(|i| i.fat_g),
            "items": items,
        }))
        .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    async fn create_workout_log(
        &self,
        payload: &WorkoutLogPayload,
    ) -> Result<WorkoutLogDto, RemoteError> {
        self.record("create_workout_log".to_string()).await;
        if let Some(err) = self.create_error() {
            return Err(err);
        }
        serde_json::from_value(json!({
            "id": self.fresh_id("log"),
            "plan_id": payload.plan_id,
            "name": payload.name,
            "workout_type": payload.workout_type,
            "source": payload.source,
            "start_time": payload.start_time.to_rfc3339(),
            "duration_min": payload.duration_min,
            "sets": payload.sets,
        }))
        .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    async fn create_water_entry(&self, payload: &WaterPayload) -> Result<WaterDto, RemoteError> {
        self.record("create_water_entry".to_string()).await;
        if let Some(err) = self.create_error() {
            return Err(err);
        }
        Ok(WaterDto {
            id: self.fresh_id("water"),
            amount_ml: payload.amount_ml,
            timestamp: Some(payload.timestamp.to_rfc3339()),
            source: Some(payload.source.clone()),
        })
    }

    async fn create_weight_entry(&self, payload: &WeightPayload) -> Result<WeightDto, RemoteError> {
        self.record("create_weight_entry".to_string()).await;
        if let Some(err) = self.create_error() {
            return Err(err);
        }
        Ok(WeightDto {
            id: self.fresh_id("weight"),
            weight_kg: payload.weight_kg,
            timestamp: Some(payload.timestamp.to_rfc3339()),
            notes: payload.notes.clone(),
            source: Some(payload.source.clone()),
        })
    }

    async fn delete_meal(&self, id: &str) -> Result<(), RemoteError> {
        self.record(format!("delete_meal:{id}")).await;
        self.delete_error.lock().unwrap().clone().map_or(Ok(()), Err)
    }

    async fn delete_workout_log(&self, id: &str) -> Result<(), RemoteError> {
        self.record(format!("delete_workout_log:{id}")).await;
        self.delete_error.lock().unwrap().clone().map_or(Ok(()), Err)
    }

    async fn delete_workout_plan(&self, id: &str) -> Result<(), RemoteError> {
        self.record(format!("delete_workout_plan:{id}")).await;
        self.delete_error.lock().unwrap().clone().map_or(Ok(()), Err)
    }
}
