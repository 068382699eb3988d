//! Outbound sync of optimistic local records, and remote-first deletion.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::issue::Issue;
use crate::remote::{
    MealPayload, RemoteClient, RemoteError, WaterPayload, WeightPayload, WorkoutLogPayload,
};
use crate::session::{Session, SharedDatabase, lock};

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub pushed: usize,
    pub failed: usize,
    pub issues: Vec<Issue>,
    pub unauthorized: bool,
}

impl SyncReport {
    fn failed(&mut self, kind: &'static str, err: RemoteError) {
        tracing::warn!(kind, error = %err, "push failed, record stays unsynced");
        self.failed += 1;
        self.unauthorized |= err.is_unauthorized();
        self.issues.push(Issue::Fetch {
            kind,
            remote_id: None,
            source: err,
        });
    }

    /// Record the local write that follows a successful create. The server
    /// copy exists either way; a failed write leaves the row unsynced.
    fn stored<T>(&mut self, kind: &'static str, result: Result<T>) {
        match result {
            Ok(_) => self.pushed += 1,
            Err(err) => {
                tracing::warn!(kind, error = %format!("{err:#}"), "local write after push failed");
                self.failed += 1;
                self.issues.push(Issue::store(kind, &err));
            }
        }
    }
}

pub struct Syncer {
    db: SharedDatabase,
    remote: Arc<dyn RemoteClient>,
    timeout: Duration,
}

impl Syncer {
    pub fn new(db: SharedDatabase, remote: Arc<dyn RemoteClient>, timeout: Duration) -> Self {
        Self { db, remote, timeout }
    }

    async fn call<T, F>(&self, fut: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .unwrap_or(Err(RemoteError::Timeout))
    }

    /// Push every unsynced meal, water entry, weight entry and workout log,
    /// oldest first. Each success replaces the local row with the server copy.
    pub async fn push_pending(&self, session: &Session) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let user_id = session.user_id.as_str();

        let meals = lock(&self.db)?.list_unsynced_meals(user_id)?;
        for meal in meals {
            match self.call(self.remote.create_meal(&MealPayload::from(&meal))).await {
                Ok(dto) => {
                    let merged = lock(&self.db)
                        .and_then(|db| db.replace_meal(meal.id, &dto.into_new_meal()));
                    report.stored("create_meal", merged);
                }
                Err(err) => report.failed("create_meal", err),
            }
        }

        let water = lock(&self.db)?.list_unsynced_water_entries(user_id)?;
        for entry in water {
            match self.call(self.remote.create_water_entry(&WaterPayload::from(&entry))).await {
                Ok(dto) => {
                    let merged = lock(&self.db)
                        .and_then(|db| db.replace_water_entry(entry.id, &dto.into_new_water_entry()));
                    report.stored("create_water_entry", merged);
                }
                Err(err) => report.failed("create_water_entry", err),
            }
        }

        let weights = lock(&self.db)?.list_unsynced_weight_entries(user_id)?;
        for entry in weights {
            match self.call(self.remote.create_weight_entry(&WeightPayload::from(&entry))).await {
                Ok(dto) => {
                    let merged = lock(&self.db)
                        .and_then(|db| db.replace_weight_entry(entry.id, &dto.into_new_weight_entry()));
                    report.stored("create_weight_entry", merged);
                }
                Err(err) => report.failed("create_weight_entry", err),
            }
        }

        let logs = lock(&self.db)?.list_unsynced_workout_logs(user_id)?;
        for log in logs {
            match self.call(self.remote.create_workout_log(&WorkoutLogPayload::from(&log))).await {
                Ok(dto) => {
                    let merged = lock(&self.db)
                        .and_then(|db| db.replace_workout_log(log.id, &dto.into_new_workout_log()));
                    report.stored("create_workout_log", merged);
                }
                Err(err) => report.failed("create_workout_log", err),
            }
        }

        tracing::info!(pushed = report.pushed, failed = report.failed, "sync pass finished");
        Ok(report)
    }

    /// Delete remotely first, then locally. A 404 counts as already deleted.
    pub async fn delete_meal(&self, id: i64) -> Result<bool> {
        let remote_id = lock(&self.db)?.get_meal(id)?.remote_id;
        if let Some(remote_id) = remote_id {
            self.delete_remote(self.remote.delete_meal(&remote_id))
                .await
                .with_context(|| format!("Failed to delete meal {remote_id} on the server"))?;
        }
        lock(&self.db)?.delete_meal(id)
    }

    pub async fn delete_workout_log(&self, id: i64) -> Result<bool> {
        let remote_id = lock(&self.db)?.get_workout_log(id)?.remote_id;
        if let Some(remote_id) = remote_id {
            self.delete_remote(self.remote.delete_workout_log(&remote_id))
                .await
                .with_context(|| format!("Failed to delete workout {remote_id} on the server"))?;
        }
        lock(&self.db)?.delete_workout_log(id)
    }

    pub async fn delete_workout_plan(&self, id: i64) -> Result<bool> {
        let remote_id = lock(&self.db)?.get_workout_plan(id)?.remote_id;
        if let Some(remote_id) = remote_id {
            self.delete_remote(self.remote.delete_workout_plan(&remote_id))
                .await
                .with_context(|| format!("Failed to delete plan {remote_id} on the server"))?;
        }
        lock(&self.db)?.delete_workout_plan(id)
    }

    async fn delete_remote<F>(&self, fut: F) -> Result<(), RemoteError>
    where
        F: Future<Output = Result<(), RemoteError>>,
    {
        match self.call(fut).await {
            Err(err) if err.is_not_found() => {
                tracing::debug!("remote record already gone");
                Ok(())
            }
            other => other,
        }
    }
}
