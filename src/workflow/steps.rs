use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::db::DbHandle;

/// Memoizes named steps of one workflow run in the step journal.
///
/// Every call to [`StepContext::run`] gets a deterministic id: the step name
/// on first use, then `name:1`, `name:2`, ... for repeated uses within the
/// same execution. When the journal already holds an output for that id the
/// recorded value is returned and the closure never runs, so re-executing a
/// run replays completed steps instead of repeating their side effects.
pub struct StepContext {
    run_id: i64,
    db: DbHandle,
    counters: Mutex<HashMap<String, usize>>,
}

impl StepContext {
    pub fn new(run_id: i64, db: DbHandle) -> Self {
        Self {
            run_id,
            db,
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    fn next_id(&self, name: &str) -> String {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let count = counters.entry(name.to_string()).or_insert(0);
        let id = if *count == 0 {
            name.to_string()
        } else {
            format!("{}:{}", name, count)
        };
        *count += 1;
        id
    }

    async fn recorded<T: DeserializeOwned>(&self, step_id: &str) -> Result<Option<T>> {
        let run_id = self.run_id;
        let lookup_id = step_id.to_string();
        let recorded = self
            .db
            .call(move |db| db.get_step(run_id, &lookup_id))
            .await?;
        let Some(json) = recorded else {
            return Ok(None);
        };
        debug!(run_id, step = %step_id, "Replaying step from journal");
        serde_json::from_str(&json)
            .map(Some)
            .with_context(|| format!("Failed to decode recorded output of step '{}'", step_id))
    }

    /// Run `f` as a checkpointed step, or replay its recorded output.
    pub async fn run<T, F, Fut>(&self, name: &str, f: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let step_id = self.next_id(name);
        if let Some(value) = self.recorded(&step_id).await? {
            return Ok(value);
        }

        let run_id = self.run_id;
        let value = f().await.with_context(|| format!("Step '{}' failed", step_id))?;
        let json = serde_json::to_string(&value)
            .with_context(|| format!("Failed to encode output of step '{}'", step_id))?;
        let save_id = step_id.clone();
        self.db
            .call(move |db| db.save_step(run_id, &save_id, &json))
            .await?;
        debug!(run_id, step = %step_id, "Step recorded");
        Ok(value)
    }

    /// Like [`StepContext::run`] for a step whose effect is a database write.
    ///
    /// `f` gets the step id and must record it in the same transaction as
    /// its own writes, so the write and its checkpoint commit together.
    pub async fn run_atomic<T, F, Fut>(&self, name: &str, f: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let step_id = self.next_id(name);
        if let Some(value) = self.recorded(&step_id).await? {
            return Ok(value);
        }

        let value = f(step_id.clone())
            .await
            .with_context(|| format!("Step '{}' failed", step_id))?;
        debug!(run_id = self.run_id, step = %step_id, "Step recorded");
        Ok(value)
    }
}
