//! Staged initial loading.
//!
//! A [`LoadPlan`] is an ordered list of `{at, step}` pairs. Stages at offset
//! zero run one after another and gate the "initial data loaded" signal;
//! every other stage is spawned on its own timer measured from the start of
//! the load, so a slow early stage does not push back the later ones.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::SyncSettings;
use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStep {
    Familles,
    ArticlesFirstPage,
    Medicaments,
    Medecins,
    Ordonnances,
    Statistiques,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    /// Offset from the start of the load
    pub at: Duration,
    pub step: LoadStep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPlan {
    stages: Vec<Stage>,
}

impl LoadPlan {
    /// Stages sorted by offset; ties keep their given order
    pub fn new(mut stages: Vec<Stage>) -> Self {
        stages.sort_by_key(|s| s.at);
        Self { stages }
    }

    pub fn from_settings(settings: &SyncSettings) -> Self {
        let delays = &settings.delays;
        let stage = |ms: u64, step| Stage {
            at: Duration::from_millis(ms),
            step,
        };
        Self::new(vec![
            stage(0, LoadStep::Familles),
            stage(0, LoadStep::ArticlesFirstPage),
            stage(delays.medicaments_ms, LoadStep::Medicaments),
            stage(delays.medecins_ms, LoadStep::Medecins),
            stage(delays.ordonnances_ms, LoadStep::Ordonnances),
            stage(delays.statistiques_ms, LoadStep::Statistiques),
        ])
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }
}

/// What the loader drives. `SyncContext` is the production runner.
#[async_trait]
pub trait StageRunner: Send + Sync + 'static {
    async fn run(&self, step: LoadStep) -> Result<(), SyncError>;

    /// Called once every zero-offset stage has resolved, failed or not
    fn on_initial_ready(&self);
}

/// Tasks of one staged load.
pub struct LoadHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl LoadHandle {
    /// Stop every stage that has not finished
    pub fn abort(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }

    /// Handles that can stop the stages without owning the load
    pub fn abort_handles(&self) -> Vec<AbortHandle> {
        self.tasks.iter().map(JoinHandle::abort_handle).collect()
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(|t| t.is_finished())
    }

    /// Wait for every stage to finish
    pub async fn wait(self) {
        for result in futures::future::join_all(self.tasks).await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    warn!(error = %e, "Load stage task failed");
                }
            }
        }
    }
}

async fn run_stage<R: StageRunner>(runner: &R, step: LoadStep) {
    debug!(?step, "Stage starting");
    match runner.run(step).await {
        Ok(()) => debug!(?step, "Stage done"),
        // Failures already sit in the category's error slot
        Err(e) => warn!(?step, error = %e, "Stage failed"),
    }
}

/// Start `plan` on the current runtime.
pub fn start<R: StageRunner>(plan: &LoadPlan, runner: Arc<R>) -> LoadHandle {
    let started = Instant::now();
    let (immediate, deferred): (Vec<Stage>, Vec<Stage>) =
        plan.stages().iter().partition(|s| s.at.is_zero());
    info!(
        immediate = immediate.len(),
        deferred = deferred.len(),
        "Starting staged load"
    );

    let mut tasks = Vec::with_capacity(deferred.len() + 1);

    let first = Arc::clone(&runner);
    tasks.push(tokio::spawn(async move {
        for stage in immediate {
            run_stage(first.as_ref(), stage.step).await;
        }
        first.on_initial_ready();
    }));

    for stage in deferred {
        let runner = Arc::clone(&runner);
        tasks.push(tokio::spawn(async move {
            sleep_until(started + stage.at).await;
            run_stage(runner.as_ref(), stage.step).await;
        }));
    }

    LoadHandle { tasks }
}
