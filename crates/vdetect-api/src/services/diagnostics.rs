//! Five-step model diagnostics.
//!
//! Walks the model loading path stage by stage so a failure can be pinned
//! on the right step: environment, repository access, download, manifest
//! import, engine load. Steps advance strictly in order and the run stops
//! at the first error, leaving later steps `pending`. Runs are serialized.
//!
//! Steps 3-5 are one load driven by the engine under its load lock, so a
//! pass never downloads or constructs alongside an in-flight load; when one
//! is running, the pass reports that load's stages instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use vdetect_engine::{
    EngineError, EngineResult, InferenceEngine, LoadObserver, LoadStage, StageRecord,
};
use vdetect_models::{DiagnosticStep, DiagnosticsReport, StepId, StepStatus};

use crate::metrics;

/// A second run was requested while one is in progress.
#[derive(Debug, Clone, Copy, Error)]
#[error("A diagnostics run is already in progress")]
pub struct DiagnosticsBusy;

/// Runs the diagnostics pass against one engine.
pub struct DiagnosticsRunner {
    engine: Option<Arc<InferenceEngine>>,
    /// Why the engine could not be constructed, when it wasn't
    construction_error: Option<String>,
    steps: Mutex<Vec<DiagnosticStep>>,
    running: AtomicBool,
}

/// Clears the busy flag even if the run future is dropped.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl DiagnosticsRunner {
    pub fn new(engine: Option<Arc<InferenceEngine>>, construction_error: Option<String>) -> Self {
        Self {
            engine,
            construction_error,
            steps: Mutex::new(DiagnosticStep::initial_list()),
            running: AtomicBool::new(false),
        }
    }

    fn lock_steps(&self) -> MutexGuard<'_, Vec<DiagnosticStep>> {
        self.steps.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Current step list, for polling an in-flight run.
    pub fn steps(&self) -> Vec<DiagnosticStep> {
        self.lock_steps().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn set_step(&self, id: StepId, status: StepStatus, detail: Option<String>) {
        let mut steps = self.lock_steps();
        if let Some(step) = steps.iter_mut().find(|s| s.id == id) {
            step.status = status;
            step.detail = detail;
        }
    }

    fn begin(&self, id: StepId) {
        info!(step = id.as_str(), number = id.number(), "Diagnostic step started");
        self.set_step(id, StepStatus::Running, None);
    }

    /// Record a step's outcome, returning the value on success.
    fn settle<T>(
        &self,
        id: StepId,
        result: EngineResult<T>,
        detail: impl FnOnce(&T) -> String,
    ) -> Option<T> {
        match result {
            Ok(value) => {
                let detail = detail(&value);
                info!(step = id.as_str(), detail = %detail, "Diagnostic step passed");
                self.set_step(id, StepStatus::Success, Some(detail));
                Some(value)
            }
            Err(err) => {
                warn!(step = id.as_str(), code = err.code(), error = %err, "Diagnostic step failed");
                self.set_step(id, StepStatus::Error, Some(err.to_string()));
                None
            }
        }
    }

    /// Execute one full pass.
    pub async fn run(&self) -> Result<DiagnosticsReport, DiagnosticsBusy> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DiagnosticsBusy);
        }
        let _guard = RunGuard(&self.running);

        let started_at = Utc::now();
        *self.lock_steps() = DiagnosticStep::initial_list();

        self.run_steps().await;

        let report = DiagnosticsReport::from_steps(self.steps(), started_at, Utc::now());
        metrics::record_diagnostics_run(report.test_passed);
        if report.test_passed {
            info!("Diagnostics passed");
        } else {
            warn!(
                failed_step = ?report.failed_step,
                detail = report.failure_detail().unwrap_or_default(),
                "Diagnostics failed"
            );
        }
        Ok(report)
    }

    async fn run_steps(&self) {
        let engine = match &self.engine {
            Some(engine) => engine,
            None => {
                let reason = self
                    .construction_error
                    .clone()
                    .unwrap_or_else(|| "detector was not constructed".to_string());
                self.begin(StepId::EnvCheck);
                self.settle::<()>(
                    StepId::EnvCheck,
                    Err(EngineError::load(format!(
                        "Detector could not be constructed: {reason}"
                    ))),
                    |_| String::new(),
                );
                return;
            }
        };
        let loader = Arc::clone(engine.loader());

        // 1. Environment
        self.begin(StepId::EnvCheck);
        let checked = self.settle(StepId::EnvCheck, loader.check_environment(), |_| {
            format!("Credential present for {}", loader.model_name())
        });
        if checked.is_none() {
            return;
        }

        // 2. Repository access
        self.begin(StepId::RepoAccess);
        let listing = loader.list_files().await.and_then(|files| {
            let missing: Vec<String> = loader
                .required_files()
                .into_iter()
                .filter(|f| !files.contains(f))
                .collect();
            if missing.is_empty() {
                Ok(files)
            } else {
                Err(EngineError::load(format!(
                    "Repository is missing {}",
                    missing.join(", ")
                )))
            }
        });
        let listed = self.settle(StepId::RepoAccess, listing, |files| {
            format!("{} files listed in {}", files.len(), loader.model_name())
        });
        if listed.is_none() {
            return;
        }

        // 3-5. Download, import and engine load run as one engine-owned load
        let report = engine.reload_with_report(self).await;
        if report.shared {
            // stages ran under another caller's load; mirror their outcomes
            for record in &report.stages {
                self.record_stage(record);
            }
        }
    }

    fn record_stage(&self, record: &StageRecord) {
        let id = step_for(record.stage);
        match &record.outcome {
            // the environment step already reported its own success
            Ok(_) if record.stage == LoadStage::Environment => {}
            Ok(detail) => {
                info!(step = id.as_str(), detail = %detail, "Diagnostic step passed");
                self.set_step(id, StepStatus::Success, Some(detail.clone()));
            }
            Err(err) => {
                warn!(step = id.as_str(), code = err.code(), error = %err, "Diagnostic step failed");
                self.set_step(id, StepStatus::Error, Some(err.to_string()));
            }
        }
    }
}

impl LoadObserver for DiagnosticsRunner {
    fn stage_started(&self, stage: LoadStage) {
        if stage != LoadStage::Environment {
            self.begin(step_for(stage));
        }
    }

    fn stage_finished(&self, record: &StageRecord) {
        self.record_stage(record);
    }
}

/// Diagnostic step that reports a load stage.
fn step_for(stage: LoadStage) -> StepId {
    match stage {
        LoadStage::Environment => StepId::EnvCheck,
        LoadStage::Download => StepId::ModelDownload,
        LoadStage::Import => StepId::ModuleImport,
        LoadStage::Construct => StepId::ModelLoad,
    }
}
