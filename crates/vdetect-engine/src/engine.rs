//! Inference engine lifecycle.
//!
//! `Unloaded -> Loading -> Ready | Failed`. Loads are single-flight: callers
//! that arrive while a load is in progress wait for it and share its outcome
//! instead of starting another. A reload of a `Ready` engine keeps serving
//! the installed classifier, and keeps it if the new load fails. Inference
//! against a `Ready` engine never takes the load lock.
//!
//! The engine drives the loader stage by stage and records a [`LoadReport`]
//! for every load, so diagnostics can attribute a failure without touching
//! the loader outside the lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vdetect_models::{EngineState, InferenceScore, NormalizedTensorBatch};

use crate::classifier::SequenceClassifier;
use crate::error::{EngineError, EngineResult};
use crate::loader::ModelLoader;
use crate::retry::{retry_async, RetryConfig};

/// Stages of one model load, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStage {
    Environment,
    Download,
    Import,
    Construct,
}

impl LoadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStage::Environment => "environment",
            LoadStage::Download => "download",
            LoadStage::Import => "import",
            LoadStage::Construct => "construct",
        }
    }
}

/// Outcome of one load stage: a detail line or the error that stopped it.
#[derive(Debug, Clone, PartialEq)]
pub struct StageRecord {
    pub stage: LoadStage,
    pub outcome: Result<String, EngineError>,
}

/// Stage-by-stage account of one load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Stages that ran; the load stopped after the first error
    pub stages: Vec<StageRecord>,
    /// The caller waited on a load someone else started
    pub shared: bool,
}

impl LoadReport {
    /// `Ok` only when the classifier was constructed.
    pub fn result(&self) -> EngineResult<()> {
        match self.stages.last() {
            Some(StageRecord {
                outcome: Err(err), ..
            }) => Err(err.clone()),
            Some(StageRecord {
                stage: LoadStage::Construct,
                outcome: Ok(_),
            }) => Ok(()),
            _ => Err(EngineError::load("Model load stopped before construction")),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.result().is_ok()
    }

    fn settle<T>(
        &mut self,
        observer: &dyn LoadObserver,
        stage: LoadStage,
        result: EngineResult<T>,
        detail: impl FnOnce(&T) -> String,
    ) -> EngineResult<T> {
        let outcome = match &result {
            Ok(value) => Ok(detail(value)),
            Err(err) => Err(err.clone()),
        };
        let record = StageRecord { stage, outcome };
        observer.stage_finished(&record);
        self.stages.push(record);
        result
    }
}

/// Live progress of a load.
pub trait LoadObserver: Send + Sync {
    fn stage_started(&self, _stage: LoadStage) {}

    fn stage_finished(&self, _record: &StageRecord) {}
}

struct Unobserved;

impl LoadObserver for Unobserved {}

struct Inner {
    state: EngineState,
    classifier: Option<Arc<dyn SequenceClassifier>>,
    last_error: Option<EngineError>,
    last_report: Option<LoadReport>,
    loaded_at: Option<DateTime<Utc>>,
    /// Bumped whenever a load attempt finishes
    generation: u64,
}

/// Owns the classifier and its load lifecycle.
pub struct InferenceEngine {
    loader: Arc<dyn ModelLoader>,
    inner: RwLock<Inner>,
    load_lock: Mutex<()>,
    load_attempts: AtomicU64,
}

impl InferenceEngine {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            inner: RwLock::new(Inner {
                state: EngineState::Unloaded,
                classifier: None,
                last_error: None,
                last_report: None,
                loaded_at: None,
                generation: 0,
            }),
            load_lock: Mutex::new(()),
            load_attempts: AtomicU64::new(0),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn loader(&self) -> &Arc<dyn ModelLoader> {
        &self.loader
    }

    pub fn model_name(&self) -> &str {
        self.loader.model_name()
    }

    pub fn state(&self) -> EngineState {
        self.read().state
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Error from the most recent failed load, cleared on success.
    pub fn last_error(&self) -> Option<EngineError> {
        self.read().last_error.clone()
    }

    /// Stage report of the most recent finished load.
    pub fn last_report(&self) -> Option<LoadReport> {
        self.read().last_report.clone()
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.read().loaded_at
    }

    /// Description of the loaded classifier, if any.
    pub fn classifier_description(&self) -> Option<String> {
        self.read().classifier.as_ref().map(|c| c.describe())
    }

    /// Number of underlying loads started so far.
    pub fn load_attempts(&self) -> u64 {
        self.load_attempts.load(Ordering::SeqCst)
    }

    /// Load the model unless it is already loaded.
    ///
    /// Idempotent while `Ready`. Concurrent callers share one underlying load.
    pub async fn load(&self) -> EngineResult<()> {
        let observed = {
            let inner = self.read();
            if inner.state == EngineState::Ready {
                return Ok(());
            }
            inner.generation
        };

        let _guard = self.load_lock.lock().await;

        {
            let inner = self.read();
            if inner.generation != observed {
                // another caller's load finished while we waited
                return match (&inner.last_error, inner.state) {
                    (_, EngineState::Ready) => Ok(()),
                    (Some(err), _) => Err(err.clone()),
                    (None, state) => Err(EngineError::not_ready(state)),
                };
            }
            if inner.state == EngineState::Ready {
                return Ok(());
            }
        }

        self.run_load(&Unobserved).await.result()
    }

    /// Force a fresh load even when `Ready`.
    pub async fn reload(&self) -> EngineResult<()> {
        let _guard = self.load_lock.lock().await;
        self.run_load(&Unobserved).await.result()
    }

    /// Fresh load reporting each stage to `observer`.
    ///
    /// Takes the load lock like any other load. If a load started by
    /// another caller finishes while this one waits, that load's report is
    /// returned with `shared` set and nothing is loaded again.
    pub async fn reload_with_report(&self, observer: &dyn LoadObserver) -> LoadReport {
        let observed = self.read().generation;
        let _guard = self.load_lock.lock().await;

        {
            let inner = self.read();
            if inner.generation != observed {
                if let Some(report) = &inner.last_report {
                    debug!(model = %self.loader.model_name(), "Sharing report of a concurrent load");
                    return LoadReport {
                        shared: true,
                        ..report.clone()
                    };
                }
            }
        }

        self.run_load(observer).await
    }

    /// `load()` with backoff on transient repository failures.
    pub async fn load_with_retry(&self, config: &RetryConfig) -> EngineResult<()> {
        retry_async(config, EngineError::is_retryable, || self.load())
            .await
            .into_result()
    }

    async fn run_stages(
        &self,
        report: &mut LoadReport,
        observer: &dyn LoadObserver,
    ) -> EngineResult<Arc<dyn SequenceClassifier>> {
        let loader = self.loader.as_ref();

        observer.stage_started(LoadStage::Environment);
        report.settle(observer, LoadStage::Environment, loader.check_environment(), |_| {
            format!("Credential present for {}", loader.model_name())
        })?;

        observer.stage_started(LoadStage::Download);
        let artifacts = report.settle(observer, LoadStage::Download, loader.fetch().await, |a| {
            format!(
                "{} downloaded, {} reused from cache",
                a.downloaded.len(),
                a.reused.len()
            )
        })?;

        observer.stage_started(LoadStage::Import);
        let manifest = report.settle(
            observer,
            LoadStage::Import,
            loader.prepare(&artifacts).await,
            |m| {
                format!(
                    "{} expecting {} frames at {}x{}",
                    m.model_type.as_deref().unwrap_or("classifier"),
                    m.sequence_length,
                    m.image_size,
                    m.image_size
                )
            },
        )?;

        observer.stage_started(LoadStage::Construct);
        report.settle(
            observer,
            LoadStage::Construct,
            loader.construct(&artifacts, &manifest).await,
            |c| format!("Engine ready ({})", c.describe()),
        )
    }

    /// Caller must hold `load_lock`.
    async fn run_load(&self, observer: &dyn LoadObserver) -> LoadReport {
        {
            let mut inner = self.write();
            if inner.classifier.is_none() {
                inner.state = EngineState::Loading;
            }
        }
        self.load_attempts.fetch_add(1, Ordering::SeqCst);
        info!(model = %self.loader.model_name(), "Loading model");

        let started = Instant::now();
        let mut cancel_guard = CancelGuard {
            engine: self,
            armed: true,
        };
        let mut report = LoadReport::default();
        let result = self.run_stages(&mut report, observer).await;
        cancel_guard.armed = false;

        let elapsed = started.elapsed();
        let mut inner = self.write();
        inner.generation += 1;
        inner.last_report = Some(report.clone());

        match result {
            Ok(classifier) => {
                info!(
                    model = %self.loader.model_name(),
                    classifier = %classifier.describe(),
                    duration_ms = elapsed.as_millis() as u64,
                    "Model ready"
                );
                inner.classifier = Some(classifier);
                inner.state = EngineState::Ready;
                inner.last_error = None;
                inner.loaded_at = Some(Utc::now());
                metrics::counter!("vdetect_model_loads_total", "outcome" => "success").increment(1);
                metrics::histogram!("vdetect_model_load_duration_seconds")
                    .record(elapsed.as_secs_f64());
            }
            Err(err) => {
                let kept_previous = inner.classifier.is_some();
                warn!(
                    model = %self.loader.model_name(),
                    code = err.code(),
                    error = %err,
                    kept_previous,
                    "Model load failed"
                );
                inner.state = if kept_previous {
                    EngineState::Ready
                } else {
                    EngineState::Failed
                };
                inner.last_error = Some(err.clone());
                metrics::counter!("vdetect_model_loads_total", "outcome" => err.code()).increment(1);
            }
        }

        report
    }

    /// Run the classifier on one batch. Only valid while `Ready`.
    pub async fn infer(&self, batch: NormalizedTensorBatch) -> EngineResult<InferenceScore> {
        let classifier = {
            let inner = self.read();
            match (inner.state, &inner.classifier) {
                (EngineState::Ready, Some(classifier)) => Arc::clone(classifier),
                (state, _) => return Err(EngineError::not_ready(state)),
            }
        };

        let started = Instant::now();
        let score = tokio::task::spawn_blocking(move || classifier.classify(batch))
            .await
            .map_err(|e| EngineError::inference(format!("Inference task failed: {e}")))??;

        metrics::histogram!("vdetect_inference_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        Ok(score)
    }
}

/// Settles the engine if a load future is dropped before finishing.
struct CancelGuard<'a> {
    engine: &'a InferenceEngine,
    armed: bool,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.engine.write();
        inner.generation += 1;
        inner.state = if inner.classifier.is_some() {
            EngineState::Ready
        } else {
            EngineState::Failed
        };
        inner.last_error = Some(EngineError::load("Model load was cancelled"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::ModelArtifacts;
    use crate::manifest::ModelManifest;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct FixedClassifier(f32);

    impl SequenceClassifier for FixedClassifier {
        fn classify(&self, _batch: NormalizedTensorBatch) -> EngineResult<InferenceScore> {
            Ok(InferenceScore::from_fake_probability(self.0))
        }
    }

    /// Loader whose outcome is scripted per attempt.
    struct ScriptedLoader {
        calls: AtomicUsize,
        constructs: AtomicUsize,
        delay: Duration,
        /// Fetch outcome per call; calls past the end succeed
        failures: Vec<Option<EngineError>>,
    }

    impl ScriptedLoader {
        fn ok(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                constructs: AtomicUsize::new(0),
                delay,
                failures: Vec::new(),
            }
        }

        fn failing(failures: Vec<EngineError>) -> Self {
            Self::scripted(failures.into_iter().map(Some).collect())
        }

        fn scripted(failures: Vec<Option<EngineError>>) -> Self {
            Self {
                failures,
                ..Self::ok(Duration::ZERO)
            }
        }
    }

    #[async_trait]
    impl ModelLoader for ScriptedLoader {
        fn model_name(&self) -> &str {
            "test/model"
        }

        fn required_files(&self) -> Vec<String> {
            Vec::new()
        }

        fn check_environment(&self) -> EngineResult<()> {
            Ok(())
        }

        async fn list_files(&self) -> EngineResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn fetch(&self) -> EngineResult<ModelArtifacts> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if let Some(Some(err)) = self.failures.get(call) {
                return Err(err.clone());
            }
            Ok(ModelArtifacts {
                config_path: PathBuf::from("config.json"),
                weights_path: PathBuf::from("model.onnx"),
                downloaded: Vec::new(),
                reused: Vec::new(),
            })
        }

        async fn prepare(&self, _artifacts: &ModelArtifacts) -> EngineResult<ModelManifest> {
            Ok(ModelManifest::default())
        }

        async fn construct(
            &self,
            _artifacts: &ModelArtifacts,
            _manifest: &ModelManifest,
        ) -> EngineResult<Arc<dyn SequenceClassifier>> {
            self.constructs.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FixedClassifier(0.8)))
        }
    }

    /// Records stage notifications in order.
    #[derive(Default)]
    struct RecordingObserver {
        events: std::sync::Mutex<Vec<String>>,
    }

    impl LoadObserver for RecordingObserver {
        fn stage_started(&self, stage: LoadStage) {
            self.events.lock().unwrap().push(format!("start:{}", stage.as_str()));
        }

        fn stage_finished(&self, record: &StageRecord) {
            let mark = if record.outcome.is_ok() { "ok" } else { "err" };
            self.events
                .lock()
                .unwrap()
                .push(format!("{mark}:{}", record.stage.as_str()));
        }
    }

    fn batch() -> NormalizedTensorBatch {
        NormalizedTensorBatch::new(vec![0.0; 2 * 3 * 4 * 4], 2, 3, 4, 4).unwrap()
    }

    #[tokio::test]
    async fn test_infer_before_load_is_not_ready() {
        let engine = InferenceEngine::new(Arc::new(ScriptedLoader::ok(Duration::ZERO)));
        assert_eq!(engine.state(), EngineState::Unloaded);

        let err = engine.infer(batch()).await.unwrap_err();
        assert_eq!(err, EngineError::not_ready(EngineState::Unloaded));
    }

    #[tokio::test]
    async fn test_load_then_infer() {
        let engine = InferenceEngine::new(Arc::new(ScriptedLoader::ok(Duration::ZERO)));
        engine.load().await.unwrap();
        assert_eq!(engine.state(), EngineState::Ready);
        assert!(engine.loaded_at().is_some());

        let score = engine.infer(batch()).await.unwrap();
        assert!((score.fake_probability - 0.8).abs() < 1e-6);

        // idempotent while ready
        engine.load().await.unwrap();
        assert_eq!(engine.load_attempts(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_loads_share_one_attempt() {
        let loader = Arc::new(ScriptedLoader::ok(Duration::from_millis(100)));
        let engine = Arc::new(InferenceEngine::new(loader.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.load().await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.load_attempts(), 1);
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn test_failed_load_keeps_error_kind() {
        let loader = ScriptedLoader::failing(vec![EngineError::auth("bad token")]);
        let engine = InferenceEngine::new(Arc::new(loader));

        let err = engine.load().await.unwrap_err();
        assert!(matches!(err, EngineError::Auth(_)));
        assert_eq!(engine.state(), EngineState::Failed);
        assert_eq!(engine.last_error(), Some(err));

        let infer_err = engine.infer(batch()).await.unwrap_err();
        assert_eq!(infer_err, EngineError::not_ready(EngineState::Failed));

        // a later call starts a fresh attempt, which succeeds
        engine.load().await.unwrap();
        assert_eq!(engine.state(), EngineState::Ready);
        assert!(engine.last_error().is_none());
    }

    #[tokio::test]
    async fn test_reload_forces_new_attempt() {
        let loader = Arc::new(ScriptedLoader::ok(Duration::ZERO));
        let engine = InferenceEngine::new(loader.clone());
        engine.load().await.unwrap();
        engine.reload().await.unwrap();
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn test_load_with_retry_retries_network_only() {
        let loader = Arc::new(ScriptedLoader::failing(vec![
            EngineError::network("timeout"),
            EngineError::network("timeout"),
        ]));
        let engine = InferenceEngine::new(loader.clone());
        let config = RetryConfig::new("load").with_base_delay(Duration::from_millis(1));
        engine.load_with_retry(&config).await.unwrap();
        assert_eq!(loader.calls.load(Ordering::SeqCst), 3);

        let loader = Arc::new(ScriptedLoader::failing(vec![EngineError::load("corrupt")]));
        let engine = InferenceEngine::new(loader.clone());
        let err = engine.load_with_retry(&config).await.unwrap_err();
        assert!(matches!(err, EngineError::Load(_)));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_load_marks_failed() {
        let engine = InferenceEngine::new(Arc::new(ScriptedLoader::ok(Duration::from_secs(5))));
        let outcome = tokio::time::timeout(Duration::from_millis(20), engine.load()).await;
        assert!(outcome.is_err());
        assert_eq!(engine.state(), EngineState::Failed);

        let err = engine.last_error().unwrap();
        assert!(matches!(err, EngineError::Load(_)));
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_classifier() {
        let loader = Arc::new(ScriptedLoader::scripted(vec![
            None,
            Some(EngineError::network("connection reset")),
        ]));
        let engine = InferenceEngine::new(loader.clone());
        engine.load().await.unwrap();

        let err = engine.reload().await.unwrap_err();
        assert!(matches!(err, EngineError::Network(_)));
        assert_eq!(engine.state(), EngineState::Ready);
        assert_eq!(engine.last_error(), Some(err));

        let score = engine.infer(batch()).await.unwrap();
        assert!((score.fake_probability - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_report_stops_at_failing_stage() {
        let loader = Arc::new(ScriptedLoader::failing(vec![EngineError::network("timeout")]));
        let engine = InferenceEngine::new(loader.clone());
        let observer = RecordingObserver::default();

        let report = engine.reload_with_report(&observer).await;

        assert!(!report.shared);
        assert!(!report.succeeded());
        let stages: Vec<LoadStage> = report.stages.iter().map(|r| r.stage).collect();
        assert_eq!(stages, vec![LoadStage::Environment, LoadStage::Download]);
        assert!(matches!(report.result(), Err(EngineError::Network(_))));
        assert_eq!(
            *observer.events.lock().unwrap(),
            vec!["start:environment", "ok:environment", "start:download", "err:download"]
        );
        assert_eq!(engine.state(), EngineState::Failed);
        assert_eq!(engine.last_report(), Some(report));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reload_with_report_shares_concurrent_load() {
        let loader = Arc::new(ScriptedLoader::ok(Duration::from_millis(150)));
        let engine = Arc::new(InferenceEngine::new(loader.clone()));

        let background = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.load().await })
        };
        while engine.state() != EngineState::Loading {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let report = engine.reload_with_report(&RecordingObserver::default()).await;
        background.await.unwrap().unwrap();

        assert!(report.shared);
        assert!(report.succeeded());
        assert_eq!(report.stages.len(), 4);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(loader.constructs.load(Ordering::SeqCst), 1);
        assert_eq!(engine.load_attempts(), 1);
    }
}
