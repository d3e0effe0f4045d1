//! Diagnostic pass types.
//!
//! A diagnostics pass walks five ordered steps that together validate the
//! model-loading path end to end. Each step moves
//! `pending -> running -> success | error`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The five diagnostic stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    /// Model identifier and credential are configured
    EnvCheck,
    /// The model repository answers with its file list
    RepoAccess,
    /// Model artifacts are present in the local cache
    ModelDownload,
    /// Artifacts parse into a usable model manifest
    ModuleImport,
    /// The inference engine constructs the model and reaches `Ready`
    ModelLoad,
}

impl StepId {
    /// All steps in execution order.
    pub const ALL: [StepId; 5] = [
        StepId::EnvCheck,
        StepId::RepoAccess,
        StepId::ModelDownload,
        StepId::ModuleImport,
        StepId::ModelLoad,
    ];

    /// 1-based position in the pass.
    pub fn number(&self) -> usize {
        match self {
            StepId::EnvCheck => 1,
            StepId::RepoAccess => 2,
            StepId::ModelDownload => 3,
            StepId::ModuleImport => 4,
            StepId::ModelLoad => 5,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            StepId::EnvCheck => "Environment check",
            StepId::RepoAccess => "Repository access",
            StepId::ModelDownload => "Model download",
            StepId::ModuleImport => "Module import",
            StepId::ModelLoad => "Model load",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::EnvCheck => "env_check",
            StepId::RepoAccess => "repo_access",
            StepId::ModelDownload => "model_download",
            StepId::ModuleImport => "module_import",
            StepId::ModelLoad => "model_load",
        }
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of one diagnostic step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Success,
    Error,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Success | StepStatus::Error)
    }
}

/// One entry of the diagnostic step list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticStep {
    pub id: StepId,
    pub title: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl DiagnosticStep {
    /// A step in its initial `pending` state.
    pub fn pending(id: StepId) -> Self {
        Self {
            id,
            title: id.title().to_string(),
            status: StepStatus::Pending,
            detail: None,
        }
    }

    /// The full step list, all `pending`.
    pub fn initial_list() -> Vec<DiagnosticStep> {
        StepId::ALL.iter().copied().map(Self::pending).collect()
    }
}

/// Outcome of one diagnostics pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    /// True only when every step reached `success`
    pub test_passed: bool,
    pub steps: Vec<DiagnosticStep>,
    pub steps_completed: usize,
    pub total_steps: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<StepId>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DiagnosticsReport {
    pub fn from_steps(
        steps: Vec<DiagnosticStep>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let steps_completed = steps
            .iter()
            .filter(|s| s.status == StepStatus::Success)
            .count();
        let failed_step = steps
            .iter()
            .find(|s| s.status == StepStatus::Error)
            .map(|s| s.id);
        let total_steps = steps.len();

        Self {
            test_passed: failed_step.is_none() && steps_completed == total_steps,
            steps,
            steps_completed,
            total_steps,
            failed_step,
            started_at,
            finished_at,
        }
    }

    /// Detail of the failing step, if any.
    pub fn failure_detail(&self) -> Option<&str> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::Error)
            .and_then(|s| s.detail.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_list_is_ordered_and_pending() {
        let steps = DiagnosticStep::initial_list();
        assert_eq!(steps.len(), 5);
        for (i, step) in steps.iter().enumerate() {
            assert_eq!(step.id.number(), i + 1);
            assert_eq!(step.status, StepStatus::Pending);
            assert!(step.detail.is_none());
        }
    }

    #[test]
    fn test_report_counts_and_failure() {
        let mut steps = DiagnosticStep::initial_list();
        steps[0].status = StepStatus::Success;
        steps[1].status = StepStatus::Error;
        steps[1].detail = Some("401 Unauthorized".to_string());

        let now = Utc::now();
        let report = DiagnosticsReport::from_steps(steps, now, now);
        assert!(!report.test_passed);
        assert_eq!(report.steps_completed, 1);
        assert_eq!(report.failed_step, Some(StepId::RepoAccess));
        assert_eq!(report.failure_detail(), Some("401 Unauthorized"));
    }

    #[test]
    fn test_step_serializes_snake_case() {
        let json = serde_json::to_value(DiagnosticStep::pending(StepId::ModelDownload)).unwrap();
        assert_eq!(json["id"], "model_download");
        assert_eq!(json["status"], "pending");
        assert!(json.get("detail").is_none());
    }
}
