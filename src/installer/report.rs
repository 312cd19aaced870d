//! Install run report

use crate::lock::ArtifactId;
use serde::Serialize;
use std::fmt;

/// Phase in which an artifact dropped out of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePhase {
    Fetch,
    Install,
    /// Not attempted because a dependency failed
    Skipped,
    Remove,
}

impl fmt::Display for FailurePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetch => "fetch",
            Self::Install => "install",
            Self::Skipped => "skipped",
            Self::Remove => "remove",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactFailure {
    pub id: ArtifactId,
    pub phase: FailurePhase,
    pub error: String,
}

/// Outcome of one install run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    /// Installed this run, in install order
    pub installed: Vec<ArtifactId>,
    pub failed: Vec<ArtifactFailure>,
    /// Previously installed artifacts removed during reconcile
    pub removed: Vec<ArtifactId>,
    pub cancelled: bool,
}

impl InstallReport {
    /// Every artifact installed and nothing was interrupted
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    pub fn record_failure(&mut self, id: ArtifactId, phase: FailurePhase, error: impl fmt::Display) {
        self.failed.push(ArtifactFailure {
            id,
            phase,
            error: error.to_string(),
        });
    }

    pub fn failure(&self, id: &ArtifactId) -> Option<&ArtifactFailure> {
        self.failed.iter().find(|f| &f.id == id)
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} installed, {} failed, {} removed",
            self.installed.len(),
            self.failed.len(),
            self.removed.len()
        );
        if self.cancelled {
            summary.push_str(" (cancelled)");
        }
        summary
    }
}
