use crate::exits::ExitStatistics;
use crate::pipeline::StepCounts;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Served from an artifact still within its TTL.
    Cached,
    Fetched,
    /// Contributed nothing (or only part of its sources) this cycle.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub status: StageStatus,
    pub records: usize,
    pub error: Option<String>,
}

impl StageReport {
    pub fn new(stage: &str, status: StageStatus, records: usize, error: Option<String>) -> Self {
        Self {
            stage: stage.to_string(),
            status,
            records,
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshReport {
    /// The labels artifact was fresh and served without rebuilding.
    pub served_from_labels_artifact: bool,
    pub validators: usize,
    pub stages: Vec<StageReport>,
    pub steps: StepCounts,
    pub exits: ExitStatistics,
    pub elapsed_ms: u64,
}

impl RefreshReport {
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == name)
    }

    pub fn degraded_stages(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Degraded)
            .map(|s| s.stage.as_str())
            .collect()
    }
}
