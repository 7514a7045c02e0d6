use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Scan intensity requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanType {
    /// Fast probe of the most common ports.
    Quick,
    /// Version detection plus the `vuln` script category.
    Full,
}

impl ScanType {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanType::Quick => "Quick",
            ScanType::Full => "Full",
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Quick" => Ok(ScanType::Quick),
            "Full" => Ok(ScanType::Full),
            other => Err(ParseEnumError::new("scan type", other)),
        }
    }
}

/// Lifecycle of a scan job: `Queued -> Running -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "Queued",
            JobStatus::Running => "Running",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Queued" => Ok(JobStatus::Queued),
            "Running" => Ok(JobStatus::Running),
            "Completed" => Ok(JobStatus::Completed),
            "Failed" => Ok(JobStatus::Failed),
            other => Err(ParseEnumError::new("job status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(Severity::Low),
            "Medium" => Ok(Severity::Medium),
            "High" => Ok(Severity::High),
            other => Err(ParseEnumError::new("severity", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanJob {
    pub scan_id: i64,
    pub targets: String,
    pub scan_type: ScanType,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ScanJob {
    /// Individual target specifiers, split on whitespace.
    pub fn target_list(&self) -> Vec<&str> {
        split_targets(&self.targets)
    }
}

/// Commas belong to nmap's own target syntax (`192.168.1.1,5`, `10.0.3,7.1`)
/// and are never separators.
pub fn split_targets(targets: &str) -> Vec<&str> {
    targets.split_whitespace().collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub finding_id: i64,
    pub scan_id: i64,
    pub title: String,
    pub severity: Severity,
    pub description: String,
    pub remediation_steps: Option<String>,
}

/// A finding that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFinding {
    pub scan_id: i64,
    pub title: String,
    pub severity: Severity,
    pub description: String,
    pub remediation_steps: Option<String>,
}

/// One host as reported by the scanning tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostReport {
    pub services: Vec<ServiceRecord>,
}

/// One probed port on a host.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRecord {
    pub port: u16,
    pub state: String,
    pub name: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
    /// Script results in the order the tool emitted them.
    pub scripts: Vec<ScriptOutput>,
}

impl ServiceRecord {
    pub fn is_open(&self) -> bool {
        self.state == "open"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutput {
    pub id: String,
    pub output: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_edges() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));

        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Running));
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn enums_parse_their_display_form() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<JobStatus>().unwrap(), status);
        }
        assert_eq!("Full".parse::<ScanType>().unwrap(), ScanType::Full);
        assert_eq!("High".parse::<Severity>().unwrap(), Severity::High);
        assert!("quick".parse::<ScanType>().is_err());
        assert!("Critical".parse::<Severity>().is_err());
    }

    #[test]
    fn targets_split_on_whitespace_only() {
        assert_eq!(
            split_targets(" 10.0.0.1\tscanme.nmap.org  192.168.1.0/24 "),
            vec!["10.0.0.1", "scanme.nmap.org", "192.168.1.0/24"]
        );
        assert_eq!(
            split_targets("192.168.1.1,5 10.0.3,7.1"),
            vec!["192.168.1.1,5", "10.0.3,7.1"]
        );
        assert!(split_targets(" \n ").is_empty());
    }

    #[test]
    fn scan_job_serializes_status_as_pascal_case() {
        let job = ScanJob {
            scan_id: 7,
            targets: "127.0.0.1".into(),
            scan_type: ScanType::Quick,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["status"], "Queued");
        assert_eq!(json["scan_type"], "Quick");
        assert!(json["started_at"].is_null());
    }
}
