use serde::{Deserialize, Serialize};

/// Display labels for job states, indexed by the numeric state the server sends.
pub const JOB_STATE_LABELS: [&str; 4] = ["pending", "started", "success", "error"];

/// Label shown for a state index the server sent but we don't know about.
pub const UNKNOWN_STATE_LABEL: &str = "unknown";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Out-of-range state indices are kept as `Unknown`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "i64", into = "i64")]
pub enum JobState {
    Pending,
    Started,
    Success,
    Error,
    Unknown(i64),
}

impl JobState {
    pub fn index(&self) -> i64 {
        match self {
            JobState::Pending => 0,
            JobState::Started => 1,
            JobState::Success => 2,
            JobState::Error => 3,
            JobState::Unknown(raw) => *raw,
        }
    }

    pub fn label(&self) -> &'static str {
        match usize::try_from(self.index()) {
            Ok(i) if i < JOB_STATE_LABELS.len() => JOB_STATE_LABELS[i],
            _ => UNKNOWN_STATE_LABEL,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, JobState::Unknown(_))
    }
}

impl From<i64> for JobState {
    fn from(raw: i64) -> Self {
        match raw {
            0 => JobState::Pending,
            1 => JobState::Started,
            2 => JobState::Success,
            3 => JobState::Error,
            other => JobState::Unknown(other),
        }
    }
}

impl From<JobState> for i64 {
    fn from(state: JobState) -> Self {
        state.index()
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub script: String,
    pub state: JobState,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// The three push events a worker state change produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobEventKind {
    Started,
    Success,
    Error,
}

impl JobEventKind {
    pub const ALL: [JobEventKind; 3] = [JobEventKind::Success, JobEventKind::Error, JobEventKind::Started];

    /// Event name without any namespace prefix.
    pub fn base_name(&self) -> &'static str {
        match self {
            JobEventKind::Started => "worker-started",
            JobEventKind::Success => "worker-success",
            JobEventKind::Error => "worker-error",
        }
    }

    pub fn event_name(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.base_name())
    }

    /// Match a received event name, e.g. `cea-worker-success` with prefix `cea-`.
    pub fn from_event_name(name: &str, prefix: &str) -> Option<Self> {
        let base = name.strip_prefix(prefix)?;
        Self::ALL.into_iter().find(|kind| kind.base_name() == base)
    }
}

impl std::fmt::Display for JobEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.base_name())
    }
}

/// A job-state-change notification. The payload is only ever logged.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEvent {
    pub kind: JobEventKind,
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn labels_follow_numeric_index() {
        for (i, label) in JOB_STATE_LABELS.iter().enumerate() {
            assert_eq!(JobState::from(i as i64).label(), *label);
        }
    }

    #[test]
    fn out_of_range_state_falls_back_to_unknown() {
        let state = JobState::from(99);
        assert_eq!(state, JobState::Unknown(99));
        assert_eq!(state.label(), "unknown");
        assert_eq!(JobState::from(-1).label(), "unknown");
        assert_eq!(i64::from(state), 99);
    }

    #[test]
    fn job_deserializes_from_server_shape() {
        let job: Job = serde_json::from_value(json!({
            "id": 4,
            "script": "demand",
            "state": 2,
            "parameters": {"scenario": "baseline"}
        }))
        .unwrap();
        assert_eq!(job.id, JobId(4));
        assert_eq!(job.state, JobState::Success);
        assert_eq!(job.parameters["scenario"], "baseline");
    }

    #[test]
    fn event_names_respect_prefix() {
        assert_eq!(JobEventKind::Success.event_name("cea-"), "cea-worker-success");
        assert_eq!(
            JobEventKind::from_event_name("cea-worker-error", "cea-"),
            Some(JobEventKind::Error)
        );
        assert_eq!(JobEventKind::from_event_name("worker-started", ""), Some(JobEventKind::Started));
        assert_eq!(JobEventKind::from_event_name("worker-started", "cea-"), None);
        assert_eq!(JobEventKind::from_event_name("cea-streams", "cea-"), None);
    }
}
