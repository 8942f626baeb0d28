use crate::job::Job;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a JSON array of jobs, got {0}")]
    NotAnArray(&'static str),
}

/// An entry of the list response that could not be decoded into a [`Job`].
#[derive(Debug, Clone, PartialEq)]
pub struct Quarantined {
    pub index: usize,
    pub reason: String,
    pub raw: Value,
}

/// Point-in-time copy of the server's job list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobSnapshot {
    pub jobs: Vec<Job>,
    pub quarantined: Vec<Quarantined>,
}

impl JobSnapshot {
    pub fn unknown_states(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter().filter(|job| !job.state.is_known())
    }
}

pub fn parse_job_list(body: &[u8]) -> Result<JobSnapshot, IngestError> {
    let value: Value = serde_json::from_slice(body)?;
    snapshot_from_value(value)
}

pub fn snapshot_from_value(value: Value) -> Result<JobSnapshot, IngestError> {
    let entries = match value {
        Value::Array(entries) => entries,
        other => return Err(IngestError::NotAnArray(json_kind(&other))),
    };

    let mut snapshot = JobSnapshot::default();
    for (index, raw) in entries.into_iter().enumerate() {
        match serde_json::from_value::<Job>(raw.clone()) {
            Ok(job) => snapshot.jobs.push(job),
            Err(e) => snapshot.quarantined.push(Quarantined {
                index,
                reason: e.to_string(),
                raw,
            }),
        }
    }
    Ok(snapshot)
}

/// Decode a single job, as returned by the per-job endpoint.
pub fn parse_job(body: &[u8]) -> Result<Job, IngestError> {
    Ok(serde_json::from_slice(body)?)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobId, JobState};

    #[test]
    fn parses_single_job_list() {
        let snapshot = parse_job_list(br#"[{"id":1,"script":"a.py","state":0,"parameters":{}}]"#).unwrap();
        assert_eq!(snapshot.jobs.len(), 1);
        assert!(snapshot.quarantined.is_empty());
        assert_eq!(snapshot.jobs[0].id, JobId(1));
        assert_eq!(snapshot.jobs[0].state.label(), "pending");
    }

    #[test]
    fn malformed_entries_are_quarantined() {
        let body = br#"[
            {"id":1,"script":"a.py","state":0,"parameters":{}},
            {"id":"two","script":"b.py","state":1},
            {"script":"c.py","state":1},
            42
        ]"#;
        let snapshot = parse_job_list(body).unwrap();
        assert_eq!(snapshot.jobs.len(), 1);
        let indices: Vec<usize> = snapshot.quarantined.iter().map(|q| q.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert!(snapshot.quarantined[1].reason.contains("id"));
    }

    #[test]
    fn out_of_range_state_is_kept_with_unknown_state() {
        let snapshot = parse_job_list(br#"[{"id":7,"script":"x","state":99,"parameters":null}]"#).unwrap();
        assert_eq!(snapshot.jobs[0].state, JobState::Unknown(99));
        assert_eq!(snapshot.unknown_states().count(), 1);
    }

    #[test]
    fn missing_parameters_default_to_null() {
        let snapshot = parse_job_list(br#"[{"id":7,"script":"x","state":1}]"#).unwrap();
        assert!(snapshot.jobs[0].parameters.is_null());
    }

    #[test]
    fn non_array_response_is_rejected() {
        let err = parse_job_list(br#"{"error":"boom"}"#).unwrap_err();
        assert!(matches!(err, IngestError::NotAnArray("an object")));
        assert!(matches!(parse_job_list(b"<html>"), Err(IngestError::Json(_))));
    }
}
