pub mod ingest;
pub mod job;
pub mod table;
pub mod wire;

pub use ingest::{parse_job, parse_job_list, IngestError, JobSnapshot, Quarantined};
pub use job::{Job, JobEvent, JobEventKind, JobId, JobState, JOB_STATE_LABELS, UNKNOWN_STATE_LABEL};
pub use table::{Column, Page, SortDir, SortSpec, TableView, DEFAULT_PAGE_SIZE};
pub use wire::{EnginePacket, OpenInfo, SocketPacket, WireError};

// Defaults for a dashboard server running locally
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5050/server";
pub const LIST_JOBS_PATH: &str = "jobs/list";
pub const JOB_DETAIL_PATH: &str = "jobs";
pub const SOCKET_IO_PATH: &str = "/socket.io/";

// Config lookup: explicit --config first, then these
pub const USER_CONFIG_PATH: &str = "~/.config/jobtable/config.yaml";
pub const LOCAL_CONFIG_PATH: &str = "jobtable.yaml";
