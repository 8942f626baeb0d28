pub mod client;
pub mod config;
pub mod controller;
pub mod logging;
pub mod realtime;
pub mod render;

pub use client::{JobSource, JobsClient};
pub use config::Config;
pub use controller::{Command, ControllerHandle, JobTableController, Step, ViewState};
