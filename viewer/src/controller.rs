use anyhow::Result;
use chrono::{DateTime, Local};
use common::{Column, JobEvent, JobSnapshot, SortDir, TableView};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::JobSource;

/// Everything the renderer needs to draw one frame.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub table: TableView,
    pub last_error: Option<String>,
    pub quarantined: usize,
    pub last_updated: Option<DateTime<Local>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    NextPage,
    PrevPage,
    GoToPage(usize),
    Sort(Column, SortDir),
    MoveColumn(Column, usize),
    Refresh,
    Quit,
}

impl std::str::FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        match parts.as_slice() {
            ["n"] | ["next"] => Ok(Command::NextPage),
            ["p"] | ["prev"] => Ok(Command::PrevPage),
            ["g", page] | ["page", page] => page
                .parse()
                .map(Command::GoToPage)
                .map_err(|_| format!("Invalid page number: {}", page)),
            ["s", column] | ["sort", column] => Ok(Command::Sort(column.parse()?, SortDir::default())),
            ["s", column, dir] | ["sort", column, dir] => Ok(Command::Sort(column.parse()?, dir.parse()?)),
            ["m", column, index] | ["move", column, index] => {
                let index = index
                    .parse()
                    .map_err(|_| format!("Invalid column index: {}", index))?;
                Ok(Command::MoveColumn(column.parse()?, index))
            }
            ["r"] | ["refresh"] => Ok(Command::Refresh),
            ["q"] | ["quit"] => Ok(Command::Quit),
            _ => Err(format!("Unknown command: {}", s.trim())),
        }
    }
}

enum Message {
    Event(JobEvent),
    Fetched { seq: u64, result: Result<JobSnapshot> },
    Command(Command),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Updated,
    Unchanged,
    Quit,
}

#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl ControllerHandle {
    /// Returns false once the controller has gone away.
    pub fn notify(&self, event: JobEvent) -> bool {
        self.tx.send(Message::Event(event)).is_ok()
    }

    pub fn command(&self, command: Command) -> bool {
        self.tx.send(Message::Command(command)).is_ok()
    }
}

pub struct JobTableController {
    source: Arc<dyn JobSource>,
    state: ViewState,
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
    next_seq: u64,
    applied_seq: u64,
    in_flight: Option<CancellationToken>,
}

impl JobTableController {
    pub fn new(source: Arc<dyn JobSource>, table: TableView) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            source,
            state: ViewState { table, ..ViewState::default() },
            tx,
            rx,
            next_seq: 0,
            applied_seq: 0,
            in_flight: None,
        }
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle { tx: self.tx.clone() }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// Start a full re-fetch, cancelling the one in flight if any.
    pub fn refresh(&mut self, reason: &str) {
        if let Some(previous) = self.in_flight.take() {
            previous.cancel();
        }

        self.next_seq += 1;
        let seq = self.next_seq;
        let token = CancellationToken::new();
        self.in_flight = Some(token.clone());

        log::debug!("Refresh #{} requested ({})", seq, reason);
        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    log::debug!("Refresh #{} superseded before completing", seq);
                }
                result = source.list_jobs() => {
                    let _ = tx.send(Message::Fetched { seq, result });
                }
            }
        });
    }

    pub async fn step(&mut self) -> Step {
        match self.rx.recv().await {
            Some(message) => self.apply(message),
            None => Step::Quit,
        }
    }

    /// `on_update` runs once up front and then after every change.
    pub async fn run<F>(mut self, mut on_update: F)
    where
        F: FnMut(&ViewState),
    {
        self.refresh("initial load");
        on_update(&self.state);

        loop {
            match self.step().await {
                Step::Updated => on_update(&self.state),
                Step::Unchanged => {}
                Step::Quit => break,
            }
        }

        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
        log::info!("Job table controller stopped");
    }

    fn apply(&mut self, message: Message) -> Step {
        match message {
            Message::Event(event) => {
                log::info!("Received {} event, updating job state for job {}", event.kind, event.payload);
                self.refresh(event.kind.base_name());
                Step::Unchanged
            }
            Message::Fetched { seq, result } => self.apply_fetch(seq, result),
            Message::Command(command) => self.apply_command(command),
        }
    }

    fn apply_fetch(&mut self, seq: u64, result: Result<JobSnapshot>) -> Step {
        if seq <= self.applied_seq {
            log::debug!("Dropping refresh #{}, #{} already applied", seq, self.applied_seq);
            return Step::Unchanged;
        }
        self.applied_seq = seq;
        if seq == self.next_seq {
            self.in_flight = None;
        }

        match result {
            Ok(snapshot) => {
                log::info!(
                    "Loaded {} jobs ({} quarantined)",
                    snapshot.jobs.len(),
                    snapshot.quarantined.len()
                );
                self.state.quarantined = snapshot.quarantined.len();
                self.state.table.replace_data(snapshot.jobs);
                self.state.last_error = None;
                self.state.last_updated = Some(Local::now());
            }
            Err(e) => {
                if self.state.table.is_populated() {
                    log::error!("Failed to refresh job list, keeping previous rows: {:#}", e);
                } else {
                    log::error!("Failed to load job list: {:#}", e);
                }
                self.state.last_error = Some(format!("{:#}", e));
            }
        }
        Step::Updated
    }

    fn apply_command(&mut self, command: Command) -> Step {
        let table = &mut self.state.table;
        let changed = match command {
            Command::NextPage => table.next_page(),
            Command::PrevPage => table.prev_page(),
            Command::GoToPage(page) => table.go_to_page(page),
            Command::Sort(column, dir) => {
                table.sort_by(column, dir);
                true
            }
            Command::MoveColumn(column, index) => table.move_column(column, index),
            Command::Refresh => {
                self.refresh("manual");
                false
            }
            Command::Quit => return Step::Quit,
        };
        if changed { Step::Updated } else { Step::Unchanged }
    }
}
