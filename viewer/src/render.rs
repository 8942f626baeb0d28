use anyhow::{Context, Result};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use common::{Column, Job, JobState, Page};

use crate::controller::ViewState;

const CLEAR_SCREEN: &str = "\x1B[2J\x1B[H";
const HELP: &str = "n/p: page  g <n>: go to page  s <col> [asc|desc]: sort  m <col> <pos>: move column  r: refresh  q: quit";

fn state_color(state: &JobState) -> Color {
    match state {
        JobState::Pending => Color::Grey,
        JobState::Started => Color::Yellow,
        JobState::Success => Color::Green,
        JobState::Error => Color::Red,
        JobState::Unknown(_) => Color::DarkGrey,
    }
}

fn cell(column: Column, job: &Job) -> Cell {
    let cell = Cell::new(column.format(job));
    match column {
        Column::State => cell.fg(state_color(&job.state)),
        _ => cell,
    }
}

/// The grid for one page, columns in display order.
pub fn render_page(page: &Page<'_>, columns: &[Column]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(columns.iter().map(|c| Cell::new(c.title())).collect::<Vec<_>>());

    for job in &page.rows {
        table.add_row(columns.iter().map(|c| cell(*c, job)).collect::<Vec<_>>());
    }
    table.to_string()
}

pub fn footer(state: &ViewState) -> String {
    let table = &state.table;
    let mut line = format!(
        "page {} of {} · {} jobs",
        table.current_page(),
        table.total_pages().max(1),
        table.len()
    );
    if let Some(updated) = state.last_updated {
        line.push_str(&format!(" · updated {}", updated.format("%H:%M:%S")));
    }
    if state.quarantined > 0 {
        line.push_str(&format!(" · {} malformed entries skipped", state.quarantined));
    }
    line
}

/// Full frame: optional error banner, the current page and its footer.
pub fn render_view(state: &ViewState) -> String {
    let mut out = String::new();
    if let Some(err) = &state.last_error {
        out.push_str(&format!("! {}\n", err));
    }

    if state.table.is_populated() {
        out.push_str(&render_page(&state.table.current(), state.table.columns()));
        out.push('\n');
    } else if state.last_error.is_none() {
        out.push_str("Loading jobs...\n");
    } else {
        out.push_str("Job list not loaded yet.\n");
    }
    out.push_str(&footer(state));
    out.push('\n');
    out
}

/// Clear the terminal and draw the view plus key help.
pub fn render_screen(state: &ViewState) -> String {
    format!("{}{}{}\n", CLEAR_SCREEN, render_view(state), HELP)
}

pub fn render_job(job: &Job) -> String {
    let parameters = serde_json::to_string_pretty(&job.parameters)
        .unwrap_or_else(|_| job.parameters.to_string());
    format!(
        "Job Details:\n  ID:         {}\n  Script:     {}\n  State:      {}\n  Parameters: {}\n",
        job.id,
        job.script,
        job.state,
        parameters.replace('\n', "\n              ")
    )
}

pub fn to_csv(rows: &[&Job], columns: &[Column]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns.iter().map(|c| c.title()))?;
    for job in rows {
        writer.write_record(columns.iter().map(|c| c.format(job)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV output: {}", e.error()))?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}
