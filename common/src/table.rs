use crate::job::Job;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

pub const DEFAULT_PAGE_SIZE: usize = 7;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    Id,
    Script,
    State,
    Parameters,
}

impl Column {
    pub const ALL: [Column; 4] = [Column::Id, Column::Script, Column::State, Column::Parameters];

    pub fn title(&self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Script => "Script",
            Column::State => "State",
            Column::Parameters => "Parameters",
        }
    }

    /// Cell text for a job; `state` goes through the label lookup.
    pub fn format(&self, job: &Job) -> String {
        match self {
            Column::Id => job.id.to_string(),
            Column::Script => job.script.clone(),
            Column::State => job.state.label().to_string(),
            Column::Parameters => raw_text(&job.parameters),
        }
    }

    fn compare(&self, a: &Job, b: &Job) -> Ordering {
        match self {
            Column::Id => a.id.cmp(&b.id),
            Column::Script => a.script.cmp(&b.script),
            Column::State => a.state.index().cmp(&b.state.index()),
            Column::Parameters => raw_text(&a.parameters).cmp(&raw_text(&b.parameters)),
        }
    }
}

// Strings are shown as-is, anything else as compact JSON
fn raw_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl std::str::FromStr for Column {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "id" => Ok(Column::Id),
            "script" => Ok(Column::Script),
            "state" => Ok(Column::State),
            "parameters" | "params" => Ok(Column::Parameters),
            _ => Err(format!("Unknown column: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

impl std::str::FromStr for SortDir {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortDir::Asc),
            "desc" => Ok(SortDir::Desc),
            _ => Err(format!("Unknown sort direction: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortSpec {
    pub column: Column,
    pub dir: SortDir,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self { column: Column::Id, dir: SortDir::Desc }
    }
}

/// One page worth of rows, already sorted.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<'a> {
    pub number: usize,
    pub total_pages: usize,
    pub total_rows: usize,
    pub rows: Vec<&'a Job>,
}

#[derive(Debug, Clone)]
pub struct TableView {
    rows: Vec<Job>,
    columns: Vec<Column>,
    sort: SortSpec,
    page_size: usize,
    current_page: usize,
    populated: bool,
}

impl Default for TableView {
    fn default() -> Self {
        Self::new(SortSpec::default(), DEFAULT_PAGE_SIZE)
    }
}

impl TableView {
    pub fn new(sort: SortSpec, page_size: usize) -> Self {
        Self {
            rows: Vec::new(),
            columns: Column::ALL.to_vec(),
            sort,
            page_size: page_size.max(1),
            current_page: 1,
            populated: false,
        }
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    /// Swap in a fresh job list; the current page is clamped to the new page count.
    pub fn replace_data(&mut self, jobs: Vec<Job>) {
        self.rows = jobs;
        self.apply_sort();
        self.populated = true;
        self.current_page = self.current_page.clamp(1, self.total_pages().max(1));
    }

    pub fn rows(&self) -> &[Job] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn sort_spec(&self) -> SortSpec {
        self.sort
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn total_pages(&self) -> usize {
        self.rows.len().div_ceil(self.page_size)
    }

    pub fn sort_by(&mut self, column: Column, dir: SortDir) {
        self.sort = SortSpec { column, dir };
        self.apply_sort();
    }

    /// Move `column` so it ends up at `index` (clamped to the last slot).
    pub fn move_column(&mut self, column: Column, index: usize) -> bool {
        let Some(from) = self.columns.iter().position(|c| *c == column) else {
            return false;
        };
        let col = self.columns.remove(from);
        let to = index.min(self.columns.len());
        self.columns.insert(to, col);
        true
    }

    /// Jump to a 1-based page. Returns false if the page does not exist.
    pub fn go_to_page(&mut self, page: usize) -> bool {
        if page == 0 || page > self.total_pages().max(1) {
            return false;
        }
        self.current_page = page;
        true
    }

    pub fn next_page(&mut self) -> bool {
        self.go_to_page(self.current_page + 1)
    }

    pub fn prev_page(&mut self) -> bool {
        self.current_page > 1 && self.go_to_page(self.current_page - 1)
    }

    pub fn page(&self, number: usize) -> Page<'_> {
        let start = number.saturating_sub(1) * self.page_size;
        let rows = self.rows.iter().skip(start).take(self.page_size).collect();
        Page {
            number,
            total_pages: self.total_pages(),
            total_rows: self.rows.len(),
            rows,
        }
    }

    pub fn current(&self) -> Page<'_> {
        self.page(self.current_page)
    }

    fn apply_sort(&mut self) {
        let SortSpec { column, dir } = self.sort;
        // Stable sort: equal keys keep the server's order.
        self.rows.sort_by(|a, b| {
            let ord = column.compare(a, b);
            match dir {
                SortDir::Asc => ord,
                SortDir::Desc => ord.reverse(),
            }
        });
    }
}
