//! Table and detail rendering shared by `runs` and `watch`.

use chrono::{DateTime, Local, Utc};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use certdash_types::run::{WorkflowRun, WorkflowRunStatus, WorkflowTrigger};

/// Per-row markers only the live view knows about.
#[derive(Debug, Default, Clone, Copy)]
pub struct RowMarks {
    pub live: bool,
    pub selected: bool,
}

pub fn status_cell(status: WorkflowRunStatus) -> Cell {
    let cell = Cell::new(status.to_string());
    match status {
        WorkflowRunStatus::Pending => cell.fg(Color::Yellow),
        WorkflowRunStatus::Processing => cell.fg(Color::Blue),
        WorkflowRunStatus::Succeeded => cell.fg(Color::Green),
        WorkflowRunStatus::Failed => cell.fg(Color::Red),
        WorkflowRunStatus::Canceled => cell.fg(Color::DarkYellow),
    }
}

pub fn trigger_label(trigger: Option<WorkflowTrigger>) -> &'static str {
    match trigger {
        Some(WorkflowTrigger::Manual) => "manual",
        Some(WorkflowTrigger::Scheduled) => "scheduled",
        None => "-",
    }
}

pub fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Workflow name when expanded, else the workflow id prefixed with `#`.
pub fn workflow_label(run: &WorkflowRun) -> String {
    match run.workflow_name() {
        Some(name) => name.to_string(),
        None => format!("#{}", run.workflow_id),
    }
}

/// Build the run table. `first_number` is the 1-based number of the first row.
///
/// A Workflow column is added when any row carries its expanded workflow.
pub fn runs_table(
    rows: &[WorkflowRun],
    first_number: u64,
    marks: impl Fn(&WorkflowRun) -> Option<RowMarks>,
) -> Table {
    let with_marks = rows.first().is_some_and(|r| marks(r).is_some());
    let with_workflow = rows.iter().any(|r| r.expand.is_some());

    let mut header = vec![
        Cell::new("#").fg(Color::Cyan),
        Cell::new("Run ID"),
        Cell::new("Status"),
        Cell::new("Trigger"),
        Cell::new("Started"),
        Cell::new("Ended"),
    ];
    if with_workflow {
        header.insert(2, Cell::new("Workflow"));
    }
    if with_marks {
        header.insert(0, Cell::new(""));
        header.push(Cell::new("Live"));
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);

    for (offset, run) in rows.iter().enumerate() {
        let mut cells = vec![
            Cell::new(first_number + offset as u64),
            Cell::new(run.id.as_str()),
            status_cell(run.status),
            Cell::new(trigger_label(run.trigger)),
            Cell::new(format_time(run.started_at)),
            Cell::new(format_time(run.ended_at)),
        ];
        if with_workflow {
            cells.insert(2, Cell::new(workflow_label(run)));
        }
        if let Some(mark) = marks(run) {
            cells.insert(0, Cell::new(if mark.selected { "[x]" } else { "[ ]" }));
            cells.push(if mark.live {
                Cell::new("●").fg(Color::Green)
            } else {
                Cell::new("")
            });
        }
        table.add_row(cells);
    }

    table
}

pub fn run_json(run: &WorkflowRun) -> serde_json::Value {
    serde_json::json!({
        "id": run.id,
        "workflow_id": run.workflow_id,
        "workflow_name": run.workflow_name(),
        "status": run.status,
        "trigger": run.trigger,
        "started_at": run.started_at.map(|t| t.to_rfc3339()),
        "ended_at": run.ended_at.map(|t| t.to_rfc3339()),
        "created": run.created.map(|t| t.to_rfc3339()),
        "updated": run.updated.map(|t| t.to_rfc3339()),
        "error": run.error,
    })
}

/// Print one run as a key/value block.
pub fn print_run_detail(run: &WorkflowRun) {
    println!();
    println!("  {} {}", style("Run").bold(), style(run.id.as_str()).cyan());
    println!();
    println!("  {:<10} {}", style("Workflow").dim(), workflow_label(run));
    println!("  {:<10} {}", style("Status").dim(), styled_status(run.status));
    println!("  {:<10} {}", style("Trigger").dim(), trigger_label(run.trigger));
    println!("  {:<10} {}", style("Started").dim(), format_time(run.started_at));
    println!("  {:<10} {}", style("Ended").dim(), format_time(run.ended_at));
    println!("  {:<10} {}", style("Updated").dim(), format_time(run.updated));
    if !run.error.is_empty() {
        println!();
        println!("  {} {}", style("Error:").red().bold(), run.error);
    }
    if let Some(nodes) = graph_node_count(&run.graph) {
        println!("  {:<10} {nodes} nodes", style("Graph").dim());
    }
    println!();
}

fn styled_status(status: WorkflowRunStatus) -> console::StyledObject<String> {
    let text = style(status.to_string());
    match status {
        WorkflowRunStatus::Pending => text.yellow(),
        WorkflowRunStatus::Processing => text.blue(),
        WorkflowRunStatus::Succeeded => text.green(),
        WorkflowRunStatus::Failed => text.red(),
        WorkflowRunStatus::Canceled => text.yellow().dim(),
    }
}

/// Number of top-level nodes in a run's graph snapshot, if it has any.
fn graph_node_count(graph: &serde_json::Value) -> Option<usize> {
    graph
        .get("nodes")
        .and_then(|nodes| nodes.as_array())
        .map(Vec::len)
        .filter(|n| *n > 0)
}
