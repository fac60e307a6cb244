//! One-shot run commands: list, show, cancel, delete.
//!
//! These talk to the repository directly and never open a realtime
//! connection. Status checks mirror the live view: only in-flight runs can be
//! canceled and only finished runs can be deleted.

use anyhow::{Context, Result, bail};
use console::style;

use certdash_core::repository::workflow_run::WorkflowRunRepository;
use certdash_types::error::RunActionError;
use certdash_types::run::{RunId, RunListQuery, WorkflowRun};

use super::render::{print_run_detail, run_json, runs_table};
use super::{PageArgs, RunsCommand};
use crate::state::AppState;

pub async fn handle(state: &AppState, action: RunsCommand, json: bool) -> Result<()> {
    match action {
        RunsCommand::List { page } => list_runs(state, &page, json).await,
        RunsCommand::Show { id } => show_run(state, &RunId::new(id), json).await,
        RunsCommand::Cancel { id } => cancel_run(state, &RunId::new(id), json).await,
        RunsCommand::Delete { ids } => {
            let ids: Vec<RunId> = ids.into_iter().map(RunId::new).collect();
            delete_runs(state, &ids, json).await
        }
    }
}

/// Query for one page. Listings across all workflows expand each run's
/// workflow so the table can name it.
pub fn page_query(state: &AppState, page: &PageArgs) -> RunListQuery {
    RunListQuery::new(
        page.workflow.clone(),
        page.page,
        page.per_page.unwrap_or(state.config.ui.default_per_page),
    )
    .with_expand(page.workflow.is_none())
}

async fn list_runs(state: &AppState, page: &PageArgs, json: bool) -> Result<()> {
    let repo = state.run_repository();
    let query = page_query(state, page);
    let result = repo
        .list(&query)
        .await
        .context("Failed to list runs")?;

    if json {
        let out = serde_json::json!({
            "page": query.page,
            "per_page": query.per_page,
            "total": result.total_items,
            "items": result.items.iter().map(run_json).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if result.items.is_empty() {
        println!();
        println!("  No runs found.");
        println!();
        return Ok(());
    }

    let first = u64::from(query.page - 1) * u64::from(query.per_page) + 1;
    let table = runs_table(&result.items, first, |_| None);

    println!();
    match &query.workflow_id {
        Some(workflow) => println!("  Runs for workflow '{}'", style(workflow).cyan()),
        None => println!("  Workflow runs"),
    }
    println!();
    println!("{table}");
    println!(
        "  {}",
        style(format!(
            "page {} · {} total",
            query.page, result.total_items
        ))
        .dim()
    );
    println!();

    Ok(())
}

async fn fetch(state: &AppState, id: &RunId) -> Result<WorkflowRun> {
    state
        .run_repository()
        .get(id)
        .await
        .with_context(|| format!("Failed to load run '{id}'"))
}

async fn show_run(state: &AppState, id: &RunId, json: bool) -> Result<()> {
    let run = fetch(state, id).await?;
    if json {
        let mut out = run_json(&run);
        out["graph"] = run.graph.clone();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_run_detail(&run);
    }
    Ok(())
}

async fn cancel_run(state: &AppState, id: &RunId, json: bool) -> Result<()> {
    let run = fetch(state, id).await?;
    if !run.is_in_flight() {
        return Err(RunActionError::NotCancellable {
            id: id.clone(),
            status: run.status,
        }
        .into());
    }

    let accepted = state
        .run_repository()
        .cancel(&run.workflow_id, id)
        .await
        .with_context(|| format!("Failed to cancel run '{id}'"))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "id": id, "cancel_requested": accepted }))?
        );
    } else if accepted {
        println!();
        println!(
            "  {} Cancel requested for run {}",
            style("✓").green().bold(),
            style(id.as_str()).cyan()
        );
        println!();
    } else {
        bail!("Backend refused to cancel run '{id}'");
    }
    Ok(())
}

async fn delete_runs(state: &AppState, ids: &[RunId], json: bool) -> Result<()> {
    let mut finished = Vec::new();
    let mut skipped = Vec::new();
    for id in ids {
        let run = fetch(state, id).await?;
        if run.status.is_terminal() {
            finished.push(run.id);
        } else {
            skipped.push(run);
        }
    }

    for run in &skipped {
        tracing::debug!(run_id = %run.id, status = %run.status, "skipping unfinished run");
        if !json {
            println!(
                "  {} Skipping run {} ({}): still in flight",
                style("!").yellow().bold(),
                style(run.id.as_str()).cyan(),
                run.status
            );
        }
    }
    if finished.is_empty() {
        return Err(RunActionError::NothingToDelete.into());
    }

    let removed = state
        .run_repository()
        .remove(&finished)
        .await
        .context("Failed to delete runs")?;
    if !removed {
        bail!("Backend refused to delete runs");
    }

    if json {
        let out = serde_json::json!({
            "deleted": finished,
            "skipped": skipped.iter().map(|r| &r.id).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  {} Deleted {} run(s)",
            style("✓").green().bold(),
            finished.len()
        );
        println!();
    }
    Ok(())
}
