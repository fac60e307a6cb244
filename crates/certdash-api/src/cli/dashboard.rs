//! `certdash dashboard`: certificate and workflow totals plus the newest runs
//! across every workflow.

use std::sync::Arc;

use anyhow::{Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use tokio_util::sync::CancellationToken;

use certdash_core::dashboard::{Dashboard, DashboardSnapshot};
use certdash_core::notify::{LogNotifier, Notifier};
use certdash_types::statistics::Statistics;

use super::render::{run_json, runs_table};
use crate::notify::ConsoleNotifier;
use crate::state::AppState;

pub async fn show_dashboard(state: &AppState, limit: u32, json: bool) -> Result<()> {
    let notifier: Arc<dyn Notifier> = if json {
        Arc::new(LogNotifier)
    } else {
        Arc::new(ConsoleNotifier)
    };
    let dashboard = Dashboard::new(
        Arc::new(state.statistics_repository()),
        Arc::new(state.run_repository()),
        notifier,
    );
    let snapshot = dashboard.load(limit, &CancellationToken::new()).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot_json(&snapshot))?);
    } else {
        print_snapshot(&snapshot);
    }

    if snapshot.failures == 2 {
        bail!("Dashboard unavailable: backend requests failed");
    }
    Ok(())
}

fn snapshot_json(snapshot: &DashboardSnapshot) -> serde_json::Value {
    serde_json::json!({
        "statistics": snapshot.statistics,
        "total_runs": snapshot.total_runs,
        "latest_runs": snapshot.latest_runs.iter().map(run_json).collect::<Vec<_>>(),
    })
}

fn statistics_table(stats: &Statistics) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Certificates").fg(Color::Cyan),
            Cell::new("Expiring soon").fg(Color::Yellow),
            Cell::new("Expired").fg(Color::Red),
            Cell::new("Workflows").fg(Color::Cyan),
            Cell::new("Enabled").fg(Color::Green),
        ])
        .add_row(vec![
            Cell::new(stats.certificate_total),
            Cell::new(stats.certificate_expire_soon),
            Cell::new(stats.certificate_expired),
            Cell::new(stats.workflow_total),
            Cell::new(stats.workflow_enabled),
        ]);
    table
}

fn print_snapshot(snapshot: &DashboardSnapshot) {
    println!();
    println!("  {}", style("Dashboard").bold());
    println!();
    match &snapshot.statistics {
        Some(stats) => println!("{}", statistics_table(stats)),
        None => println!("  {}", style("statistics unavailable").dim()),
    }

    println!();
    println!("  Latest workflow runs");
    println!();
    if snapshot.latest_runs.is_empty() {
        println!("  No runs found.");
    } else {
        println!("{}", runs_table(&snapshot.latest_runs, 1, |_| None));
        println!(
            "  {}",
            style(format!("{} runs in total", snapshot.total_runs)).dim()
        );
    }
    println!();
}
