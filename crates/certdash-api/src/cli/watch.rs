//! Live run list.
//!
//! Drives a [`RunListSession`] from stdin line commands and re-renders the
//! page whenever the session reports a change. Realtime patches keep
//! in-flight rows current without reloading.

use std::sync::Arc;

use anyhow::Result;
use console::style;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use certdash_core::notify::{LogNotifier, Notifier};
use certdash_core::repository::workflow_run::WorkflowRunRepository;
use certdash_core::runs::{RunListSession, RunListViewModel, SessionEvent, ViewCommand};
use certdash_types::error::RunActionError;
use certdash_types::run::RunId;

use super::PageArgs;
use super::render::{RowMarks, print_run_detail, run_json, runs_table};
use super::runs::page_query;
use crate::notify::ConsoleNotifier;
use crate::state::AppState;

/// One parsed line of user input.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Command(ViewCommand),
    Help,
    Quit,
    Empty,
    Invalid(String),
}

/// Page position as the input side last requested it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    pub page: u32,
    pub per_page: u32,
}

impl Pager {
    fn set(&mut self, page: u32, per_page: u32) -> Input {
        self.page = page.max(1);
        self.per_page = per_page.max(1);
        Input::Command(ViewCommand::SetPage {
            page: self.page,
            per_page: self.per_page,
        })
    }
}

pub async fn watch(state: &AppState, page: &PageArgs, json: bool) -> Result<()> {
    let query = page_query(state, page);
    let pager = Pager {
        page: query.page,
        per_page: query.per_page,
    };

    let notifier: Arc<dyn Notifier> = if json {
        Arc::new(LogNotifier)
    } else {
        Arc::new(ConsoleNotifier)
    };
    let view = RunListViewModel::new(Arc::new(state.run_repository()), notifier, query);

    let shutdown = CancellationToken::new();
    let (session, commands) = RunListSession::new(view, shutdown.clone());

    spawn_input_reader(commands, shutdown.clone(), pager);
    let ctrl_c = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        }
    });

    session
        .run(|view, event| {
            if json {
                render_json(view, &event);
            } else {
                render(view, &event);
            }
        })
        .await;
    ctrl_c.abort();

    if !json {
        println!("  {}", style("Stopped watching.").dim());
    }
    Ok(())
}

/// Read stdin on a plain thread so a pending read never holds up shutdown.
fn spawn_input_reader(commands: mpsc::Sender<ViewCommand>, shutdown: CancellationToken, mut pager: Pager) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to read input");
                    break;
                }
            };
            match parse_input(&line, &mut pager) {
                Input::Command(command) => {
                    if commands.blocking_send(command).is_err() {
                        return;
                    }
                }
                Input::Help => print_help(),
                Input::Quit => break,
                Input::Empty => {}
                Input::Invalid(message) => {
                    eprintln!("  {} {message}", style("?").yellow().bold());
                }
            }
        }
        shutdown.cancel();
    });
}

pub fn parse_input(line: &str, pager: &mut Pager) -> Input {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Input::Empty;
    };
    let args: Vec<&str> = words.collect();
    let id = |args: &[&str]| match args {
        [id] => Ok(RunId::from(*id)),
        _ => Err(Input::Invalid(format!("`{verb}` takes exactly one run id"))),
    };

    let command = match verb {
        "q" | "quit" | "exit" => return Input::Quit,
        "h" | "help" | "?" => return Input::Help,
        "r" | "refresh" => ViewCommand::Refresh,
        "n" | "next" => return pager.set(pager.page + 1, pager.per_page),
        "prev" => return pager.set(pager.page.saturating_sub(1), pager.per_page),
        "p" | "page" => {
            let numbers: Result<Vec<u32>, _> = args.iter().map(|a| a.parse::<u32>()).collect();
            return match numbers.as_deref() {
                Ok([page]) => pager.set(*page, pager.per_page),
                Ok([page, per_page]) => pager.set(*page, *per_page),
                _ => Input::Invalid("usage: page <n> [size]".to_string()),
            };
        }
        "wf" | "workflow" => {
            let workflow = match args.as_slice() {
                [] => None,
                [workflow] => Some((*workflow).to_string()),
                _ => return Input::Invalid("usage: wf [workflow-id]".to_string()),
            };
            // The view goes back to the first page on a filter change.
            pager.page = 1;
            ViewCommand::SetWorkflow(workflow)
        }
        "sel" | "select" if !args.is_empty() => {
            ViewCommand::Select(args.iter().map(|a| RunId::from(*a)).collect())
        }
        "t" | "toggle" => match id(&args) {
            Ok(id) => ViewCommand::Toggle(id),
            Err(invalid) => return invalid,
        },
        "clear" => ViewCommand::ClearSelection,
        "cancel" => match id(&args) {
            Ok(id) => ViewCommand::Cancel(id),
            Err(invalid) => return invalid,
        },
        "rm" | "delete" => match id(&args) {
            Ok(id) => ViewCommand::Delete(id),
            Err(invalid) => return invalid,
        },
        "rm-selected" => ViewCommand::DeleteSelected,
        "show" => match id(&args) {
            Ok(id) => ViewCommand::OpenDetail(id),
            Err(invalid) => return invalid,
        },
        "close" => ViewCommand::CloseDetail,
        other => return Input::Invalid(format!("unknown command `{other}`, type `help`")),
    };
    Input::Command(command)
}

fn print_help() {
    let lines = [
        ("r", "reload the page"),
        ("n / prev", "next / previous page"),
        ("page <n> [size]", "jump to a page"),
        ("wf [id]", "filter by workflow, or clear the filter"),
        ("sel <id>..", "select runs"),
        ("t <id>", "toggle selection"),
        ("clear", "clear selection"),
        ("cancel <id>", "cancel an in-flight run"),
        ("rm <id>", "delete a finished run"),
        ("rm-selected", "delete selected finished runs"),
        ("show <id> / close", "open or close run detail"),
        ("q", "quit"),
    ];
    println!();
    for (keys, what) in lines {
        println!("  {:<20} {}", style(keys).cyan(), what);
    }
    println!();
}

/// Print one frame. Frames scroll so notifier output stays visible.
fn render<R: WorkflowRunRepository>(view: &RunListViewModel<R>, event: &SessionEvent<'_>) {
    let query = view.query();
    println!();
    println!("{}", style("─".repeat(60)).dim());
    match &query.workflow_id {
        Some(workflow) => println!("  Runs for workflow '{}'", style(workflow).cyan()),
        None => println!("  Workflow runs"),
    }
    println!();

    if view.rows().is_empty() {
        println!("  No runs found.");
    } else {
        let table = runs_table(view.rows(), view.row_number(0), |run| {
            Some(RowMarks {
                live: view.is_subscribed(&run.id),
                selected: view.selected().contains(&run.id),
            })
        });
        println!("{table}");
    }
    println!(
        "  {}",
        style(format!(
            "page {} · {} total · {} live · {} selected",
            query.page,
            view.total(),
            view.subscription_count(),
            view.selected().len()
        ))
        .dim()
    );

    if let Some(run) = view.detail().current() {
        print_run_detail(run);
    }

    match event {
        SessionEvent::Rejected(RunActionError::Repository(_)) => {}
        SessionEvent::Rejected(err) => {
            println!("  {} {err}", style("!").yellow().bold());
        }
        SessionEvent::Patched(id) => {
            println!("  {}", style(format!("run {id} updated")).dim());
        }
        SessionEvent::Loaded | SessionEvent::Command(_) => {}
    }
    println!("  {}", style("type `help` for commands").dim());
}

fn render_json<R: WorkflowRunRepository>(view: &RunListViewModel<R>, event: &SessionEvent<'_>) {
    let (kind, detail) = match event {
        SessionEvent::Loaded => ("loaded", None),
        SessionEvent::Command(command) => ("command", Some(format!("{command:?}"))),
        SessionEvent::Rejected(err) => ("rejected", Some(err.to_string())),
        SessionEvent::Patched(id) => ("patched", Some(id.to_string())),
    };
    let out = serde_json::json!({
        "event": kind,
        "detail": detail,
        "page": view.query().page,
        "per_page": view.query().per_page,
        "total": view.total(),
        "rows": view.rows().iter().map(run_json).collect::<Vec<_>>(),
        "live": view.rows().iter().filter(|r| view.is_subscribed(&r.id)).map(|r| &r.id).collect::<Vec<_>>(),
        "selected": view.selected(),
        "open": view.detail().current().map(run_json),
        "error": view.last_error(),
    });
    println!("{out}");
}
