//! `certdash info`: version, links and effective backend settings.

use anyhow::Result;
use console::style;

use crate::state::AppState;

pub fn show_info(state: &AppState, json: bool) -> Result<()> {
    let info = &state.info;

    if json {
        let out = serde_json::json!({
            "version": info.version,
            "repo_url": info.repo_url,
            "download_url": info.download_url,
            "document_url": info.document_url,
            "backend_url": state.client.base_url(),
            "authenticated": state.config.backend.token.is_some(),
            "data_dir": state.data_dir.display().to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let row = |label: &str, value: &str| {
        println!("  {:<12} {}", style(label).dim(), value);
    };

    println!();
    println!("  {} {}", style("certdash").bold(), style(&info.version).cyan());
    println!();
    row("Backend", state.client.base_url());
    row(
        "Auth",
        if state.config.backend.token.is_some() {
            "token"
        } else {
            "anonymous"
        },
    );
    row("Data dir", &state.data_dir.display().to_string());
    println!();
    row("Source", &info.repo_url);
    row("Releases", &info.download_url);
    row("Docs", &info.document_url);
    println!();

    Ok(())
}
