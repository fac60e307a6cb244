//! Application state shared by every command.
//!
//! Resolves the data directory, loads `config.toml`, applies CLI overrides
//! and builds the PocketBase client plus the process-wide realtime hub.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use certdash_infra::config::{load_app_config, resolve_data_dir};
use certdash_infra::pocketbase::{
    PocketBaseClient, PocketBaseStatisticsRepository, PocketBaseWorkflowRunRepository, RealtimeHub,
};
use certdash_types::config::{AppConfig, AppInfo};
use certdash_types::run::RunPatch;

/// Environment variable overriding the reported app version.
const APP_VERSION_ENV: &str = "CERTDASH_APP_VERSION";

/// Backend settings given on the command line. `None` keeps the config value.
#[derive(Debug, Default)]
pub struct BackendOverrides {
    pub url: Option<String>,
    pub token: Option<String>,
}

pub struct AppState {
    pub config: AppConfig,
    pub info: AppInfo,
    pub data_dir: PathBuf,
    pub client: Arc<PocketBaseClient>,
    pub hub: Arc<RealtimeHub<RunPatch>>,
}

impl AppState {
    pub async fn init(overrides: BackendOverrides) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        let mut config = load_app_config(&data_dir).await;
        if let Some(url) = overrides.url {
            config.backend.url = url;
        }
        if overrides.token.is_some() {
            config.backend.token = overrides.token;
        }

        let runtime_version = std::env::var(APP_VERSION_ENV).ok();
        let info = AppInfo::resolve(
            runtime_version.as_deref(),
            option_env!("CERTDASH_GIT_TAG"),
            &config.ui.locale,
        );

        let client = Arc::new(PocketBaseClient::new(&config.backend)?);
        let hub = RealtimeHub::new(
            Arc::clone(&client),
            Duration::from_secs(config.backend.connect_timeout_secs),
        );

        tracing::debug!(
            backend = %client.base_url(),
            data_dir = %data_dir.display(),
            version = %info.version,
            "application state ready"
        );

        Ok(Self {
            config,
            info,
            data_dir,
            client,
            hub,
        })
    }

    /// A repository handle for one view. Handles share the realtime hub.
    pub fn run_repository(&self) -> PocketBaseWorkflowRunRepository {
        PocketBaseWorkflowRunRepository::new(Arc::clone(&self.client), Arc::clone(&self.hub))
    }

    pub fn statistics_repository(&self) -> PocketBaseStatisticsRepository {
        PocketBaseStatisticsRepository::new(Arc::clone(&self.client))
    }
}
