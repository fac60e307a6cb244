//! PocketBase implementation of [`StatisticsRepository`].

use std::sync::Arc;

use reqwest::Method;

use certdash_core::repository::statistics::StatisticsRepository;
use certdash_types::error::RepositoryError;
use certdash_types::statistics::Statistics;

use super::client::PocketBaseClient;
use super::types::ApiEnvelope;

const STATISTICS_PATH: &str = "/api/statistics";

pub struct PocketBaseStatisticsRepository {
    client: Arc<PocketBaseClient>,
}

impl PocketBaseStatisticsRepository {
    pub fn new(client: Arc<PocketBaseClient>) -> Self {
        Self { client }
    }
}

impl StatisticsRepository for PocketBaseStatisticsRepository {
    async fn get(&self) -> Result<Statistics, RepositoryError> {
        tracing::debug!("fetching statistics");
        let envelope: ApiEnvelope<Statistics> = self
            .client
            .send_json(self.client.request(Method::GET, STATISTICS_PATH))
            .await?;
        envelope.into_data()
    }
}
