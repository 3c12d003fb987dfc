//! API health probe, cached briefly and never retried.

use crate::services::{BaseQueryService, QueryClientService};
use shared::{HealthStatus, Result};

const ENDPOINT: &str = "/health";

pub struct HealthService {
    base: BaseQueryService,
}

impl HealthService {
    pub fn new(base: BaseQueryService) -> Self {
        Self { base }
    }

    pub async fn get_status(&self) -> Result<HealthStatus> {
        let api = self.base.api().clone();
        self.base
            .fetch(self.base.keys().all(), || {
                let api = api.clone();
                async move { api.get(ENDPOINT, Default::default()).await }
            })
            .await
    }
}

impl QueryClientService for HealthService {
    fn base(&self) -> &BaseQueryService {
        &self.base
    }
}
