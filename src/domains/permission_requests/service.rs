// ============================================================================
// PERMISSION REQUEST SERVICE - Admin review of role requests
// ============================================================================

use super::models::{BulkPermissionRequest, PermissionRequestDto};
use crate::cache_key::QueryKeys;
use crate::mutation::Mutation;
use crate::services::{BaseQueryService, CacheCoordinationService, MutationService, QueryClientService};
use shared::Result;
use std::sync::Arc;
use tracing::info;

const ENDPOINT: &str = "/users/permission-requests";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Approve,
    Reject,
}

impl Decision {
    fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }
}

pub struct PermissionRequestService {
    base: BaseQueryService,
    coordination: Arc<CacheCoordinationService>,
}

impl PermissionRequestService {
    pub fn new(base: BaseQueryService, coordination: Arc<CacheCoordinationService>) -> Self {
        Self { base, coordination }
    }

    pub async fn get_all(&self) -> Result<Vec<PermissionRequestDto>> {
        let api = self.base.api().clone();
        self.base
            .fetch(QueryKeys::PERMISSION_REQUESTS.list(), || {
                let api = api.clone();
                async move { api.get(ENDPOINT, Default::default()).await }
            })
            .await
    }

    pub fn approve(&self) -> Mutation<i64, ()> {
        self.decide(Decision::Approve)
    }

    pub fn reject(&self) -> Mutation<i64, ()> {
        self.decide(Decision::Reject)
    }

    pub fn bulk_approve(&self) -> Mutation<Vec<i64>, i64> {
        self.decide_bulk(Decision::Approve)
    }

    pub fn bulk_reject(&self) -> Mutation<Vec<i64>, i64> {
        self.decide_bulk(Decision::Reject)
    }

    // Approval changes the requester's roles, so user caches follow along
    // through the coordination subscriptions.
    fn decide(&self, decision: Decision) -> Mutation<i64, ()> {
        let api = self.base.api().clone();
        let coordination = self.coordination.clone();

        self.create_mutation_with(
            move |id: i64| {
                let api = api.clone();
                async move {
                    api.post(&format!("{}/{}/{}", ENDPOINT, id, decision.as_str()), &())
                        .await
                }
            },
            move |_: &(), id: &i64| {
                coordination.invalidate_permission_caches();
                info!("✅ Permission request {} {}d", id, decision.as_str());
            },
        )
    }

    fn decide_bulk(&self, decision: Decision) -> Mutation<Vec<i64>, i64> {
        let api = self.base.api().clone();
        let coordination = self.coordination.clone();

        self.create_mutation_with(
            move |ids: Vec<i64>| {
                let api = api.clone();
                async move {
                    api.post(
                        &format!("{}/bulk/{}", ENDPOINT, decision.as_str()),
                        &BulkPermissionRequest { ids },
                    )
                    .await
                }
            },
            move |processed: &i64, _ids: &Vec<i64>| {
                coordination.invalidate_permission_caches();
                info!("✅ Bulk {}: {} permission requests", decision.as_str(), processed);
            },
        )
    }
}

impl QueryClientService for PermissionRequestService {
    fn base(&self) -> &BaseQueryService {
        &self.base
    }
}

impl MutationService for PermissionRequestService {}
