// ============================================================================
// ACCOUNT SERVICE - The signed-in user's own profile
// ============================================================================

use super::models::{AvailableRoleDto, CreatePermissionRequest, ProfileDto, UpdateProfileRequest};
use crate::api_client::validate_request;
use crate::cache_key::QueryKeys;
use crate::mutation::Mutation;
use crate::services::{BaseQueryService, CacheCoordinationService, MutationService, QueryClientService};
use shared::Result;
use std::sync::Arc;
use tracing::info;

const ENDPOINT: &str = "/users/me";

pub struct AccountService {
    base: BaseQueryService,
    coordination: Arc<CacheCoordinationService>,
}

impl AccountService {
    pub fn new(base: BaseQueryService, coordination: Arc<CacheCoordinationService>) -> Self {
        Self { base, coordination }
    }

    pub async fn get_profile(&self) -> Result<ProfileDto> {
        let api = self.base.api().clone();
        self.base
            .fetch(QueryKeys::account_profile(), || {
                let api = api.clone();
                async move { api.get(ENDPOINT, Default::default()).await }
            })
            .await
    }

    /// Roles the user may still request.
    pub async fn get_available_roles(&self) -> Result<Vec<AvailableRoleDto>> {
        let api = self.base.api().clone();
        let endpoint = format!("{}/available-roles", ENDPOINT);
        self.base
            .fetch(QueryKeys::available_roles(), || {
                let api = api.clone();
                let endpoint = endpoint.clone();
                async move { api.get(&endpoint, Default::default()).await }
            })
            .await
    }

    /// Profile edits show up in admin user lists, so every user cache goes
    /// stale, not just the account prefix.
    pub fn update_profile(&self) -> Mutation<UpdateProfileRequest, ProfileDto> {
        let api = self.base.api().clone();
        let client = self.query_client().clone();
        let coordination = self.coordination.clone();

        self.create_mutation_with(
            move |request: UpdateProfileRequest| {
                let api = api.clone();
                async move {
                    validate_request(&request)?;
                    api.put(ENDPOINT, &request).await
                }
            },
            move |profile: &ProfileDto, _request: &UpdateProfileRequest| {
                client.set_query_data(QueryKeys::account_profile(), profile.clone());
                coordination.invalidate_all_user_caches();
                info!("✅ Profile updated for {}", profile.username);
            },
        )
    }

    pub fn create_permission_request(&self) -> Mutation<CreatePermissionRequest, ()> {
        let api = self.base.api().clone();
        let coordination = self.coordination.clone();

        self.create_mutation_with(
            move |request: CreatePermissionRequest| {
                let api = api.clone();
                async move {
                    validate_request(&request)?;
                    api.post(&format!("{}/permission-requests", ENDPOINT), &request)
                        .await
                }
            },
            move |_: &(), request: &CreatePermissionRequest| {
                coordination.invalidate_permission_caches();
                info!("📨 Permission request sent for {:?}", request.requested_roles);
            },
        )
    }
}

impl QueryClientService for AccountService {
    fn base(&self) -> &BaseQueryService {
        &self.base
    }
}

impl MutationService for AccountService {}
