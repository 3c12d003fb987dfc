// ============================================================================
// USER SERVICE - Admin user management
// ============================================================================

use super::models::{BulkUserRequest, CreateUserRequest, UpdateUserRequest, UserDto, UserFilter};
use crate::api_client::{validate_request, ApiClient};
use crate::cache_key::QueryKeys;
use crate::mutation::Mutation;
use crate::services::{
    BaseQueryService, CacheCoordinationService, FilteredQueryService, MutationService,
    QueryClientService,
};
use shared::{PagedResult, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

const ENDPOINT: &str = "/users";

pub struct UserService {
    filtered: FilteredQueryService<UserFilter>,
    coordination: Arc<CacheCoordinationService>,
}

impl UserService {
    pub fn new(base: BaseQueryService, coordination: Arc<CacheCoordinationService>) -> Self {
        Self {
            filtered: FilteredQueryService::new(base, UserFilter::default()),
            coordination,
        }
    }

    /// Shared list state: `update_filter`, `set_page`, `clear_filters`, ...
    pub fn filters(&self) -> &FilteredQueryService<UserFilter> {
        &self.filtered
    }

    pub fn subscribe_filter(&self) -> watch::Receiver<Arc<UserFilter>> {
        self.filtered.subscribe()
    }

    fn api(&self) -> ApiClient {
        self.base().api().clone()
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn get_paged_users(&self) -> Result<PagedResult<UserDto>> {
        let key = self.filtered.paged_key()?;
        let params = self.filtered.params()?;
        let api = self.api();
        let endpoint = format!("{}/paged", ENDPOINT);

        self.base()
            .fetch(key, || {
                let api = api.clone();
                let params = params.clone();
                let endpoint = endpoint.clone();
                async move { api.get(&endpoint, params).await }
            })
            .await
    }

    pub async fn get_user(&self, id: i64) -> Result<UserDto> {
        let api = self.api();
        let endpoint = format!("{}/{}", ENDPOINT, id);

        self.base()
            .fetch(QueryKeys::user(id), || {
                let api = api.clone();
                let endpoint = endpoint.clone();
                async move { api.get(&endpoint, Default::default()).await }
            })
            .await
    }

    pub async fn get_by_username(&self, username: &str) -> Result<UserDto> {
        let api = self.api();
        // form encoding turns spaces into '+', which a path reads literally
        let segment = url::form_urlencoded::byte_serialize(username.as_bytes())
            .collect::<String>()
            .replace('+', "%20");
        let endpoint = format!("{}/username/{}", ENDPOINT, segment);

        self.base()
            .fetch(QueryKeys::user_by_username(username), || {
                let api = api.clone();
                let endpoint = endpoint.clone();
                async move { api.get(&endpoint, Default::default()).await }
            })
            .await
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    pub fn create_user(&self) -> Mutation<CreateUserRequest, UserDto> {
        let api = self.api();
        self.create_mutation(move |request: CreateUserRequest| {
            let api = api.clone();
            async move {
                validate_request(&request)?;
                api.post(ENDPOINT, &request).await
            }
        })
    }

    /// Update a user. The returned user is written to its single-user entry
    /// and every user-derived cache goes stale.
    pub fn update_user(&self) -> Mutation<UpdateUserRequest, UserDto> {
        let api = self.api();
        let client = self.query_client().clone();
        let coordination = self.coordination.clone();

        self.create_mutation_with(
            move |request: UpdateUserRequest| {
                let api = api.clone();
                async move {
                    validate_request(&request)?;
                    api.put(&format!("{}/{}", ENDPOINT, request.id), &request).await
                }
            },
            move |user: &UserDto, _request: &UpdateUserRequest| {
                client.set_query_data(QueryKeys::user(user.id), user.clone());
                coordination.invalidate_user(user.id);
                info!("✅ User {} updated", user.id);
            },
        )
    }

    pub fn delete_user(&self) -> Mutation<i64, ()> {
        let api = self.api();
        self.create_mutation(move |id: i64| {
            let api = api.clone();
            async move { api.delete(&format!("{}/{}", ENDPOINT, id)).await }
        })
    }

    pub fn restore_user(&self) -> Mutation<i64, ()> {
        let api = self.api();
        self.create_mutation(move |id: i64| {
            let api = api.clone();
            async move { api.post(&format!("{}/{}/restore", ENDPOINT, id), &()).await }
        })
    }

    /// Sends the user a password reset email. No cached data changes.
    pub fn reset_password(&self) -> Mutation<i64, ()> {
        let api = self.api();
        self.create_mutation_with(
            move |id: i64| {
                let api = api.clone();
                async move {
                    api.post(&format!("{}/{}/reset-password", ENDPOINT, id), &())
                        .await
                }
            },
            |_: &(), id: &i64| info!("📧 Password reset sent for user {}", id),
        )
    }

    pub fn bulk_activate(&self) -> Mutation<Vec<i64>, i64> {
        self.bulk_status_change("activate")
    }

    pub fn bulk_deactivate(&self) -> Mutation<Vec<i64>, i64> {
        self.bulk_status_change("deactivate")
    }

    fn bulk_status_change(&self, action: &'static str) -> Mutation<Vec<i64>, i64> {
        let api = self.api();
        let coordination = self.coordination.clone();

        self.create_mutation_with(
            move |ids: Vec<i64>| {
                let api = api.clone();
                async move {
                    api.post(&format!("{}/bulk/{}", ENDPOINT, action), &BulkUserRequest { ids })
                        .await
                }
            },
            move |changed: &i64, _ids: &Vec<i64>| {
                coordination.invalidate_all_user_caches();
                info!("✅ Bulk {}: {} users", action, changed);
            },
        )
    }
}

impl QueryClientService for UserService {
    fn base(&self) -> &BaseQueryService {
        self.filtered.base()
    }
}

impl MutationService for UserService {}
