use crate::api_client::ApiClient;
use crate::cache::QueryClient;
use crate::cache_key::{ResourceKeys, QueryKeys};
use crate::cache_ttl::QueryConfigs;
use crate::domains::{
    AccountService, HealthService, LogManagementService, PermissionRequestService, UserService,
};
use crate::services::{BaseQueryService, CacheCoordinationService};
use shared::{ApiTransport, Config, ServiceClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Shared state of the query layer.
///
/// Owns the single cache client, the transport and the coordination bus.
/// Services built from it share those; list services get fresh filter state
/// each time they are built.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub query_configs: QueryConfigs,
    pub query_client: Arc<QueryClient>,
    pub api: ApiClient,
    pub coordination: Arc<CacheCoordinationService>,
}

impl AppState {
    /// Build from environment configuration with the HTTP transport.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let transport = ServiceClient::new(
            config.api.base_url.clone(),
            "seventysix-api".to_string(),
            config.api.request_timeout_seconds,
        )?;
        Ok(Self::with_transport(config, QueryConfigs::from_env(), Arc::new(transport)))
    }

    /// Build with an explicit transport, e.g. a fake in tests.
    pub fn with_transport(
        config: Config,
        query_configs: QueryConfigs,
        transport: Arc<dyn ApiTransport>,
    ) -> Self {
        if !config.app.validate_responses {
            warn!(
                "⚠️ Response validation disabled (environment: {}); backend shape changes will not be detected",
                config.app.environment
            );
        }

        let query_client = Arc::new(QueryClient::new(query_configs.default));
        let api = ApiClient::new(transport, config.app.validate_responses);
        let coordination = Arc::new(CacheCoordinationService::new(query_client.clone()));

        info!(
            "✅ Query layer ready (api: {}, validation: {})",
            config.api.base_url, config.app.validate_responses
        );

        Self {
            config,
            query_configs,
            query_client,
            api,
            coordination,
        }
    }

    /// Start cache garbage collection on the configured interval.
    pub fn start_background_tasks(&self) -> JoinHandle<()> {
        self.query_client
            .start_garbage_collection(Duration::from_secs(self.config.cache.gc_interval_seconds))
    }

    fn base(&self, keys: ResourceKeys) -> BaseQueryService {
        BaseQueryService::new(
            self.query_client.clone(),
            self.api.clone(),
            keys,
            self.query_configs.for_resource(keys.resource()),
        )
    }

    pub fn log_management_service(&self) -> LogManagementService {
        LogManagementService::new(self.base(QueryKeys::LOGS))
    }

    pub fn user_service(&self) -> UserService {
        UserService::new(self.base(QueryKeys::USERS), self.coordination.clone())
    }

    pub fn account_service(&self) -> AccountService {
        AccountService::new(self.base(QueryKeys::ACCOUNT), self.coordination.clone())
    }

    pub fn permission_request_service(&self) -> PermissionRequestService {
        PermissionRequestService::new(
            self.base(QueryKeys::PERMISSION_REQUESTS),
            self.coordination.clone(),
        )
    }

    pub fn health_service(&self) -> HealthService {
        HealthService::new(self.base(QueryKeys::HEALTH))
    }
}
