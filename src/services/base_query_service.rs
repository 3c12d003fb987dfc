// ============================================================================
// BASE QUERY SERVICE - Shared plumbing for every resource service
// ============================================================================

use crate::api_client::ApiClient;
use crate::cache::QueryClient;
use crate::cache_key::{KeyPart, QueryKey, ResourceKeys};
use crate::cache_ttl::QueryOptions;
use crate::mutation::{Mutation, OptimisticHooks, OptimisticMutation};
use shared::Result;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Client, key prefix, options and transport owned by one resource service.
#[derive(Clone)]
pub struct BaseQueryService {
    client: Arc<QueryClient>,
    api: ApiClient,
    keys: ResourceKeys,
    options: QueryOptions,
}

impl BaseQueryService {
    pub fn new(
        client: Arc<QueryClient>,
        api: ApiClient,
        keys: ResourceKeys,
        options: QueryOptions,
    ) -> Self {
        Self {
            client,
            api,
            keys,
            options,
        }
    }

    pub fn keys(&self) -> &ResourceKeys {
        &self.keys
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Cached read with this resource's options.
    pub async fn fetch<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.client.fetch_query(key, &self.options, fetcher).await
    }
}

pub trait QueryClientService {
    fn base(&self) -> &BaseQueryService;

    fn query_client(&self) -> &Arc<QueryClient> {
        &self.base().client
    }

    fn query_key_prefix(&self) -> QueryKey {
        self.base().keys.all()
    }

    fn query_config(&self) -> &QueryOptions {
        &self.base().options
    }

    /// Mark every query of this resource stale.
    fn invalidate_all(&self) -> usize {
        let prefix = self.query_key_prefix();
        let count = self.query_client().invalidate_queries(&prefix);
        debug!("Invalidated {} queries under {}", count, prefix);
        count
    }

    /// Mark the queries of one entity stale, under both
    /// `[prefix, "single", id]` and `[prefix, id]`.
    fn invalidate_single(&self, id: i64) -> usize {
        let id = KeyPart::from(id);
        let client = self.query_client();
        client.invalidate_queries(&self.base().keys.single(id.clone()))
            + client.invalidate_queries(&self.query_key_prefix().with(id))
    }
}

pub trait MutationService: QueryClientService {
    /// Mutation that invalidates this service's prefix on success.
    fn create_mutation<I, R, F, Fut>(&self, call: F) -> Mutation<I, R>
    where
        I: Clone + Send + 'static,
        R: Clone + Send + Sync + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        Mutation::new(self.query_client().clone(), self.query_key_prefix(), call)
    }

    /// Mutation whose success callback replaces the default invalidation.
    fn create_mutation_with<I, R, F, Fut>(
        &self,
        call: F,
        on_success: impl Fn(&R, &I) + Send + Sync + 'static,
    ) -> Mutation<I, R>
    where
        I: Clone + Send + 'static,
        R: Clone + Send + Sync + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        self.create_mutation(call).on_success(on_success)
    }

    fn create_optimistic_mutation<I, R, C, F, Fut>(
        &self,
        call: F,
        hooks: OptimisticHooks<I, R, C>,
    ) -> OptimisticMutation<I, R, C>
    where
        I: Clone + Send + 'static,
        R: Clone + Send + Sync + 'static,
        C: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        OptimisticMutation::new(
            self.query_client().clone(),
            self.query_key_prefix(),
            call,
            hooks,
        )
    }
}

impl QueryClientService for BaseQueryService {
    fn base(&self) -> &BaseQueryService {
        self
    }
}

impl MutationService for BaseQueryService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_key::{ListKeyStyle, QueryKeys};
    use async_trait::async_trait;
    use serde_json::Value;
    use shared::{ApiRequest, ApiTransport, AppError};

    struct NoTransport;

    #[async_trait]
    impl ApiTransport for NoTransport {
        async fn send(&self, request: ApiRequest) -> Result<Value> {
            Err(AppError::internal(format!("unexpected request to {}", request.endpoint)))
        }
    }

    fn base(keys: ResourceKeys) -> BaseQueryService {
        BaseQueryService::new(
            Arc::new(QueryClient::default()),
            ApiClient::new(Arc::new(NoTransport), true),
            keys,
            QueryOptions::new(30, 300, 0),
        )
    }

    #[test]
    fn test_invalidate_single_hits_both_id_layouts() {
        let service = base(ResourceKeys::new("widgets", ListKeyStyle::Paged));
        let client = service.query_client();
        client.set_query_data(service.keys().single(7i64), 1u8);
        client.set_query_data(QueryKey::new("widgets").with(7i64), 2u8);
        client.set_query_data(service.keys().single(8i64), 3u8);

        assert_eq!(service.invalidate_single(7), 2);
        assert!(!client.query_state(&service.keys().single(8i64)).unwrap().is_invalidated);
    }

    #[test]
    fn test_invalidate_all_is_scoped_to_prefix() {
        let service = base(QueryKeys::USERS);
        let client = service.query_client();
        client.set_query_data(QueryKeys::user(1), 1u8);
        client.set_query_data(QueryKeys::account_profile(), 2u8);

        assert_eq!(service.invalidate_all(), 1);
        assert!(!client.query_state(&QueryKeys::account_profile()).unwrap().is_invalidated);
    }

    #[tokio::test]
    async fn test_mutation_is_bound_to_prefix() {
        let service = base(QueryKeys::USERS);
        service.query_client().set_query_data(QueryKeys::user(1), 1u8);

        let mutation = service.create_mutation(|id: i64| async move { Ok::<_, AppError>(id) });
        assert_eq!(mutation.prefix(), &QueryKey::new("users"));

        mutation.mutate(1).await.unwrap();
        assert!(service.query_client().query_state(&QueryKeys::user(1)).unwrap().is_invalidated);
    }
}
