// ============================================================================
// FILTERED QUERY SERVICE - Paged list state on top of BaseQueryService
// ============================================================================

use super::base_query_service::{BaseQueryService, MutationService, QueryClientService};
use crate::cache_key::QueryKey;
use crate::http_params::{build_http_params, HttpParams};
use crate::store::{SelectionSet, Store};
use serde::Serialize;
use shared::Result;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Filter objects that carry paging fields.
pub trait PagedFilter: Clone + Serialize + Send + Sync + 'static {
    fn page(&self) -> i32;
    fn set_page(&mut self, page: i32);
    fn page_size(&self) -> i32;
    fn set_page_size(&mut self, page_size: i32);
}

pub struct FilteredQueryService<F: PagedFilter, Id = i64> {
    base: BaseQueryService,
    defaults: F,
    filter: Store<F>,
    refresh: AtomicU64,
    selection: Option<Arc<SelectionSet<Id>>>,
}

impl<F, Id> FilteredQueryService<F, Id>
where
    F: PagedFilter,
    Id: Eq + Hash + Clone,
{
    pub fn new(base: BaseQueryService, defaults: F) -> Self {
        Self {
            base,
            filter: Store::new(defaults.clone()),
            defaults,
            refresh: AtomicU64::new(0),
            selection: None,
        }
    }

    /// Attach a selection set that `reset_filter` empties as well.
    pub fn with_selection(mut self, selection: Arc<SelectionSet<Id>>) -> Self {
        self.selection = Some(selection);
        self
    }

    pub fn selection(&self) -> Option<&Arc<SelectionSet<Id>>> {
        self.selection.as_ref()
    }

    pub fn defaults(&self) -> &F {
        &self.defaults
    }

    pub fn filter(&self) -> Arc<F> {
        self.filter.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<F>> {
        self.filter.subscribe()
    }

    /// Merge changes into the filter and go back to the first page.
    pub fn update_filter(&self, changes: impl FnOnce(&mut F)) -> Arc<F> {
        self.filter.update(|filter| {
            changes(filter);
            filter.set_page(1);
        })
    }

    pub fn set_page(&self, page: i32) -> Arc<F> {
        self.filter.update(|filter| filter.set_page(page))
    }

    pub fn set_page_size(&self, page_size: i32) -> Arc<F> {
        self.filter.update(|filter| {
            filter.set_page_size(page_size);
            filter.set_page(1);
        })
    }

    pub fn reset_filter(&self) {
        self.filter.set(self.defaults.clone());
        if let Some(selection) = &self.selection {
            selection.clear();
        }
        debug!("Filter reset for {}", self.base.keys().resource());
    }

    pub fn clear_filters(&self) {
        self.reset_filter();
    }

    /// Bump the refresh token so the next read uses a fresh key.
    pub fn force_refresh(&self) -> u64 {
        self.refresh.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn refresh_token(&self) -> u64 {
        self.refresh.load(Ordering::SeqCst)
    }

    /// Key of the current page, refresh token included.
    pub fn paged_key(&self) -> Result<QueryKey> {
        Ok(self
            .base
            .keys()
            .paged(&*self.filter())?
            .with(self.refresh_token()))
    }

    pub fn params(&self) -> Result<HttpParams> {
        build_http_params(&*self.filter())
    }
}

impl<F: PagedFilter, Id> QueryClientService for FilteredQueryService<F, Id> {
    fn base(&self) -> &BaseQueryService {
        &self.base
    }
}

impl<F: PagedFilter, Id> MutationService for FilteredQueryService<F, Id> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::ApiClient;
    use crate::cache::QueryClient;
    use crate::cache_key::QueryKeys;
    use crate::cache_ttl::QueryOptions;
    use async_trait::async_trait;
    use serde_json::Value;
    use shared::{ApiRequest, ApiTransport, AppError};

    #[derive(Debug, Clone, PartialEq, Serialize)]
    #[serde(rename_all = "camelCase")]
    struct WidgetFilter {
        page: i32,
        page_size: i32,
        search_term: Option<String>,
    }

    impl PagedFilter for WidgetFilter {
        fn page(&self) -> i32 {
            self.page
        }
        fn set_page(&mut self, page: i32) {
            self.page = page;
        }
        fn page_size(&self) -> i32 {
            self.page_size
        }
        fn set_page_size(&mut self, page_size: i32) {
            self.page_size = page_size;
        }
    }

    struct NoTransport;

    #[async_trait]
    impl ApiTransport for NoTransport {
        async fn send(&self, _request: ApiRequest) -> Result<Value> {
            Err(AppError::internal("no transport"))
        }
    }

    fn service() -> FilteredQueryService<WidgetFilter> {
        let base = BaseQueryService::new(
            Arc::new(QueryClient::default()),
            ApiClient::new(Arc::new(NoTransport), false),
            QueryKeys::USERS,
            QueryOptions::new(30, 300, 0),
        );
        FilteredQueryService::new(
            base,
            WidgetFilter {
                page: 1,
                page_size: 50,
                search_term: None,
            },
        )
        .with_selection(Arc::new(SelectionSet::new()))
    }

    #[test]
    fn test_update_filter_resets_page() {
        let service = service();
        service.set_page(4);
        assert_eq!(service.filter().page(), 4);

        let filter = service.update_filter(|f| f.search_term = Some("ann".to_string()));
        assert_eq!(filter.page, 1);
        assert_eq!(filter.search_term.as_deref(), Some("ann"));
        assert_eq!(filter.page_size, 50);
    }

    #[test]
    fn test_set_page_size_resets_page() {
        let service = service();
        service.set_page(3);
        let filter = service.set_page_size(25);
        assert_eq!((filter.page, filter.page_size), (1, 25));
    }

    #[test]
    fn test_reset_restores_defaults_and_clears_selection() {
        let service = service();
        service.update_filter(|f| f.search_term = Some("x".to_string()));
        service.set_page(2);
        let selection = service.selection().unwrap();
        selection.toggle(&9);

        service.clear_filters();
        assert_eq!(*service.filter(), *service.defaults());
        assert!(selection.is_empty());
    }

    #[test]
    fn test_force_refresh_changes_key() {
        let service = service();
        let before = service.paged_key().unwrap();
        assert_eq!(service.force_refresh(), 1);
        let after = service.paged_key().unwrap();

        assert_ne!(before, after);
        assert!(after.starts_with(&QueryKey::new("users").with("paged")));
    }

    #[tokio::test]
    async fn test_filter_subscribers_see_each_change() {
        let service = service();
        let mut rx = service.subscribe();
        service.set_page(2);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().page, 2);
    }
}
