// ============================================================================
// LOG MANAGEMENT SERVICE - Paged admin log viewer with batch delete
// ============================================================================

use super::models::{DeleteLogsRequest, LogDto, LogFilter};
use crate::cache_key::{QueryKey, QueryKeys};
use crate::http_params::HttpParams;
use crate::mutation::{Mutation, OptimisticHooks, OptimisticMutation};
use crate::services::{
    BaseQueryService, FilteredQueryService, MutationService, QueryClientService,
};
use crate::store::SelectionSet;
use shared::{PagedResult, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

const ENDPOINT: &str = "/logs";

/// Cached pages captured before an optimistic delete.
pub type LogPagesSnapshot = Vec<(QueryKey, PagedResult<LogDto>)>;

pub struct LogManagementService {
    filtered: FilteredQueryService<LogFilter, i64>,
    selection: Arc<SelectionSet<i64>>,
}

impl LogManagementService {
    /// Service whose default filter is the 24 hours preceding construction.
    pub fn new(base: BaseQueryService) -> Self {
        Self::with_defaults(base, LogFilter::default())
    }

    pub fn with_defaults(base: BaseQueryService, defaults: LogFilter) -> Self {
        let selection = Arc::new(SelectionSet::new());
        Self {
            filtered: FilteredQueryService::new(base, defaults).with_selection(selection.clone()),
            selection,
        }
    }

    // ------------------------------------------------------------------------
    // Filter state
    // ------------------------------------------------------------------------

    pub fn filter(&self) -> Arc<LogFilter> {
        self.filtered.filter()
    }

    pub fn subscribe_filter(&self) -> watch::Receiver<Arc<LogFilter>> {
        self.filtered.subscribe()
    }

    pub fn update_filter(&self, changes: impl FnOnce(&mut LogFilter)) -> Arc<LogFilter> {
        self.filtered.update_filter(changes)
    }

    pub fn set_page(&self, page: i32) -> Arc<LogFilter> {
        self.filtered.set_page(page)
    }

    pub fn set_page_size(&self, page_size: i32) -> Arc<LogFilter> {
        self.filtered.set_page_size(page_size)
    }

    /// Back to the construction-time window; the selection is emptied too.
    pub fn clear_filters(&self) {
        self.filtered.clear_filters();
    }

    pub fn force_refresh(&self) -> u64 {
        self.filtered.force_refresh()
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn get_logs(&self) -> Result<PagedResult<LogDto>> {
        let key = self.filtered.paged_key()?;
        let params = self.filtered.params()?;
        let api = self.base().api().clone();

        self.base()
            .fetch(key, || {
                let api = api.clone();
                let params = params.clone();
                async move { api.get(ENDPOINT, params).await }
            })
            .await
    }

    pub async fn get_log_count(&self) -> Result<i64> {
        let filter = self.filter();
        let key = QueryKeys::log_count(&*filter)?;
        let params = self.filtered.params()?;
        let api = self.base().api().clone();
        let endpoint = format!("{}/count", ENDPOINT);

        self.base()
            .fetch(key, || {
                let api = api.clone();
                let params: HttpParams = params.clone();
                let endpoint = endpoint.clone();
                async move { api.get(&endpoint, params).await }
            })
            .await
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    pub fn subscribe_selection(&self) -> watch::Receiver<Arc<HashSet<i64>>> {
        self.selection.subscribe()
    }

    pub fn selected_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.selection.ids().iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_selected(&self, id: i64) -> bool {
        self.selection.contains(&id)
    }

    pub fn toggle_selection(&self, id: i64) {
        self.selection.toggle(&id);
    }

    pub fn select_all(&self, ids: impl IntoIterator<Item = i64>) {
        self.selection.select_all(ids);
    }

    pub fn clear_selection(&self) {
        self.selection.clear();
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    pub fn delete_log(&self) -> Mutation<i64, ()> {
        let api = self.base().api().clone();
        self.create_mutation(move |id: i64| {
            let api = api.clone();
            async move { api.delete(&format!("{}/{}", ENDPOINT, id)).await }
        })
    }

    /// Batch delete of the given ids.
    ///
    /// Rows disappear from every cached page before the request is sent and
    /// come back if it fails. The selection is cleared on success.
    pub fn delete_selected(&self) -> OptimisticMutation<Vec<i64>, i64, LogPagesSnapshot> {
        let api = self.base().api().clone();
        let client = self.query_client().clone();
        let rollback_client = client.clone();
        let prefix = self.query_key_prefix();
        let selection = self.selection.clone();

        let hooks = OptimisticHooks::new(
            move |ids: &Vec<i64>| {
                let snapshot: LogPagesSnapshot = client.get_queries_data(&prefix);
                if snapshot.is_empty() {
                    return None;
                }
                for (key, page) in &snapshot {
                    let kept: Vec<LogDto> = page
                        .items
                        .iter()
                        .filter(|log| !ids.contains(&log.id))
                        .cloned()
                        .collect();
                    let removed = (page.items.len() - kept.len()) as i64;
                    client.set_query_data(
                        key.clone(),
                        PagedResult {
                            items: kept,
                            total_count: page.total_count - removed,
                            page: page.page,
                            page_size: page.page_size,
                        },
                    );
                }
                debug!("Optimistically removed {} logs from {} cached pages", ids.len(), snapshot.len());
                Some(snapshot)
            },
            move |snapshot: LogPagesSnapshot, _ids: &Vec<i64>| {
                for (key, page) in snapshot {
                    rollback_client.set_query_data(key, page);
                }
            },
        )
        .on_success(move |deleted: &i64, _ids: &Vec<i64>| {
            selection.clear();
            info!("🗑️ Deleted {} logs", deleted);
        });

        self.create_optimistic_mutation(
            move |ids: Vec<i64>| {
                let api = api.clone();
                async move {
                    api.delete_with_body(&format!("{}/batch", ENDPOINT), &DeleteLogsRequest { ids })
                        .await
                }
            },
            hooks,
        )
    }
}

impl QueryClientService for LogManagementService {
    fn base(&self) -> &BaseQueryService {
        self.filtered.base()
    }
}

impl MutationService for LogManagementService {}
