// ============================================================================
// QUERY SERVICES - Building blocks shared by every domain
// ============================================================================
pub mod base_query_service;
pub mod cache_coordination;
pub mod filtered_query_service;

pub use base_query_service::{BaseQueryService, MutationService, QueryClientService};
pub use cache_coordination::{CacheCoordinationService, InvalidationBus, ResourceChanged};
pub use filtered_query_service::{FilteredQueryService, PagedFilter};
