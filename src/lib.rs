//! Query, mutation and cache-invalidation layer for the SeventySix API.
//!
//! Services read through a shared in-memory [`cache::QueryClient`], keyed by
//! [`cache_key::QueryKey`]s built from a central registry. Writes go through
//! [`mutation`]s that invalidate the affected prefixes, and cross-domain
//! staleness is propagated by the [`services::CacheCoordinationService`] bus.

pub mod api_client;
pub mod cache;
pub mod cache_key;
pub mod cache_ttl;
pub mod domains;
pub mod http_params;
pub mod mutation;
pub mod observability;
pub mod services;
pub mod state;
pub mod store;

pub use api_client::{ApiClient, ValidatedResponse};
pub use cache::{CacheEvent, CacheStats, QueryClient, QueryState};
pub use cache_key::{KeyPart, QueryKey, QueryKeys, ResourceKeys};
pub use cache_ttl::{QueryConfigs, QueryOptions};
pub use http_params::{build_http_params, HttpParams};
pub use mutation::{Mutation, MutationStatus, OptimisticHooks, OptimisticMutation};
pub use state::AppState;
pub use store::{toggle_set_item, SelectionSet, Store};
