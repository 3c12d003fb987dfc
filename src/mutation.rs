//! Cache-invalidating mutations
//!
//! A mutation wraps an async call (usually one HTTP request) and keeps the
//! shared cache consistent afterwards:
//! - plain: on success run the custom callback if there is one, otherwise
//!   invalidate the resource prefix
//! - optimistic: apply the change up front, roll back on failure, and
//!   invalidate the prefix once when the call settles either way
//!
//! Mutations never retry.

use crate::cache::QueryClient;
use crate::cache_key::QueryKey;
use crate::observability::metrics;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use shared::{AppError, Result};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type MutationFn<I, R> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<R>> + Send + Sync>;
pub type SuccessFn<I, R> = Arc<dyn Fn(&R, &I) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    Idle,
    Pending,
    Success,
    Error,
}

#[derive(Debug)]
struct MutationState<R> {
    status: MutationStatus,
    data: Option<R>,
    error: Option<AppError>,
}

impl<R> Default for MutationState<R> {
    fn default() -> Self {
        Self {
            status: MutationStatus::Idle,
            data: None,
            error: None,
        }
    }
}

/// Status bookkeeping shared by both mutation flavours.
struct MutationCore<R> {
    client: Arc<QueryClient>,
    prefix: QueryKey,
    state: Mutex<MutationState<R>>,
}

impl<R: Clone> MutationCore<R> {
    fn new(client: Arc<QueryClient>, prefix: QueryKey) -> Self {
        Self {
            client,
            prefix,
            state: Mutex::new(MutationState::default()),
        }
    }

    fn begin(&self) {
        let mut state = self.state.lock();
        state.status = MutationStatus::Pending;
        state.error = None;
    }

    fn finish(&self, result: &Result<R>) {
        let resource = self.prefix.resource().unwrap_or("unknown");
        let mut state = self.state.lock();
        match result {
            Ok(data) => {
                state.status = MutationStatus::Success;
                state.data = Some(data.clone());
                state.error = None;
            }
            Err(e) => {
                state.status = MutationStatus::Error;
                state.error = Some(e.clone());
            }
        }
        metrics::record_mutation(resource, result.is_ok());
    }

    fn status(&self) -> MutationStatus {
        self.state.lock().status
    }

    fn data(&self) -> Option<R> {
        self.state.lock().data.clone()
    }

    fn error(&self) -> Option<AppError> {
        self.state.lock().error.clone()
    }

    fn reset(&self) {
        *self.state.lock() = MutationState::default();
    }
}

fn boxed_call<I, R, F, Fut>(call: F) -> MutationFn<I, R>
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    Arc::new(move |input| call(input).boxed())
}

// ============================================================================
// PLAIN MUTATION
// ============================================================================

pub struct Mutation<I, R> {
    core: MutationCore<R>,
    call: MutationFn<I, R>,
    on_success: Option<SuccessFn<I, R>>,
}

impl<I, R> Mutation<I, R>
where
    I: Clone + Send + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(client: Arc<QueryClient>, prefix: QueryKey, call: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        Self {
            core: MutationCore::new(client, prefix),
            call: boxed_call(call),
            on_success: None,
        }
    }

    /// Replace the default prefix invalidation with custom logic.
    pub fn on_success(mut self, callback: impl Fn(&R, &I) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn prefix(&self) -> &QueryKey {
        &self.core.prefix
    }

    pub async fn mutate(&self, input: I) -> Result<R> {
        self.core.begin();
        debug!("Mutation started under {}", self.core.prefix);

        let result = (self.call)(input.clone()).await;
        match &result {
            Ok(data) => {
                match &self.on_success {
                    Some(callback) => callback(data, &input),
                    None => {
                        self.core.client.invalidate_queries(&self.core.prefix);
                    }
                }
                info!("✅ Mutation under {} succeeded", self.core.prefix);
            }
            Err(e) => warn!("❌ Mutation under {} failed: {}", self.core.prefix, e),
        }

        self.core.finish(&result);
        result
    }

    pub fn status(&self) -> MutationStatus {
        self.core.status()
    }

    pub fn is_pending(&self) -> bool {
        self.core.status() == MutationStatus::Pending
    }

    pub fn is_success(&self) -> bool {
        self.core.status() == MutationStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.core.status() == MutationStatus::Error
    }

    pub fn data(&self) -> Option<R> {
        self.core.data()
    }

    pub fn error(&self) -> Option<AppError> {
        self.core.error()
    }

    pub fn reset(&self) {
        self.core.reset();
    }
}

// ============================================================================
// OPTIMISTIC MUTATION
// ============================================================================

/// Hooks of an optimistic mutation.
///
/// `on_mutate` applies the optimistic change and returns whatever snapshot
/// `on_error` needs to undo it; returning `None` means nothing to undo.
pub struct OptimisticHooks<I, R, C> {
    on_mutate: Arc<dyn Fn(&I) -> Option<C> + Send + Sync>,
    on_error: Arc<dyn Fn(C, &I) + Send + Sync>,
    on_success: Option<SuccessFn<I, R>>,
}

impl<I, R, C> OptimisticHooks<I, R, C> {
    pub fn new(
        on_mutate: impl Fn(&I) -> Option<C> + Send + Sync + 'static,
        on_error: impl Fn(C, &I) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_mutate: Arc::new(on_mutate),
            on_error: Arc::new(on_error),
            on_success: None,
        }
    }

    pub fn on_success(mut self, callback: impl Fn(&R, &I) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }
}

pub struct OptimisticMutation<I, R, C> {
    core: MutationCore<R>,
    call: MutationFn<I, R>,
    hooks: OptimisticHooks<I, R, C>,
}

impl<I, R, C> OptimisticMutation<I, R, C>
where
    I: Clone + Send + 'static,
    R: Clone + Send + Sync + 'static,
    C: Send + 'static,
{
    pub fn new<F, Fut>(
        client: Arc<QueryClient>,
        prefix: QueryKey,
        call: F,
        hooks: OptimisticHooks<I, R, C>,
    ) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        Self {
            core: MutationCore::new(client, prefix),
            call: boxed_call(call),
            hooks,
        }
    }

    pub fn prefix(&self) -> &QueryKey {
        &self.core.prefix
    }

    pub async fn mutate(&self, input: I) -> Result<R> {
        self.core.begin();

        // Runs before the request so readers see the change immediately
        let context = (self.hooks.on_mutate)(&input);

        let result = (self.call)(input.clone()).await;
        match &result {
            Ok(data) => {
                if let Some(callback) = &self.hooks.on_success {
                    callback(data, &input);
                }
                info!("✅ Optimistic mutation under {} confirmed", self.core.prefix);
            }
            Err(e) => {
                if let Some(context) = context {
                    warn!(
                        "↩️ Optimistic mutation under {} failed, rolling back: {}",
                        self.core.prefix, e
                    );
                    (self.hooks.on_error)(context, &input);
                    metrics::record_rollback(self.core.prefix.resource().unwrap_or("unknown"));
                } else {
                    warn!("❌ Optimistic mutation under {} failed: {}", self.core.prefix, e);
                }
            }
        }

        // Settle: always reconcile with the server
        self.core.client.invalidate_queries(&self.core.prefix);

        self.core.finish(&result);
        result
    }

    pub fn status(&self) -> MutationStatus {
        self.core.status()
    }

    pub fn is_pending(&self) -> bool {
        self.core.status() == MutationStatus::Pending
    }

    pub fn data(&self) -> Option<R> {
        self.core.data()
    }

    pub fn error(&self) -> Option<AppError> {
        self.core.error()
    }

    pub fn reset(&self) {
        self.core.reset();
    }
}
