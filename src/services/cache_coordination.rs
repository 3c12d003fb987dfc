// ============================================================================
// CACHE COORDINATION - Cross-domain invalidation through an event bus
// ============================================================================
//
// A domain that changes data publishes `ResourceChanged`; every domain whose
// cached data depends on it subscribes and invalidates its own prefixes.
// All standard relationships live in `register_default_subscriptions`.

use crate::cache::QueryClient;
use crate::cache_key::{resources, QueryKey, QueryKeys};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceChanged {
    pub resource: String,
    pub id: Option<i64>,
}

impl ResourceChanged {
    pub fn new(resource: &str) -> Self {
        Self {
            resource: resource.to_string(),
            id: None,
        }
    }

    pub fn entity(resource: &str, id: i64) -> Self {
        Self {
            resource: resource.to_string(),
            id: Some(id),
        }
    }
}

type Handler = Arc<dyn Fn(&ResourceChanged) + Send + Sync>;

struct Subscription {
    resource: String,
    subscriber: String,
    handler: Handler,
}

/// Synchronous publish/subscribe keyed by resource name.
#[derive(Default)]
pub struct InvalidationBus {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl InvalidationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        resource: &str,
        subscriber: &str,
        handler: impl Fn(&ResourceChanged) + Send + Sync + 'static,
    ) {
        self.subscriptions.write().push(Subscription {
            resource: resource.to_string(),
            subscriber: subscriber.to_string(),
            handler: Arc::new(handler),
        });
    }

    /// Run every handler registered for the event's resource, in
    /// registration order. Returns how many ran.
    pub fn publish(&self, event: &ResourceChanged) -> usize {
        // Handlers run outside the lock so they may publish in turn
        let handlers: Vec<Handler> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.resource == event.resource)
            .map(|s| s.handler.clone())
            .collect();

        debug!(
            "📣 {} changed (id: {:?}), notifying {} subscribers",
            event.resource,
            event.id,
            handlers.len()
        );
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    /// Names of the subscribers listening to `resource`.
    pub fn subscribers(&self, resource: &str) -> Vec<String> {
        self.subscriptions
            .read()
            .iter()
            .filter(|s| s.resource == resource)
            .map(|s| s.subscriber.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.read().is_empty()
    }
}

pub struct CacheCoordinationService {
    client: Arc<QueryClient>,
    bus: Arc<InvalidationBus>,
}

impl CacheCoordinationService {
    /// Coordination service with the standard subscriptions registered.
    pub fn new(client: Arc<QueryClient>) -> Self {
        let service = Self::with_bus(client, Arc::new(InvalidationBus::new()));
        service.register_default_subscriptions();
        service
    }

    /// Coordination service over an existing bus, no subscriptions added.
    pub fn with_bus(client: Arc<QueryClient>, bus: Arc<InvalidationBus>) -> Self {
        Self { client, bus }
    }

    pub fn bus(&self) -> &Arc<InvalidationBus> {
        &self.bus
    }

    /// Which caches go stale when which resource changes:
    ///
    /// | change              | invalidates                          |
    /// |---------------------|--------------------------------------|
    /// | users               | users, account                       |
    /// | account             | users, account                       |
    /// | permission requests | permission requests, users, account  |
    pub fn register_default_subscriptions(&self) {
        let depends_on: [(&str, &[&str]); 3] = [
            (
                resources::USERS,
                &[resources::USERS, resources::ACCOUNT, resources::PERMISSION_REQUESTS],
            ),
            (
                resources::ACCOUNT,
                &[resources::USERS, resources::ACCOUNT, resources::PERMISSION_REQUESTS],
            ),
            (resources::PERMISSION_REQUESTS, &[resources::PERMISSION_REQUESTS]),
        ];

        for (subscriber, sources) in depends_on {
            for source in sources {
                let client = self.client.clone();
                let prefix = QueryKey::new(subscriber);
                self.bus.subscribe(source, subscriber, move |_event| {
                    client.invalidate_queries(&prefix);
                });
            }
        }
        info!("🔗 Registered {} cache coordination subscriptions", self.bus.len());
    }

    pub fn notify(&self, event: ResourceChanged) -> usize {
        self.bus.publish(&event)
    }

    /// Admin user lists, single users and the current profile.
    pub fn invalidate_all_user_caches(&self) -> usize {
        self.notify(ResourceChanged::new(resources::USERS))
    }

    /// Caches of one user. The single entry goes stale together with every
    /// list that may embed it.
    pub fn invalidate_user(&self, id: i64) -> usize {
        self.client.invalidate_queries(&QueryKeys::user(id));
        self.client.invalidate_queries(&QueryKeys::USERS.single(id));
        self.notify(ResourceChanged::entity(resources::USERS, id))
    }

    pub fn invalidate_account(&self) -> usize {
        self.notify(ResourceChanged::new(resources::ACCOUNT))
    }

    pub fn invalidate_permission_caches(&self) -> usize {
        self.notify(ResourceChanged::new(resources::PERMISSION_REQUESTS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn seeded() -> (Arc<QueryClient>, CacheCoordinationService) {
        let client = Arc::new(QueryClient::default());
        client.set_query_data(QueryKeys::USERS.all().with("paged"), 1u8);
        client.set_query_data(QueryKeys::user(3), 1u8);
        client.set_query_data(QueryKeys::account_profile(), 1u8);
        client.set_query_data(QueryKeys::PERMISSION_REQUESTS.list(), 1u8);
        client.set_query_data(QueryKeys::LOGS.all().with("p"), 1u8);
        let coordination = CacheCoordinationService::new(client.clone());
        (client, coordination)
    }

    fn invalidated(client: &QueryClient, key: &QueryKey) -> bool {
        client.query_state(key).map(|s| s.is_invalidated).unwrap_or(false)
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = InvalidationBus::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second"] {
            let calls = calls.clone();
            bus.subscribe("users", name, move |e| calls.lock().push((name, e.id)));
        }
        bus.subscribe("logs", "other", |_| panic!("wrong resource"));

        assert_eq!(bus.publish(&ResourceChanged::entity("users", 5)), 2);
        assert_eq!(*calls.lock(), vec![("first", Some(5)), ("second", Some(5))]);
        assert_eq!(bus.subscribers("users"), vec!["first", "second"]);
    }

    #[test]
    fn test_handler_may_publish() {
        let bus = Arc::new(InvalidationBus::new());
        let hits = Arc::new(Mutex::new(0));
        {
            let bus2 = bus.clone();
            bus.subscribe("a", "a->b", move |_| {
                bus2.publish(&ResourceChanged::new("b"));
            });
            let hits = hits.clone();
            bus.subscribe("b", "count", move |_| *hits.lock() += 1);
        }
        bus.publish(&ResourceChanged::new("a"));
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn test_user_change_reaches_account_but_not_logs() {
        let (client, coordination) = seeded();
        coordination.invalidate_all_user_caches();

        assert!(invalidated(&client, &QueryKeys::user(3)));
        assert!(invalidated(&client, &QueryKeys::account_profile()));
        assert!(!invalidated(&client, &QueryKeys::PERMISSION_REQUESTS.list()));
        assert!(!invalidated(&client, &QueryKeys::LOGS.all().with("p")));
    }

    #[test]
    fn test_permission_change_reaches_users_and_account() {
        let (client, coordination) = seeded();
        coordination.invalidate_permission_caches();

        assert!(invalidated(&client, &QueryKeys::PERMISSION_REQUESTS.list()));
        assert!(invalidated(&client, &QueryKeys::USERS.all().with("paged")));
        assert!(invalidated(&client, &QueryKeys::account_profile()));
        assert!(!invalidated(&client, &QueryKeys::LOGS.all().with("p")));
    }

    #[test]
    fn test_invalidate_user_marks_single_entry() {
        let (client, coordination) = seeded();
        coordination.invalidate_user(3);
        assert!(invalidated(&client, &QueryKeys::user(3)));
    }
}
