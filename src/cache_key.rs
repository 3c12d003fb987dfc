//! Query key generation
//!
//! A query key is an ordered tuple `[resource, operation?, ...params]`.
//! Every key of a resource starts with the resource name, which is what
//! bulk invalidation matches on.

use serde::Serialize;
use shared::Result;
use std::fmt;

/// One segment of a query key.
///
/// Parameter objects are stored as their compact JSON rendering so that two
/// structurally equal filters hash and compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Text(String),
    Int(i64),
    Flag(bool),
    Params(String),
}

impl KeyPart {
    pub fn params<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(KeyPart::Params(serde_json::to_string(value)?))
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Text(s) => write!(f, "\"{}\"", s),
            KeyPart::Int(n) => write!(f, "{}", n),
            KeyPart::Flag(b) => write!(f, "{}", b),
            KeyPart::Params(json) => f.write_str(json),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Text(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::Text(value)
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        KeyPart::Int(value)
    }
}

impl From<i32> for KeyPart {
    fn from(value: i32) -> Self {
        KeyPart::Int(value as i64)
    }
}

impl From<u64> for KeyPart {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(n) => KeyPart::Int(n),
            Err(_) => KeyPart::Text(value.to_string()),
        }
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        KeyPart::Flag(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<KeyPart>);

impl QueryKey {
    pub fn new(resource: &str) -> Self {
        Self(vec![KeyPart::from(resource)])
    }

    pub fn from_parts(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    /// Append a segment, consuming the key.
    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn with_params<T: Serialize + ?Sized>(mut self, params: &T) -> Result<Self> {
        self.0.push(KeyPart::params(params)?);
        Ok(self)
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn resource(&self) -> Option<&str> {
        match self.0.first() {
            Some(KeyPart::Text(resource)) => Some(resource),
            _ => None,
        }
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", part)?;
        }
        f.write_str("]")
    }
}

/// Resource names, which double as the cache prefix of each resource.
pub mod resources {
    pub const LOGS: &str = "logs";
    pub const USERS: &str = "users";
    pub const ACCOUNT: &str = "account";
    pub const PERMISSION_REQUESTS: &str = "permissionRequests";
    pub const HEALTH: &str = "health";
}

/// How a resource lays out its list keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKeyStyle {
    /// `[resource, "paged", filter]`
    Paged,
    /// `[resource, filter]`
    Direct,
}

/// Key registry for a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceKeys {
    resource: &'static str,
    list_style: ListKeyStyle,
}

impl ResourceKeys {
    pub const fn new(resource: &'static str, list_style: ListKeyStyle) -> Self {
        Self {
            resource,
            list_style,
        }
    }

    pub fn resource(&self) -> &'static str {
        self.resource
    }

    /// `[resource]`, the prefix of every key below.
    pub fn all(&self) -> QueryKey {
        QueryKey::new(self.resource)
    }

    pub fn paged<F: Serialize + ?Sized>(&self, filter: &F) -> Result<QueryKey> {
        match self.list_style {
            ListKeyStyle::Paged => self.all().with("paged").with_params(filter),
            ListKeyStyle::Direct => self.all().with_params(filter),
        }
    }

    pub fn single(&self, id: impl Into<KeyPart>) -> QueryKey {
        self.all().with("single").with(id)
    }

    /// `[resource, "list"]` for unfiltered lists.
    pub fn list(&self) -> QueryKey {
        self.all().with("list")
    }

    /// Free-form sub-key, e.g. `[resource, "count", filter]`.
    pub fn scoped(&self, operation: &str) -> QueryKey {
        self.all().with(operation)
    }
}

/// Canonical key registry for every cached resource.
pub struct QueryKeys;

impl QueryKeys {
    pub const LOGS: ResourceKeys = ResourceKeys::new(resources::LOGS, ListKeyStyle::Direct);
    pub const USERS: ResourceKeys = ResourceKeys::new(resources::USERS, ListKeyStyle::Paged);
    pub const ACCOUNT: ResourceKeys = ResourceKeys::new(resources::ACCOUNT, ListKeyStyle::Paged);
    pub const PERMISSION_REQUESTS: ResourceKeys =
        ResourceKeys::new(resources::PERMISSION_REQUESTS, ListKeyStyle::Paged);
    pub const HEALTH: ResourceKeys = ResourceKeys::new(resources::HEALTH, ListKeyStyle::Direct);

    /// `["logs", "count", filter]`
    pub fn log_count<F: Serialize + ?Sized>(filter: &F) -> Result<QueryKey> {
        Self::LOGS.scoped("count").with_params(filter)
    }

    /// `["users", "user", id]`
    pub fn user(id: i64) -> QueryKey {
        Self::USERS.all().with("user").with(id)
    }

    /// `["users", "username", name]`
    pub fn user_by_username(username: &str) -> QueryKey {
        Self::USERS.scoped("username").with(username)
    }

    /// `["account", "profile"]`
    pub fn account_profile() -> QueryKey {
        Self::ACCOUNT.scoped("profile")
    }

    /// `["account", "availableRoles"]`
    pub fn available_roles() -> QueryKey {
        Self::ACCOUNT.scoped("availableRoles")
    }
}
