//! Policy descriptors: immutable metadata attached to one operation.
//!
//! Descriptors are built once (in code or deserialized from a policy
//! table) and shared by reference with every call of the operation.
//!
//! # Example
//!
//! ```rust
//! use cachewire::policy::{Cacheable, Evict, Publish};
//!
//! let read = Cacheable::new("user", "#id").ttl_secs(60).unless("#result == null");
//! let evict_one = Evict::key("user", "#id");
//! let evict_all = Evict::all_entries("user").before_invoke();
//! let announce = Publish::new("user-updated").event("UPDATED").payload("#result.id");
//!
//! assert_eq!(read.ttl_secs, 60);
//! assert!(evict_all.all_entries && evict_all.before_invoke);
//! assert!(!evict_one.all_entries);
//! assert_eq!(announce.condition, "true");
//! ```

use serde::{Deserialize, Serialize};

use crate::expr::RESULT_VAR;

fn default_payload() -> String {
    format!("#{}", RESULT_VAR)
}

fn default_condition() -> String {
    "true".to_string()
}

/// Read-through caching of a flat `<prefix>:<group>:<key>` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cacheable {
    pub group: String,
    pub key: String,
    /// 0 uses the configured default.
    #[serde(default)]
    pub ttl_secs: u64,
    /// Blank means "always consult the cache".
    #[serde(default)]
    pub condition: String,
    /// Evaluated against `#result`; true vetoes the write.
    #[serde(default)]
    pub unless: String,
    /// Overrides `cache.cache_null` when set.
    #[serde(default)]
    pub cache_null: Option<bool>,
}

impl Cacheable {
    #[must_use]
    pub fn new(group: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            key: key.into(),
            ttl_secs: 0,
            condition: String::new(),
            unless: String::new(),
            cache_null: None,
        }
    }

    #[must_use]
    pub fn ttl_secs(mut self, secs: u64) -> Self {
        self.ttl_secs = secs;
        self
    }

    #[must_use]
    pub fn condition(mut self, expr: impl Into<String>) -> Self {
        self.condition = expr.into();
        self
    }

    #[must_use]
    pub fn unless(mut self, expr: impl Into<String>) -> Self {
        self.unless = expr.into();
        self
    }

    #[must_use]
    pub fn cache_null(mut self, allow: bool) -> Self {
        self.cache_null = Some(allow);
        self
    }
}

/// Flat-key eviction, one key or the whole group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evict {
    pub group: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub all_entries: bool,
    #[serde(default)]
    pub before_invoke: bool,
}

impl Evict {
    #[must_use]
    pub fn key(group: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            key: key.into(),
            all_entries: false,
            before_invoke: false,
        }
    }

    #[must_use]
    pub fn all_entries(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            key: String::new(),
            all_entries: true,
            before_invoke: false,
        }
    }

    #[must_use]
    pub fn before_invoke(mut self) -> Self {
        self.before_invoke = true;
        self
    }
}

/// Field read from the `<prefix>:<group>` hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashGet {
    pub group: String,
    pub field: String,
}

impl HashGet {
    #[must_use]
    pub fn new(group: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            field: field.into(),
        }
    }
}

/// Field write into the `<prefix>:<group>` hash. The TTL applies to the
/// whole hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashPut {
    pub group: String,
    pub field: String,
    #[serde(default)]
    pub ttl_secs: u64,
}

impl HashPut {
    #[must_use]
    pub fn new(group: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            field: field.into(),
            ttl_secs: 0,
        }
    }

    #[must_use]
    pub fn ttl_secs(mut self, secs: u64) -> Self {
        self.ttl_secs = secs;
        self
    }
}

/// Field or whole-hash eviction. Neither a field nor `all_entries` is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashEvict {
    pub group: String,
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub all_entries: bool,
    #[serde(default)]
    pub before_invoke: bool,
}

impl HashEvict {
    #[must_use]
    pub fn field(group: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            field: field.into(),
            all_entries: false,
            before_invoke: false,
        }
    }

    #[must_use]
    pub fn all_entries(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            field: String::new(),
            all_entries: true,
            before_invoke: false,
        }
    }

    #[must_use]
    pub fn before_invoke(mut self) -> Self {
        self.before_invoke = true;
        self
    }
}

/// Publish an envelope after the operation succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publish {
    pub topic: String,
    #[serde(default)]
    pub event: String,
    #[serde(default = "default_payload")]
    pub payload: String,
    #[serde(default = "default_condition")]
    pub condition: String,
}

impl Publish {
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            event: String::new(),
            payload: default_payload(),
            condition: default_condition(),
        }
    }

    #[must_use]
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = event.into();
        self
    }

    #[must_use]
    pub fn payload(mut self, expr: impl Into<String>) -> Self {
        self.payload = expr.into();
        self
    }

    #[must_use]
    pub fn condition(mut self, expr: impl Into<String>) -> Self {
        self.condition = expr.into();
        self
    }
}

/// Deliver messages on a topic to a handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscribe {
    pub topic: String,
    /// Empty accepts every event.
    #[serde(default)]
    pub event: String,
    /// Evaluated against `#payload` and `#event`.
    #[serde(default)]
    pub condition: String,
}

impl Subscribe {
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            event: String::new(),
            condition: String::new(),
        }
    }

    #[must_use]
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = event.into();
        self
    }

    #[must_use]
    pub fn condition(mut self, expr: impl Into<String>) -> Self {
        self.condition = expr.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    ReadThrough,
    Evict,
    GroupedGet,
    GroupedPut,
    GroupedEvict,
    Publish,
    Subscribe,
}

impl PolicyKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyKind::ReadThrough => "cacheable",
            PolicyKind::Evict => "evict",
            PolicyKind::GroupedGet => "hash_get",
            PolicyKind::GroupedPut => "hash_put",
            PolicyKind::GroupedEvict => "hash_evict",
            PolicyKind::Publish => "publish",
            PolicyKind::Subscribe => "subscribe",
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any descriptor, tagged by kind, for storing descriptors in TOML or
/// JSON. The engine does not dispatch on it: unwrap the variant and pass
/// the inner descriptor to the matching `PolicyEngine` method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyDescriptor {
    Cacheable(Cacheable),
    Evict(Evict),
    HashGet(HashGet),
    HashPut(HashPut),
    HashEvict(HashEvict),
    Publish(Publish),
    Subscribe(Subscribe),
}

impl PolicyDescriptor {
    #[must_use]
    pub fn kind(&self) -> PolicyKind {
        match self {
            PolicyDescriptor::Cacheable(_) => PolicyKind::ReadThrough,
            PolicyDescriptor::Evict(_) => PolicyKind::Evict,
            PolicyDescriptor::HashGet(_) => PolicyKind::GroupedGet,
            PolicyDescriptor::HashPut(_) => PolicyKind::GroupedPut,
            PolicyDescriptor::HashEvict(_) => PolicyKind::GroupedEvict,
            PolicyDescriptor::Publish(_) => PolicyKind::Publish,
            PolicyDescriptor::Subscribe(_) => PolicyKind::Subscribe,
        }
    }

    /// Cache group, for the cache policies.
    #[must_use]
    pub fn group(&self) -> Option<&str> {
        match self {
            PolicyDescriptor::Cacheable(d) => Some(&d.group),
            PolicyDescriptor::Evict(d) => Some(&d.group),
            PolicyDescriptor::HashGet(d) => Some(&d.group),
            PolicyDescriptor::HashPut(d) => Some(&d.group),
            PolicyDescriptor::HashEvict(d) => Some(&d.group),
            PolicyDescriptor::Publish(_) | PolicyDescriptor::Subscribe(_) => None,
        }
    }

    /// Logical topic, for the pub/sub policies.
    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        match self {
            PolicyDescriptor::Publish(d) => Some(&d.topic),
            PolicyDescriptor::Subscribe(d) => Some(&d.topic),
            _ => None,
        }
    }
}

macro_rules! impl_from_descriptor {
    ($($variant:ident),*) => {
        $(impl From<$variant> for PolicyDescriptor {
            fn from(d: $variant) -> Self {
                PolicyDescriptor::$variant(d)
            }
        })*
    };
}

impl_from_descriptor!(Cacheable, Evict, HashGet, HashPut, HashEvict, Publish, Subscribe);
