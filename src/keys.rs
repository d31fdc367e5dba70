//! Store key layout.
//!
//! ```text
//! flat cache     <prefix>:<group>:<key>
//! grouped cache  <prefix>:<group>           (hash, field = <key>)
//! pub/sub topic  <prefix>:pub:<topic>
//! ```
//!
//! With an empty prefix the leading `<prefix>:` is dropped. Nothing is
//! escaped: a `:` inside an evaluated key is part of the key, so
//! `group="a", key="b:c"` and `group="a:b", key="c"` share a slot.

const TOPIC_SEGMENT: &str = "pub";

#[derive(Debug, Clone, Default)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `<prefix>:<group>:<key>`
    #[must_use]
    pub fn key(&self, group: &str, key: &str) -> String {
        format!("{}:{}", self.group_key(group), key)
    }

    /// `<prefix>:<group>`
    #[must_use]
    pub fn group_key(&self, group: &str) -> String {
        self.namespaced(group)
    }

    /// SCAN pattern matching every flat key of a group.
    #[must_use]
    pub fn group_pattern(&self, group: &str) -> String {
        format!("{}:*", self.group_key(group))
    }

    /// Physical channel for a logical topic.
    #[must_use]
    pub fn topic(&self, logical: &str) -> String {
        self.namespaced(&format!("{}:{}", TOPIC_SEGMENT, logical))
    }

    fn namespaced(&self, rest: &str) -> String {
        if self.prefix.is_empty() {
            rest.to_string()
        } else {
            format!("{}:{}", self.prefix, rest)
        }
    }
}
