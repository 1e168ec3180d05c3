//! Core types for chanstate
//!
//! Defines the per-channel state record kept in the shared store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// State tracked for a single channel.
///
/// A channel either has no record at all (`Option::None` wherever a record
/// may be missing) or a fully formed `ChannelState` with `enabled` set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelState {
    /// Node currently owning the channel; empty when unowned
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_id: String,

    /// Participants currently tracked for the channel
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty", with = "member_set")]
    pub users: BTreeSet<String>,

    /// Whether the channel is enabled
    pub enabled: bool,
}

impl ChannelState {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn with_owner(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    pub fn with_users<I, U>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<String>,
    {
        self.users = users.into_iter().map(Into::into).collect();
        self
    }

    /// Owner node, if any
    pub fn owner(&self) -> Option<&str> {
        if self.node_id.is_empty() {
            None
        } else {
            Some(&self.node_id)
        }
    }

    pub fn is_owned_by(&self, node_id: &str) -> bool {
        !node_id.is_empty() && self.node_id == node_id
    }

    pub fn has_user(&self, user_id: &str) -> bool {
        self.users.contains(user_id)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChannelState(owner={}, users={}, enabled={})",
            self.owner().unwrap_or("-"),
            self.users.len(),
            self.enabled
        )
    }
}

/// Members are stored as a JSON object keyed by member id with empty
/// object values, the same layout other readers of the store expect.
/// Member values must be objects (contents ignored) or null.
mod member_set {
    use serde::de::{IgnoredAny, MapAccess, Visitor};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::{BTreeMap, BTreeSet};
    use std::fmt;

    #[derive(Serialize)]
    struct Present {}

    impl<'de> Deserialize<'de> for Present {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            struct PresentVisitor;

            impl<'de> Visitor<'de> for PresentVisitor {
                type Value = Present;

                fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str("an object or null")
                }

                fn visit_map<A>(self, mut map: A) -> Result<Present, A::Error>
                where
                    A: MapAccess<'de>,
                {
                    while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
                    Ok(Present {})
                }

                fn visit_unit<E>(self) -> Result<Present, E>
                where
                    E: serde::de::Error,
                {
                    Ok(Present {})
                }
            }

            deserializer.deserialize_any(PresentVisitor)
        }
    }

    pub fn serialize<S>(users: &BTreeSet<String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(users.iter().map(|u| (u, Present {})))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map: Option<BTreeMap<String, Present>> = Option::deserialize(deserializer)?;
        Ok(map.map(|m| m.into_keys().collect()).unwrap_or_default())
    }
}
