//! Block values as they appear in section palettes.
//!
//! A [`BlockState`] is a namespaced id (`minecraft:stone`) plus an optional
//! set of string properties (`axis=y`). Two states are the same palette entry
//! exactly when both the id and every property match.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

/// Namespaced id of the block every absent section implicitly holds.
pub const AIR_ID: &str = "minecraft:air";

static AIR: LazyLock<BlockState> = LazyLock::new(|| BlockState::new(AIR_ID));

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A block value: namespaced id plus state properties.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockState {
    /// Namespaced id, e.g. `minecraft:oak_log`.
    #[serde(rename = "Name")]
    pub name: String,
    /// State properties, e.g. `axis = "y"`. Sorted so equal states compare
    /// equal regardless of insertion order.
    #[serde(
        rename = "Properties",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub properties: BTreeMap<String, String>,
}

impl BlockState {
    /// Creates a state with the given id and no properties.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Returns this state with one property added (or replaced).
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Shared air instance, used as the read result for absent sections.
    pub fn air() -> &'static BlockState {
        &AIR
    }

    /// `true` for plain `minecraft:air` with no properties.
    pub fn is_air(&self) -> bool {
        self.name == AIR_ID && self.properties.is_empty()
    }

    /// A state with an empty id cannot be stored.
    pub fn has_name(&self) -> bool {
        !self.name.is_empty()
    }
}

impl Default for BlockState {
    fn default() -> Self {
        AIR.clone()
    }
}

impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.properties.is_empty() {
            return Ok(());
        }
        f.write_str("[")?;
        for (i, (key, value)) in self.properties.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("]")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
