pub mod asset_store;
pub mod config_store;
pub mod paths;

use std::fmt;

use serde::Serialize;

/// Identity of one asset across the local tree and the remote mirror.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct AssetId {
    pub category: String,
    pub filename: String,
}

impl AssetId {
    pub fn new(category: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            filename: filename.into(),
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.filename)
    }
}
