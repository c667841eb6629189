//! Reference asset lookup
//!
//! Maps request text to a reference audio URL for providers that accept one.

use async_trait::async_trait;

#[async_trait]
pub trait ReferenceAssetLookup: Send + Sync {
    /// Reference URL for `text`; falls back to the configured default, never fails
    async fn lookup(&self, text: &str) -> String;
}

/// Always returns the configured default URL
#[derive(Debug, Clone)]
pub struct StaticReferenceAsset {
    default_url: String,
}

impl StaticReferenceAsset {
    pub fn new(default_url: impl Into<String>) -> Self {
        Self {
            default_url: default_url.into(),
        }
    }
}

#[async_trait]
impl ReferenceAssetLookup for StaticReferenceAsset {
    async fn lookup(&self, _text: &str) -> String {
        self.default_url.clone()
    }
}
