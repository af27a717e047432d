//! Large-file subsystem configuration.

use crate::layout::LargeFileLayout;
use std::time::Duration;

/// Tracked pattern that covers the pointers directory of the default layout.
pub const DEFAULT_TRACKED_PATTERN: &str = ".project/attachments/pointers/**";

/// Configuration for staging, transfers and reconciliation.
#[derive(Debug, Clone)]
pub struct LfsConfig {
    /// Side-directory layout.
    pub layout: LargeFileLayout,
    /// Tracked patterns in addition to `.gitattributes` `filter=lfs` rules.
    pub tracked_patterns: Vec<String>,
    /// Batch endpoint override. Derived from the origin URL when unset.
    pub endpoint: Option<String>,
    /// Overall timeout for one HTTP request.
    pub http_timeout: Duration,
    /// Connect timeout for HTTP requests.
    pub connect_timeout: Duration,
}

impl Default for LfsConfig {
    fn default() -> Self {
        Self {
            layout: LargeFileLayout::default(),
            tracked_patterns: vec![DEFAULT_TRACKED_PATTERN.to_string()],
            endpoint: None,
            http_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl LfsConfig {
    /// Sets the layout.
    pub fn with_layout(mut self, layout: LargeFileLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Adds a tracked pattern.
    pub fn with_tracked_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.tracked_patterns.push(pattern.into());
        self
    }

    /// Overrides the batch endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the HTTP timeouts.
    pub fn with_timeouts(mut self, request: Duration, connect: Duration) -> Self {
        self.http_timeout = request;
        self.connect_timeout = connect;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        let config = LfsConfig::default()
            .with_tracked_pattern("*.psd")
            .with_endpoint("http://localhost/batch");
        assert_eq!(config.tracked_patterns.len(), 2);
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost/batch"));
    }
}
