//! Strategy registry: picks the strategy for a URL.
//!
//! Resolution filters the registered strategies by `can_handle`, then takes
//! the highest `priority()`. Equal priorities resolve to the strategy that
//! was registered first, so a given registry always answers the same way.

use std::fmt;

use tracing::{debug, instrument};

use crate::download::{HttpClient, RetryPolicy};

use super::{
    AcquisitionStrategy, DirectFetchStrategy, DriveFileStrategy, DriveFolderStrategy,
    ScrollSettings, SessionTimeouts, StrategyKind,
};

/// Ordered collection of strategies.
pub struct StrategyRegistry {
    strategies: Vec<Box<dyn AcquisitionStrategy>>,
}

impl StrategyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Appends a strategy. Registration order breaks priority ties.
    #[instrument(skip(self, strategy), fields(strategy_name))]
    pub fn register(&mut self, strategy: Box<dyn AcquisitionStrategy>) {
        tracing::Span::current().record("strategy_name", strategy.name());
        debug!(
            name = strategy.name(),
            priority = strategy.priority(),
            "registering strategy"
        );
        self.strategies.push(strategy);
    }

    /// Returns the number of registered strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns true if no strategies are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Returns every strategy that can handle `url`, in registration order.
    #[must_use]
    pub fn find_handlers(&self, url: &str) -> Vec<&dyn AcquisitionStrategy> {
        self.strategies
            .iter()
            .filter(|s| s.can_handle(url))
            .map(AsRef::as_ref)
            .collect()
    }

    /// Picks the strategy for `url`, or `None` if nothing claims it.
    #[must_use]
    pub fn resolve(&self, url: &str) -> Option<&dyn AcquisitionStrategy> {
        let mut best: Option<&dyn AcquisitionStrategy> = None;
        for candidate in self.find_handlers(url) {
            // Strictly greater: the earlier registration keeps a tie.
            if best.is_none_or(|current| candidate.priority() > current.priority()) {
                best = Some(candidate);
            }
        }
        if let Some(strategy) = best {
            debug!(url, strategy = strategy.name(), "strategy resolved");
        }
        best
    }

    /// First registered stateless strategy that can handle `url`.
    ///
    /// Used as the fallback when a session strategy yields nothing.
    #[must_use]
    pub fn direct_fallback(&self, url: &str) -> Option<&dyn AcquisitionStrategy> {
        self.strategies
            .iter()
            .map(AsRef::as_ref)
            .find(|s| s.kind() == StrategyKind::Direct && s.can_handle(url))
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.strategies.iter().map(|s| (s.name(), s.priority())))
            .finish()
    }
}

/// Builds the registry used by the pipeline: session strategies first, then
/// the direct fallback.
#[must_use]
pub fn build_default_registry(
    client: HttpClient,
    retry: RetryPolicy,
    html_suspect_bytes: u64,
    timeouts: SessionTimeouts,
    scroll: ScrollSettings,
    max_folder_depth: usize,
) -> StrategyRegistry {
    let mut registry = StrategyRegistry::new();
    registry.register(Box::new(DriveFileStrategy::new(timeouts)));
    registry.register(Box::new(DriveFolderStrategy::new(
        timeouts,
        scroll,
        max_folder_depth,
    )));
    registry.register(Box::new(
        DirectFetchStrategy::new(client, retry).with_html_suspect_bytes(html_suspect_bytes),
    ));
    registry
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::strategy::{DownloadContext, DownloadResult};

    struct Fixed {
        name: &'static str,
        priority: i32,
        prefix: &'static str,
    }

    #[async_trait]
    impl AcquisitionStrategy for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn kind(&self) -> StrategyKind {
            StrategyKind::Direct
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn can_handle(&self, url: &str) -> bool {
            url.starts_with(self.prefix)
        }

        async fn fetch(&self, url: &str, _ctx: &mut DownloadContext<'_>) -> Vec<DownloadResult> {
            vec![DownloadResult::failed(url, "not used")]
        }
    }

    fn fixed(name: &'static str, priority: i32, prefix: &'static str) -> Box<Fixed> {
        Box::new(Fixed {
            name,
            priority,
            prefix,
        })
    }

    #[test]
    fn test_resolve_none_when_unclaimed() {
        let mut registry = StrategyRegistry::new();
        registry.register(fixed("a", 0, "https://a."));
        assert!(registry.resolve("https://b.example/").is_none());
        assert!(StrategyRegistry::default().resolve("https://a.example").is_none());
    }

    #[test]
    fn test_resolve_prefers_higher_priority_regardless_of_order() {
        for flip in [false, true] {
            let mut registry = StrategyRegistry::new();
            let (first, second) = if flip {
                (fixed("high", 10, "https://"), fixed("low", 0, "https://"))
            } else {
                (fixed("low", 0, "https://"), fixed("high", 10, "https://"))
            };
            registry.register(first);
            registry.register(second);
            assert_eq!(registry.resolve("https://x.test/a").unwrap().name(), "high");
        }
    }

    #[test]
    fn test_resolve_tie_goes_to_first_registered() {
        let mut registry = StrategyRegistry::new();
        registry.register(fixed("first", 5, "https://"));
        registry.register(fixed("second", 5, "https://"));
        for _ in 0..10 {
            assert_eq!(registry.resolve("https://x.test/").unwrap().name(), "first");
        }
    }

    #[test]
    fn test_default_registry_routes_by_url_shape() {
        let registry = build_default_registry(
            HttpClient::new(),
            RetryPolicy::default(),
            51_200,
            SessionTimeouts::default(),
            ScrollSettings::default(),
            3,
        );
        assert_eq!(registry.len(), 3);
        let name = |url: &str| registry.resolve(url).map(|s| s.name());
        assert_eq!(name("https://drive.google.com/file/d/abc/view"), Some("drive_file"));
        assert_eq!(name("https://drive.google.com/drive/folders/abc"), Some("drive_folder"));
        assert_eq!(name("https://example.com/a.pdf"), Some("direct"));
        assert_eq!(name("mailto:a@b.c"), None);
        assert_eq!(
            registry
                .direct_fallback("https://drive.google.com/drive/folders/abc")
                .unwrap()
                .name(),
            "direct"
        );
        assert!(format!("{registry:?}").contains("drive_folder"));
    }
}
