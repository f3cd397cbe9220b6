//! Route table: path patterns mapped to handler kinds.
//!
//! Built once at startup and read-only afterwards; the Axum router is
//! derived from it.

/// What a route serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RouteKind {
    /// WebSocket upgrade into the taxi channel.
    TaxiChannel,
    /// JSON health check.
    Health,
    /// Prometheus scrape.
    Metrics,
}

/// Immutable table of `(path, kind)` pairs.
#[derive(Clone, Debug)]
pub struct RouteTable {
    entries: Vec<(&'static str, RouteKind)>,
}

impl RouteTable {
    /// The routes the server exposes.
    ///
    /// The channel answers on `/taxi/` and `/taxi` so clients need not agree
    /// on the trailing slash.
    pub fn standard() -> Self {
        Self {
            entries: vec![
                ("/taxi/", RouteKind::TaxiChannel),
                ("/taxi", RouteKind::TaxiChannel),
                ("/health", RouteKind::Health),
                ("/metrics", RouteKind::Metrics),
            ],
        }
    }

    /// Handler kind for an exact path.
    pub fn resolve(&self, path: &str) -> Option<RouteKind> {
        self.entries
            .iter()
            .find(|(pattern, _)| *pattern == path)
            .map(|(_, kind)| *kind)
    }

    /// All entries in declaration order.
    pub fn entries(&self) -> &[(&'static str, RouteKind)] {
        &self.entries
    }
}
