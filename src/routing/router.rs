//! API route lookup.
//!
//! # Responsibilities
//! - Store the resolved API routes
//! - Look up the route owning a request path
//! - Return the route together with the stripped remainder
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) prefix scan (route counts are tiny)
//! - First match wins; overlapping prefixes are rejected at startup

use crate::routing::upstream::ResolvedApi;

/// A matched API route.
#[derive(Debug, Clone, Copy)]
pub struct RouteMatch<'r, 'p> {
    pub route: &'r ResolvedApi,
    /// Path after the prefix; empty or starting with `/`.
    pub remainder: &'p str,
}

/// Table of proxied API prefixes.
#[derive(Debug, Default)]
pub struct ApiRouter {
    routes: Vec<ResolvedApi>,
}

impl ApiRouter {
    pub fn new(routes: Vec<ResolvedApi>) -> Self {
        Self { routes }
    }

    /// Find the route for a request path.
    pub fn match_path<'r, 'p>(&'r self, path: &'p str) -> Option<RouteMatch<'r, 'p>> {
        self.routes.iter().find_map(|route| {
            route
                .prefix
                .strip(path)
                .map(|remainder| RouteMatch { route, remainder })
        })
    }

    pub fn routes(&self) -> &[ResolvedApi] {
        &self.routes
    }
}
