//! Exact-match route table.
//!
//! One flat map keyed by `"<method> <path>"`, method lowercased, path
//! verbatim. No parameters, no wildcards, no trailing-slash folding:
//! `/about` and `/about/` are different routes.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::handler::{BoxedHandler, Handler};

/// Route key for a method + path pair.
pub(crate) fn route_key(method: &str, path: &str) -> String {
    format!("{} {path}", method.to_ascii_lowercase())
}

#[derive(Default)]
pub(crate) struct RouteTable {
    routes: HashMap<String, BoxedHandler>,
}

impl RouteTable {
    /// Store `handler` under the normalized key. The last registration for a
    /// key wins.
    pub(crate) fn insert(&mut self, method: &str, path: &str, handler: impl Handler) {
        if !path.starts_with('/') {
            warn!(method, path, "route path does not start with `/`, no request will match it");
        }
        let key = route_key(method, path);
        if self.routes.insert(key, handler.into_boxed_handler()).is_some() {
            debug!(method, path, "replaced existing route handler");
        }
    }

    pub(crate) fn resolve(&self, method: &str, url: &str) -> Option<BoxedHandler> {
        self.routes.get(&route_key(method, url)).map(Arc::clone)
    }

    pub(crate) fn len(&self) -> usize {
        self.routes.len()
    }
}
