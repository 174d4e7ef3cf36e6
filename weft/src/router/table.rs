//! The route table shared by a router and all of its sub-routers.
//!
//! Pattern matching is delegated to [`matchit`]: one tree per HTTP method,
//! plus one for routes registered with [`Router::any`](crate::Router::any).
//! Patterns use `:name` for a named segment and a trailing `*name` for a
//! catch-all.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use http::Method;
use weft_core::params::Params;

use super::Node;
use crate::handler::BoxedHandler;

/// The methods a route answers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MethodFilter {
    One(Method),
    Any,
}

/// A registered route: the handler and the router node that owns it.
#[derive(Clone)]
pub(crate) struct RouteEntry {
    pub(crate) handler: BoxedHandler,
    pub(crate) node: Arc<Node>,
}

/// The outcome of resolving a request against the table.
pub(crate) enum Resolution {
    Found {
        entry: RouteEntry,
        params: Params,
    },
    MethodNotAllowed {
        allowed: Vec<Method>,
    },
    NotFound,
}

impl Debug for Resolution {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Found { params, .. } => f.debug_struct("Found").field("params", params).finish(),
            Self::MethodNotAllowed { allowed } => f
                .debug_struct("MethodNotAllowed")
                .field("allowed", allowed)
                .finish(),
            Self::NotFound => f.write_str("NotFound"),
        }
    }
}

pub(crate) struct RouteTable {
    methods: HashMap<Method, matchit::Router<RouteEntry>>,
    any: matchit::Router<RouteEntry>,
    len: usize,
}

impl RouteTable {
    pub(crate) fn new() -> Self {
        Self {
            methods: HashMap::new(),
            any: matchit::Router::new(),
            len: 0,
        }
    }

    pub(crate) fn insert(
        &mut self,
        methods: MethodFilter,
        path: &str,
        entry: RouteEntry,
    ) -> Result<(), matchit::InsertError> {
        let tree = match methods {
            MethodFilter::One(method) => {
                self.methods.entry(method).or_insert_with(matchit::Router::new)
            }
            MethodFilter::Any => &mut self.any,
        };
        tree.insert(path, entry)?;
        self.len += 1;
        Ok(())
    }

    /// Resolves `path` for `method`.
    ///
    /// A route registered for the exact method wins over an `any` route.
    /// When neither matches, the other method trees are consulted to tell
    /// "wrong method" apart from "no such path".
    pub(crate) fn resolve(&self, method: &Method, path: &str) -> Resolution {
        let matched = self
            .methods
            .get(method)
            .and_then(|tree| tree.at(path).ok())
            .or_else(|| self.any.at(path).ok());
        if let Some(matched) = matched {
            return Resolution::Found {
                entry: matched.value.clone(),
                params: matched.params.iter().collect(),
            };
        }

        let mut allowed: Vec<Method> = self
            .methods
            .iter()
            .filter(|(registered, tree)| *registered != method && tree.at(path).is_ok())
            .map(|(registered, _)| registered.clone())
            .collect();
        if allowed.is_empty() {
            return Resolution::NotFound;
        }
        allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Resolution::MethodNotAllowed { allowed }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

impl Debug for RouteTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("routes", &self.len)
            .finish()
    }
}

/// Joins a router prefix and a route pattern into a full path.
///
/// A pattern of `/` (or an empty one) under a prefix maps to the prefix
/// itself, so `sub_router("/test").get("/", ...)` answers `/test`.
pub(crate) fn join_path(prefix: &str, pattern: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let pattern = pattern.trim_start_matches('/');
    match (prefix.is_empty(), pattern.is_empty()) {
        (true, true) => "/".to_owned(),
        (false, true) => prefix.to_owned(),
        _ => format!("{prefix}/{pattern}"),
    }
}
