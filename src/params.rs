//! Query-string normalization and caller context.
//!
//! Enumerated literals (`none`, `up`/`down`, `true`/`false`) are compared
//! after lower-casing, so `?full=FALSE` and `?full=false` are the same
//! request. Identifier values are kept verbatim.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

const NONE: &str = "none";
const ADMIN_ROLE: &str = "admin";

/// Raw query-string mapping as received from the router.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mapping from key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Returns the raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Reads an optional identifier; `none` in any casing means absent.
    fn ident(&self, key: &str) -> Option<String> {
        self.get(key)
            .filter(|value| !value.is_empty() && !value.eq_ignore_ascii_case(NONE))
            .map(str::to_owned)
    }

    /// Reads a boolean literal, falling back to `default` on anything else.
    fn flag(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.trim().to_lowercase()).as_deref() {
            Some("true") => true,
            Some("false") => false,
            _ => default,
        }
    }
}

/// Traversal direction relative to the `start` anchor.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    /// Follow outgoing edges away from the anchor.
    #[default]
    Down,
    /// Follow incoming edges towards the anchor.
    Up,
}

impl Direction {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("up") => Direction::Up,
            _ => Direction::Down,
        }
    }
}

/// Parameters for `GET /db`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListParams {
    /// Node id to anchor the traversal at.
    pub start: Option<String>,
    /// Traversal direction; ignored without `start`.
    pub direction: Direction,
    /// Return full nodes/edges instead of names and ids.
    pub full: bool,
}

impl ListParams {
    /// Normalizes the list parameters.
    pub fn from_query(query: &QueryParams) -> Self {
        Self {
            start: query.ident("start"),
            direction: Direction::parse(query.get("direction")),
            full: query.flag("full", true),
        }
    }
}

impl Default for ListParams {
    fn default() -> Self {
        Self::from_query(&QueryParams::new())
    }
}

/// Parameters for `GET /db/{id}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetParams {
    /// Opposite endpoint; selects the edge between `id` and `to`.
    pub to: Option<String>,
    /// Return the whole node instead of `{label, id}`; ignored with `to`.
    pub full: bool,
}

impl GetParams {
    /// Normalizes the get parameters.
    pub fn from_query(query: &QueryParams) -> Self {
        Self {
            to: query.ident("to"),
            full: query.flag("full", true),
        }
    }
}

/// Parameters for create, update and patch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteParams {
    /// Edge source; only used by create.
    pub from: Option<String>,
    /// Edge target.
    pub to: Option<String>,
}

impl WriteParams {
    /// Normalizes the write parameters.
    pub fn from_query(query: &QueryParams) -> Self {
        Self {
            from: query.ident("from"),
            to: query.ident("to"),
        }
    }
}

/// Parameters for `DELETE /db/{id}`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteParams {
    /// Opposite endpoint; selects the edge between `id` and `to`.
    pub to: Option<String>,
    /// Delete the node together with its edges; ignored with `to`.
    pub detach: bool,
}

impl DeleteParams {
    /// Normalizes the delete parameters.
    pub fn from_query(query: &QueryParams) -> Self {
        Self {
            to: query.ident("to"),
            detach: query.flag("detach", false),
        }
    }
}

/// Authenticated caller as forwarded by the upstream gateway.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Caller {
    /// Role name; only `admin` may mutate the graph.
    pub role: String,
    /// Caller identity, reported when a mutation is refused.
    pub identity: Option<String>,
}

impl Caller {
    /// Creates a caller with the given role.
    pub fn with_role(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            identity: None,
        }
    }

    /// Whether the caller may run mutating operations.
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}
