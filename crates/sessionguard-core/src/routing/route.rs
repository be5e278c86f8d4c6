use std::fmt;

use serde::{Deserialize, Serialize};

/// Access requirements attached to a route.
///
/// The flags are independent. A route that sets both is judged on the admin
/// requirement first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct RouteMeta {
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default)]
    pub requires_admin: bool,
}

impl RouteMeta {
    pub fn auth() -> Self {
        Self {
            requires_auth: true,
            requires_admin: false,
        }
    }

    pub fn admin() -> Self {
        Self {
            requires_auth: false,
            requires_admin: true,
        }
    }

    pub fn is_public(&self) -> bool {
        !self.requires_auth && !self.requires_admin
    }

    /// Combine a parent's requirements with a child's
    fn merge(self, child: RouteMeta) -> Self {
        Self {
            requires_auth: self.requires_auth || child.requires_auth,
            requires_admin: self.requires_admin || child.requires_admin,
        }
    }
}

/// A static route-table entry. Child paths are relative to the parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDef {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "RouteMeta::is_public")]
    pub meta: RouteMeta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RouteDef>,
}

impl RouteDef {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: None,
            meta: RouteMeta::default(),
            children: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn meta(mut self, meta: RouteMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn children(mut self, children: Vec<RouteDef>) -> Self {
        self.children = children;
        self
    }
}

/// A navigation target after matching, with the requirements of every
/// matched ancestor folded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub path: String,
    pub name: Option<String>,
    pub meta: RouteMeta,
}

/// Where a navigation should go: a literal path or a named route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    Path(String),
    Name(String),
}

impl RouteTarget {
    pub fn name(name: impl Into<String>) -> Self {
        RouteTarget::Name(name.into())
    }
}

impl From<&str> for RouteTarget {
    fn from(path: &str) -> Self {
        RouteTarget::Path(path.to_string())
    }
}

impl From<String> for RouteTarget {
    fn from(path: String) -> Self {
        RouteTarget::Path(path)
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteTarget::Path(path) => f.write_str(path),
            RouteTarget::Name(name) => write!(f, "{{name: {}}}", name),
        }
    }
}

/// Flattened, immutable route table.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    // Children come before their parent so an empty child path wins
    entries: Vec<ResolvedRoute>,
}

impl RouteTable {
    pub fn new(routes: Vec<RouteDef>) -> Self {
        let mut entries = Vec::new();
        for route in &routes {
            flatten(route, "", RouteMeta::default(), &mut entries);
        }
        Self { entries }
    }

    /// Match a path ignoring ASCII case, trailing slashes, query and
    /// fragment. The returned route carries the path as declared.
    pub fn resolve_path(&self, path: &str) -> Option<&ResolvedRoute> {
        let path = normalize_path(path);
        self.entries.iter().find(|r| r.path.eq_ignore_ascii_case(&path))
    }

    pub fn resolve_name(&self, name: &str) -> Option<&ResolvedRoute> {
        self.entries.iter().find(|r| r.name.as_deref() == Some(name))
    }

    pub fn resolve(&self, target: &RouteTarget) -> Option<&ResolvedRoute> {
        match target {
            RouteTarget::Path(path) => self.resolve_path(path),
            RouteTarget::Name(name) => self.resolve_name(name),
        }
    }

    pub fn path_for_name(&self, name: &str) -> Option<&str> {
        self.resolve_name(name).map(|r| r.path.as_str())
    }

    pub fn routes(&self) -> &[ResolvedRoute] {
        &self.entries
    }
}

fn flatten(
    route: &RouteDef,
    parent_path: &str,
    parent_meta: RouteMeta,
    out: &mut Vec<ResolvedRoute>,
) {
    let path = join_paths(parent_path, &route.path);
    let meta = parent_meta.merge(route.meta);
    for child in &route.children {
        flatten(child, &path, meta, out);
    }
    out.push(ResolvedRoute {
        path,
        name: route.name.clone(),
        meta,
    });
}

fn join_paths(parent: &str, child: &str) -> String {
    if child.starts_with('/') || parent.is_empty() {
        normalize_path(child)
    } else if child.is_empty() {
        normalize_path(parent)
    } else {
        normalize_path(&format!("{}/{}", parent.trim_end_matches('/'), child))
    }
}

pub(crate) fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", trimmed)
    }
}
