// Forward rules: which backend a logical path goes to, and how it is rewritten
use serde::{Deserialize, Serialize};
use std::fmt;

/// Routes served by the face-recognition backend
pub const DEFAULT_FACE_ROUTES: &[&str] = &[
    "/analyze_image",
    "/add_face",
    "/recognize_face",
    "/analyze_image_stream",
];

/// Assets the primary backend serves outside its API prefix
pub const CACHE_PREFIX: &str = "/cache/";

/// API prefix of the primary backend
pub const PRIMARY_API_PREFIX: &str = "/api";

/// Backend a request is forwarded to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Primary,
    FaceRecognition,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Primary => f.write_str("primary"),
            Target::FaceRecognition => f.write_str("face_recognition"),
        }
    }
}

/// Path rewrite applied once a rule matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    Unchanged,
    Prefix(String),
}

impl Rewrite {
    pub fn apply(&self, path: &str) -> String {
        match self {
            Rewrite::Unchanged => path.to_string(),
            Rewrite::Prefix(prefix) => format!("{}{}", prefix, path),
        }
    }
}

/// Maps a set of path prefixes to a target and rewrite policy.
///
/// An empty prefix set matches every path (the default rule).
#[derive(Debug, Clone)]
pub struct ForwardRule {
    pub target: Target,
    pub match_prefixes: Vec<String>,
    pub rewrite: Rewrite,
}

impl ForwardRule {
    pub fn matches(&self, path: &str) -> bool {
        self.match_prefixes.is_empty()
            || self
                .match_prefixes
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// Outcome of classifying a logical path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub target: Target,
    /// Path to send to the target, without query string
    pub path: String,
}

/// Ordered forward rules; the first matching rule wins.
///
/// Built once at startup and immutable afterwards.
#[derive(Debug, Clone)]
pub struct RouteTable {
    rules: Vec<ForwardRule>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(DEFAULT_FACE_ROUTES.iter().map(|r| r.to_string()).collect())
    }
}

impl RouteTable {
    /// Face-recognition routes first, then cache assets, then the catch-all
    pub fn new(face_routes: Vec<String>) -> Self {
        let rules = vec![
            ForwardRule {
                target: Target::FaceRecognition,
                match_prefixes: face_routes,
                rewrite: Rewrite::Unchanged,
            },
            ForwardRule {
                target: Target::Primary,
                match_prefixes: vec![CACHE_PREFIX.to_string()],
                rewrite: Rewrite::Unchanged,
            },
            ForwardRule {
                target: Target::Primary,
                match_prefixes: Vec::new(),
                rewrite: Rewrite::Prefix(PRIMARY_API_PREFIX.to_string()),
            },
        ];
        Self { rules }
    }

    pub fn rules(&self) -> &[ForwardRule] {
        &self.rules
    }

    pub fn resolve(&self, logical_path: &str) -> Resolution {
        // The catch-all rule always matches, so the fallback is unreachable
        // unless a table was built without one.
        let rule = self
            .rules
            .iter()
            .find(|rule| rule.matches(logical_path));

        match rule {
            Some(rule) => Resolution {
                target: rule.target,
                path: rule.rewrite.apply(logical_path),
            },
            None => Resolution {
                target: Target::Primary,
                path: Rewrite::Prefix(PRIMARY_API_PREFIX.to_string()).apply(logical_path),
            },
        }
    }

    /// `base + path + ?query`
    pub fn target_url(base: &str, resolution: &Resolution, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", base, resolution.path, q),
            _ => format!("{}{}", base, resolution.path),
        }
    }
}

/// Strip the router's mount prefix (once) to obtain the logical path.
pub fn logical_path(mount_prefix: &str, request_path: &str) -> String {
    let stripped = request_path
        .strip_prefix(mount_prefix)
        .unwrap_or(request_path);
    if stripped.starts_with('/') {
        stripped.to_string()
    } else {
        format!("/{}", stripped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        RouteTable::default()
    }

    #[test]
    fn face_routes_go_to_face_backend_unchanged() {
        for path in [
            "/analyze_image",
            "/add_face",
            "/recognize_face",
            "/analyze_image_stream",
        ] {
            let res = table().resolve(path);
            assert_eq!(res.target, Target::FaceRecognition, "path {}", path);
            assert_eq!(res.path, path);
        }
    }

    #[test]
    fn face_route_match_is_by_prefix() {
        let res = table().resolve("/add_face/batch");
        assert_eq!(res.target, Target::FaceRecognition);
        assert_eq!(res.path, "/add_face/batch");
    }

    #[test]
    fn cache_assets_stay_on_primary_unchanged() {
        let res = table().resolve("/cache/thumb1.jpg");
        assert_eq!(res.target, Target::Primary);
        assert_eq!(res.path, "/cache/thumb1.jpg");
    }

    #[test]
    fn everything_else_gets_api_prefix_once() {
        let res = table().resolve("/documents");
        assert_eq!(res.target, Target::Primary);
        assert_eq!(res.path, "/api/documents");

        // Only `/cache/` (with the slash) is an asset path
        let res = table().resolve("/cache");
        assert_eq!(res.path, "/api/cache");
    }

    #[test]
    fn face_rule_has_priority_over_default() {
        let rules = table();
        assert_eq!(rules.rules()[0].target, Target::FaceRecognition);
        assert_eq!(rules.rules().len(), 3);
    }

    #[test]
    fn target_url_appends_query() {
        let res = table().resolve("/documents");
        assert_eq!(
            RouteTable::target_url("http://primary:5000", &res, Some("page=2")),
            "http://primary:5000/api/documents?page=2"
        );
        assert_eq!(
            RouteTable::target_url("http://primary:5000", &res, None),
            "http://primary:5000/api/documents"
        );
        assert_eq!(
            RouteTable::target_url("http://primary:5000", &res, Some("")),
            "http://primary:5000/api/documents"
        );
    }

    #[test]
    fn logical_path_strips_mount_prefix_once() {
        assert_eq!(logical_path("/api", "/api/documents"), "/documents");
        assert_eq!(logical_path("/api", "/api/api/documents"), "/api/documents");
        assert_eq!(logical_path("/api", "/api"), "/");
    }
}
