// Edge router - single HTTP entry point in front of the two backends
//
// Classifies each `/api/*` request by path prefix, rewrites the path and
// streams the request to the selected backend.

mod proxy;
pub mod rules;

pub use proxy::{EdgeRouter, ProxyError};
pub use rules::{logical_path, ForwardRule, Resolution, Rewrite, RouteTable, Target};
