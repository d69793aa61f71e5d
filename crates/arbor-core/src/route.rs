//! Route templates used by clients to address an RPC endpoint.
//!
//! A template is either a bare path (`/rpc`) or an absolute URL
//! (`http://host:8080/api/rpc/:signature`). A trailing `:param` segment means
//! every call is sent to `<static_route>/<signature>` instead of the static
//! route itself.

use crate::contracts::CHANNEL_SIGNATURE;
use crate::errors::RouteParseError;

/// Origin used when the template is a bare path.
pub const DEFAULT_ORIGIN: &str = "http://localhost";

/// A parsed endpoint template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteTemplate {
    origin: String,
    static_route: String,
    signature_suffix: bool,
}

impl RouteTemplate {
    /// Parse a template, rejecting parameters that are not the final segment,
    /// a parameter in first position, and templates with no static segments.
    pub fn parse(route: &str) -> Result<Self, RouteParseError> {
        let (origin, path) = split_origin(route)?;
        let Some(path) = path.strip_prefix('/') else {
            return Err(RouteParseError::new(route, "path must start with '/'"));
        };

        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let last = parts.len().saturating_sub(1);

        let mut static_route = String::new();
        let mut signature_suffix = false;
        for (index, part) in parts.iter().enumerate() {
            if part.starts_with(':') {
                if index == 0 || index != last {
                    return Err(RouteParseError::new(
                        route,
                        "a parameter is only allowed as the final, non-first segment",
                    ));
                }
                signature_suffix = true;
            } else {
                static_route.push('/');
                static_route.push_str(part);
            }
        }

        if static_route.is_empty() {
            return Err(RouteParseError::new(route, "static route must not be empty"));
        }

        Ok(Self {
            origin,
            static_route,
            signature_suffix,
        })
    }

    /// Scheme, host and port (no trailing slash).
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Static part of the path, e.g. `/api/rpc`.
    pub fn base_path(&self) -> &str {
        &self.static_route
    }

    /// Whether calls append their signature to the path.
    pub fn has_signature(&self) -> bool {
        self.signature_suffix
    }

    /// URL for a call with the given dot-joined signature.
    pub fn call_url(&self, signature: &str) -> String {
        if self.signature_suffix {
            format!("{}{}/{signature}", self.origin, self.static_route)
        } else {
            format!("{}{}", self.origin, self.static_route)
        }
    }

    /// URL used to open the push channel.
    pub fn channel_url(&self) -> String {
        self.call_url(CHANNEL_SIGNATURE)
    }
}

fn split_origin(route: &str) -> Result<(String, &str), RouteParseError> {
    let route_no_query = route.split(['?', '#']).next().unwrap_or_default();
    for scheme in ["http://", "https://"] {
        if let Some(rest) = route_no_query.strip_prefix(scheme) {
            let host_end = rest.find('/').unwrap_or(rest.len());
            if host_end == 0 {
                return Err(RouteParseError::new(route, "missing host"));
            }
            let origin = format!("{scheme}{}", &rest[..host_end]);
            let path = &rest[host_end..];
            return Ok((origin, if path.is_empty() { "/" } else { path }));
        }
    }
    if route_no_query.contains("://") {
        return Err(RouteParseError::new(route, "only http and https are supported"));
    }
    Ok((DEFAULT_ORIGIN.to_owned(), route_no_query))
}
