//! Route-template matching.
//!
//! Templates are compared segment-wise against concrete paths. A template
//! segment is a wildcard when it starts with `:` (gin/echo style), is wrapped
//! in braces (axum style), or equals `*`; a wildcard matches exactly one
//! segment. Static segments compare case-sensitively. Leading and trailing
//! slashes are normalized away.

use std::collections::HashMap;

/// Matches concrete request paths against route templates.
pub struct RouteMatcher;

impl RouteMatcher {
    /// Whether `actual` matches the route `template`.
    ///
    /// Segment counts must agree; wildcards never span multiple segments.
    #[must_use]
    pub fn matches(template: &str, actual: &str) -> bool {
        let template_parts = segments(template);
        let actual_parts = segments(actual);

        if template_parts.len() != actual_parts.len() {
            return false;
        }

        template_parts
            .iter()
            .zip(actual_parts.iter())
            .all(|(tpl, act)| is_wildcard(tpl) || tpl == act)
    }

    /// Extract named parameters from `actual` using `template`.
    ///
    /// Both `:name` and `{name}` segments contribute entries; anonymous `*`
    /// wildcards do not. Returns an empty map when the paths do not line up.
    #[must_use]
    pub fn extract_params(template: &str, actual: &str) -> HashMap<String, String> {
        let mut params = HashMap::new();

        let template_parts = segments(template);
        let actual_parts = segments(actual);

        if template_parts.len() != actual_parts.len() {
            return params;
        }

        for (tpl, act) in template_parts.iter().zip(actual_parts.iter()) {
            if let Some(name) = param_name(tpl) {
                params.insert(name.to_string(), (*act).to_string());
            }
        }

        params
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn is_wildcard(segment: &str) -> bool {
    segment == "*"
        || segment.starts_with(':')
        || (segment.starts_with('{') && segment.ends_with('}'))
}

fn param_name(segment: &str) -> Option<&str> {
    if let Some(name) = segment.strip_prefix(':') {
        return Some(name);
    }
    segment
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_match() {
        assert!(RouteMatcher::matches("/api/health", "/api/health"));
        assert!(!RouteMatcher::matches("/api/health", "/api/status"));
    }

    #[test]
    fn test_param_segment_matches_anything() {
        assert!(RouteMatcher::matches("/users/:id", "/users/42"));
        assert!(RouteMatcher::matches("/users/:id", "/users/alice"));
        assert!(RouteMatcher::matches("/users/:id/posts", "/users/42/posts"));
    }

    #[test]
    fn test_brace_segment_matches_anything() {
        assert!(RouteMatcher::matches("/users/{id}", "/users/42"));
        // Config templates in gin style match axum MatchedPath values.
        assert!(RouteMatcher::matches("/users/:id", "/users/{id}"));
    }

    #[test]
    fn test_star_matches_single_segment_only() {
        assert!(RouteMatcher::matches("/files/*", "/files/report"));
        assert!(!RouteMatcher::matches("/files/*", "/files/a/b"));
    }

    #[test]
    fn test_segment_count_mismatch() {
        assert!(!RouteMatcher::matches("/users/:id", "/users"));
        assert!(!RouteMatcher::matches("/users/:id", "/users/42/extra"));
    }

    #[test]
    fn test_trailing_slash_normalized() {
        assert!(RouteMatcher::matches("/users/:id/", "/users/42"));
        assert!(RouteMatcher::matches("/users/:id", "/users/42/"));
    }

    #[test]
    fn test_static_segments_case_sensitive() {
        assert!(!RouteMatcher::matches("/Users/:id", "/users/42"));
    }

    #[test]
    fn test_extract_params() {
        let params = RouteMatcher::extract_params("/users/:id/posts/:post", "/users/42/posts/7");
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert_eq!(params.get("post").map(String::as_str), Some("7"));
    }

    #[test]
    fn test_extract_params_brace_style() {
        let params = RouteMatcher::extract_params("/users/{id}", "/users/42");
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_extract_params_skips_anonymous_wildcard() {
        let params = RouteMatcher::extract_params("/files/*", "/files/report");
        assert!(params.is_empty());
    }

    #[test]
    fn test_extract_params_on_mismatch_is_empty() {
        let params = RouteMatcher::extract_params("/users/:id", "/users/42/extra");
        assert!(params.is_empty());
    }
}
