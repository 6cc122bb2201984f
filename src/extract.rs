//! Request-path extraction from access log lines.
//!
//! Only one shape is recognised: `METHOD target HTTP/version`, anywhere in the
//! line. The target is normalised through a WHATWG URL parser and only its
//! path survives; query and fragment are discarded.

use crate::error::Rejection;
use crate::limits::ParseLimits;
use regex::bytes::Regex;
use std::sync::OnceLock;
use url::Url;

/// Base used to resolve origin-form targets such as `/a/b`.
const ORIGIN_BASE: &str = "http://localhost";

/// Method, version digits and word boundaries are ASCII-only: `PO\u{17f}T`
/// is not `POST` and `HTTP/\u{661}` is not a version.
fn request_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?-u:\b)(?i-u:GET|POST|PUT|DELETE|HEAD|OPTIONS)\s+(\S+)\s+(?i-u:HTTP)/[0-9](?:\.[0-9])?(?-u:\b)",
        )
        .expect("request-line pattern is valid")
    })
}

/// Extract the request path from a log line.
///
/// # Errors
///
/// - `LineTooLong` if the line exceeds `limits.max_line_len`
/// - `NoRequestLine` if no request line is present
/// - `MalformedTarget` if the target is not a parseable URL or has no
///   hierarchical path
/// - `PathTooLong` if the normalised path exceeds `limits.max_path_len`
pub fn extract_path(line: &str, limits: &ParseLimits) -> Result<String, Rejection> {
    if line.len() > limits.max_line_len {
        return Err(Rejection::LineTooLong {
            max: limits.max_line_len,
            got: line.len(),
        });
    }

    let caps = request_line()
        .captures(line.as_bytes())
        .ok_or(Rejection::NoRequestLine)?;
    // The target is delimited by whitespace, so it is whole UTF-8
    let target = caps
        .get(1)
        .and_then(|m| std::str::from_utf8(m.as_bytes()).ok())
        .ok_or(Rejection::NoRequestLine)?;

    let url = parse_target(target)?;
    let path = url.path();

    if !path.starts_with('/') {
        return Err(Rejection::MalformedTarget);
    }
    if path.len() > limits.max_path_len {
        return Err(Rejection::PathTooLong {
            max: limits.max_path_len,
            got: path.len(),
        });
    }

    Ok(path.to_string())
}

fn parse_target(target: &str) -> Result<Url, Rejection> {
    let parsed = if target.starts_with('/') {
        let base = Url::parse(ORIGIN_BASE).map_err(|_| Rejection::MalformedTarget)?;
        Url::options().base_url(Some(&base)).parse(target)
    } else {
        Url::parse(target)
    };
    parsed.map_err(|_| Rejection::MalformedTarget)
}
