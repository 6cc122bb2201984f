//! Path to command decoding.
//!
//! `/deploy/staging%2Fweb` becomes `["deploy", "staging/web"]`. Each segment
//! is decoded on its own, so an encoded `/` can never split a segment. A
//! single bad escape anywhere rejects the whole path: a partial decode is
//! never returned.

use crate::error::Rejection;
use crate::limits::ParseLimits;
use crate::request::ParsedCommand;
use percent_encoding::percent_decode_str;

/// Split and decode a request path into a command name and arguments.
///
/// Empty segments are discarded, so `//echo//hi/` is `["echo", "hi"]`.
///
/// # Errors
///
/// - `PathNotAbsolute` if the path does not start with `/`
/// - `PathTooLong`, `TooManySegments`, `SegmentTooLong` on size limits
/// - `EmptyPath` if no non-empty segment remains
/// - `InvalidEncoding` if any segment has a malformed escape or decodes to
///   invalid UTF-8
pub fn parse_command(path: &str, limits: &ParseLimits) -> Result<ParsedCommand, Rejection> {
    if !path.starts_with('/') {
        return Err(Rejection::PathNotAbsolute);
    }
    if path.len() > limits.max_path_len {
        return Err(Rejection::PathTooLong {
            max: limits.max_path_len,
            got: path.len(),
        });
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(Rejection::EmptyPath);
    }
    if segments.len() > limits.max_segments {
        return Err(Rejection::TooManySegments {
            max: limits.max_segments,
            got: segments.len(),
        });
    }

    let mut decoded = Vec::with_capacity(segments.len());
    for (index, segment) in segments.into_iter().enumerate() {
        check_segment_len(segment.len(), limits)?;
        let value = decode_segment(segment).ok_or(Rejection::InvalidEncoding { index })?;
        check_segment_len(value.len(), limits)?;
        decoded.push(value);
    }

    Ok(ParsedCommand::from_elements(decoded))
}

fn check_segment_len(len: usize, limits: &ParseLimits) -> Result<(), Rejection> {
    if len > limits.max_segment_len {
        return Err(Rejection::SegmentTooLong {
            max: limits.max_segment_len,
            got: len,
        });
    }
    Ok(())
}

/// Strictly percent-decode one segment.
///
/// `percent_decode_str` passes malformed escapes through untouched, so every
/// `%` is checked for two hex digits first.
fn decode_segment(segment: &str) -> Option<String> {
    if !escapes_well_formed(segment.as_bytes()) {
        return None;
    }
    percent_decode_str(segment)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

fn escapes_well_formed(bytes: &[u8]) -> bool {
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = bytes.get(i + 1);
            let lo = bytes.get(i + 2);
            match (hi, lo) {
                (Some(h), Some(l)) if h.is_ascii_hexdigit() && l.is_ascii_hexdigit() => i += 3,
                _ => return false,
            }
        } else {
            i += 1;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(path: &str) -> Result<Vec<String>, Rejection> {
        parse_command(path, &ParseLimits::default()).map(ParsedCommand::into_elements)
    }

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_decodes_segments() {
        assert_eq!(parse("/cmd/Hello%20World").unwrap(), s(&["cmd", "Hello World"]));
    }

    #[test]
    fn test_encoded_slash_stays_in_segment() {
        assert_eq!(
            parse("/deploy/staging%2Fweb").unwrap(),
            s(&["deploy", "staging/web"])
        );
    }

    #[test]
    fn test_empty_segments_collapse() {
        assert_eq!(parse("//echo//hi/").unwrap(), s(&["echo", "hi"]));
    }

    #[test]
    fn test_already_decoded_is_unchanged() {
        assert_eq!(parse("/echo/plain").unwrap(), s(&["echo", "plain"]));
    }

    #[test]
    fn test_truncated_escape_rejects_whole_path() {
        assert_eq!(
            parse("/cmd/%E0%A4%A"),
            Err(Rejection::InvalidEncoding { index: 1 })
        );
    }

    #[test]
    fn test_bad_escape_in_later_segment_rejects_all() {
        assert!(parse("/echo/ok/%zz").is_err());
        assert!(parse("/echo/%/ok").is_err());
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        // Well-formed escapes, but not a complete UTF-8 sequence
        assert_eq!(parse("/cmd/%E0%A4"), Err(Rejection::InvalidEncoding { index: 1 }));
        assert!(parse("/cmd/%FF").is_err());
    }

    #[test]
    fn test_multibyte_utf8_decoded() {
        assert_eq!(parse("/say/%E0%A4%A8").unwrap(), s(&["say", "\u{0928}"]));
    }

    #[test]
    fn test_must_start_with_slash() {
        assert_eq!(parse("echo/hi"), Err(Rejection::PathNotAbsolute));
        assert_eq!(parse(""), Err(Rejection::PathNotAbsolute));
    }

    #[test]
    fn test_root_only_is_empty() {
        assert_eq!(parse("/"), Err(Rejection::EmptyPath));
        assert_eq!(parse("///"), Err(Rejection::EmptyPath));
    }

    #[test]
    fn test_segment_count_limit() {
        let limits = ParseLimits {
            max_segments: 3,
            ..ParseLimits::default()
        };
        assert!(parse_command("/a/b/c", &limits).is_ok());
        assert_eq!(
            parse_command("/a/b/c/d", &limits).map(ParsedCommand::into_elements),
            Err(Rejection::TooManySegments { max: 3, got: 4 })
        );
    }

    #[test]
    fn test_raw_segment_length_limit() {
        let limits = ParseLimits {
            max_segment_len: 4,
            ..ParseLimits::default()
        };
        assert!(parse_command("/echo/abcd", &limits).is_ok());
        assert!(matches!(
            parse_command("/echo/abcde", &limits),
            Err(Rejection::SegmentTooLong { max: 4, got: 5 })
        ));
    }

    #[test]
    fn test_path_length_limit() {
        let limits = ParseLimits {
            max_path_len: 10,
            ..ParseLimits::default()
        };
        assert!(matches!(
            parse_command("/echo/hello-there", &limits),
            Err(Rejection::PathTooLong { max: 10, .. })
        ));
    }

    #[test]
    fn test_escapes_well_formed() {
        assert!(escapes_well_formed(b"abc"));
        assert!(escapes_well_formed(b"%20%2f"));
        assert!(!escapes_well_formed(b"%"));
        assert!(!escapes_well_formed(b"%2"));
        assert!(!escapes_well_formed(b"%g0"));
    }
}
