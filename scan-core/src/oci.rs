//! OCI image URL validation, a collaborator exposed to the asset-key merge
//! engine's upstream caller rather than to the merge engine itself.
//!
//! Grammar: `oci://<host>[:port][/<segment>...][/<tagged>]`. Non-terminal path
//! segments match `[A-Za-z0-9_.-]+`; the final segment additionally allows `:`
//! and `@` for a tag or digest. Empty segments are invalid.

const SCHEME: &str = "oci://";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciImageUrl {
    pub host: String,
    pub port: Option<u16>,
    pub segments: Vec<String>,
}

fn is_non_terminal_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn is_terminal_segment_char(c: char) -> bool {
    is_non_terminal_segment_char(c) || matches!(c, ':' | '@')
}

/// Splits `host[:port]`, preserving the documented (and intentionally ambiguous)
/// behavior that a bare IPv6 literal without brackets is still accepted even
/// though it cannot be distinguished from a path separator by its colons alone.
/// Do not tighten this: it mirrors the source system's observable behavior
/// rather than RFC 3986.
fn split_host_port(authority: &str) -> Option<(String, Option<u16>)> {
    if let Some(rest) = authority.strip_prefix('[') {
        let (host, rest) = rest.split_once(']')?;
        if host.is_empty() {
            return None;
        }
        return match rest.strip_prefix(':') {
            Some(port_str) => parse_port(port_str).map(|p| (host.to_string(), Some(p))),
            None if rest.is_empty() => Some((host.to_string(), None)),
            None => None,
        };
    }

    // Bare IPv6 literal: more than one colon and no recognizable trailing port.
    let colon_count = authority.matches(':').count();
    if colon_count >= 2 {
        return Some((authority.to_string(), None));
    }

    match authority.split_once(':') {
        Some((host, port_str)) if !host.is_empty() => {
            parse_port(port_str).map(|p| (host.to_string(), Some(p)))
        }
        Some(_) => None,
        None => {
            if authority.is_empty() {
                None
            } else {
                Some((authority.to_string(), None))
            }
        }
    }
}

fn parse_port(raw: &str) -> Option<u16> {
    let port: u32 = raw.parse().ok()?;
    if (1..=65535).contains(&port) {
        Some(port as u16)
    } else {
        None
    }
}

/// Validates and parses an `oci://` image URL per the grammar above.
pub fn validate_oci_image_url(url: &str) -> Option<OciImageUrl> {
    let rest = url.strip_prefix(SCHEME)?;
    let (authority, path) = match rest.split_once('/') {
        Some((authority, path)) => (authority, Some(path)),
        None => (rest, None),
    };
    if authority.is_empty() {
        return None;
    }
    let (host, port) = split_host_port(authority)?;

    let segments: Vec<&str> = match path {
        Some(path) if !path.is_empty() => path.split('/').collect(),
        _ => Vec::new(),
    };
    if segments.iter().any(|s| s.is_empty()) {
        return None;
    }

    let last_index = segments.len().saturating_sub(1);
    for (index, segment) in segments.iter().enumerate() {
        let predicate = if index == last_index {
            is_terminal_segment_char
        } else {
            is_non_terminal_segment_char
        };
        if !segment.chars().all(predicate) {
            return None;
        }
    }

    Some(OciImageUrl {
        host,
        port,
        segments: segments.into_iter().map(str::to_string).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_host_and_tagged_segment() {
        let parsed = validate_oci_image_url("oci://registry.example.com/app:1.0").unwrap();
        assert_eq!(parsed.host, "registry.example.com");
        assert_eq!(parsed.port, None);
        assert_eq!(parsed.segments, vec!["app:1.0"]);
    }

    #[test]
    fn accepts_bracketed_ipv6_with_port() {
        let parsed = validate_oci_image_url("oci://[::1]:5000/app").unwrap();
        assert_eq!(parsed.host, "::1");
        assert_eq!(parsed.port, Some(5000));
    }

    #[test]
    fn accepts_unbracketed_ipv6_as_documented_ambiguity() {
        let parsed = validate_oci_image_url("oci://0001:1:1:1::1/myregistry.com").unwrap();
        assert_eq!(parsed.host, "0001:1:1:1::1");
        assert_eq!(parsed.segments, vec!["myregistry.com"]);
    }

    #[test]
    fn rejects_empty_segments() {
        assert!(validate_oci_image_url("oci://host//app").is_none());
    }

    #[test]
    fn rejects_out_of_range_port() {
        assert!(validate_oci_image_url("oci://host:0/app").is_none());
        assert!(validate_oci_image_url("oci://host:70000/app").is_none());
    }
}
