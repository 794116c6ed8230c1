//! Signing-string construction and body digests.
//!
//! Both sides of the exchange build the same string from the covered headers:
//!
//! ```text
//! (request-target): post /callback
//! date: Tue, 07 Jun 2014 20:51:35 GMT
//! digest: SHA-256=X48E9qOokqqrvdts8nOJRJN3OWDUoyWxBf7kbu9DBPE=
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::{HeaderMap, Method};
use sha2::{Digest, Sha256};

/// Pseudo-header covering the method and path.
pub const REQUEST_TARGET: &str = "(request-target)";

/// Prefix of a SHA-256 `Digest` header value.
pub const DIGEST_PREFIX: &str = "SHA-256=";

/// Builds the signing string, or returns the name of a covered header that
/// is absent from `headers`.
pub fn signing_string(
    method: &Method,
    path_and_query: &str,
    headers: &HeaderMap,
    covered: &[String],
) -> Result<String, String> {
    let mut lines = Vec::with_capacity(covered.len());

    for name in covered {
        let value = if name == REQUEST_TARGET {
            format!(
                "{} {}",
                method.as_str().to_ascii_lowercase(),
                path_and_query
            )
        } else {
            let values: Vec<&str> = headers
                .get_all(name.as_str())
                .iter()
                .filter_map(|v| v.to_str().ok())
                .map(str::trim)
                .collect();
            if values.is_empty() {
                return Err(name.clone());
            }
            values.join(", ")
        };
        lines.push(format!("{name}: {value}"));
    }

    Ok(lines.join("\n"))
}

/// `Digest` header value for a body.
pub fn body_digest(body: &[u8]) -> String {
    format!("{DIGEST_PREFIX}{}", STANDARD.encode(Sha256::digest(body)))
}

/// Checks a `Digest` header value against a body.
///
/// Only SHA-256 is accepted. Returns `None` for other algorithms.
pub fn digest_matches(header: &str, body: &[u8]) -> Option<bool> {
    // A Digest header may list several algorithms.
    let sha256 = header.split(',').map(str::trim).find_map(|entry| {
        let (alg, value) = entry.split_once('=')?;
        alg.eq_ignore_ascii_case("sha-256").then_some(value)
    })?;
    let expected = STANDARD.encode(Sha256::digest(body));
    Some(sha256 == expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn covered(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn request_target_is_lowercase_method_and_path() {
        let s = signing_string(
            &Method::POST,
            "/callback?x=1",
            &HeaderMap::new(),
            &covered(&["(request-target)"]),
        )
        .unwrap();
        assert_eq!(s, "(request-target): post /callback?x=1");
    }

    #[test]
    fn lines_follow_covered_order() {
        let mut headers = HeaderMap::new();
        headers.insert("date", HeaderValue::from_static("Tue, 07 Jun 2014 20:51:35 GMT"));
        headers.insert("host", HeaderValue::from_static("example.org"));

        let s = signing_string(
            &Method::GET,
            "/",
            &headers,
            &covered(&["host", "(request-target)", "date"]),
        )
        .unwrap();
        assert_eq!(
            s,
            "host: example.org\n(request-target): get /\ndate: Tue, 07 Jun 2014 20:51:35 GMT"
        );
    }

    #[test]
    fn repeated_headers_are_joined() {
        let mut headers = HeaderMap::new();
        headers.append("x-multi", HeaderValue::from_static("a"));
        headers.append("x-multi", HeaderValue::from_static(" b "));

        let s = signing_string(&Method::GET, "/", &headers, &covered(&["x-multi"])).unwrap();
        assert_eq!(s, "x-multi: a, b");
    }

    #[test]
    fn missing_covered_header_is_named() {
        let err =
            signing_string(&Method::GET, "/", &HeaderMap::new(), &covered(&["digest"])).unwrap_err();
        assert_eq!(err, "digest");
    }

    #[test]
    fn known_body_digest() {
        // sha256("") in base64
        assert_eq!(
            body_digest(b""),
            "SHA-256=47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn digest_matching() {
        let header = body_digest(b"payload");
        assert_eq!(digest_matches(&header, b"payload"), Some(true));
        assert_eq!(digest_matches(&header, b"tampered"), Some(false));
        assert_eq!(digest_matches("MD5=abc", b"payload"), None);
        assert_eq!(
            digest_matches(&format!("MD5=abc, {header}"), b"payload"),
            Some(true)
        );
        assert_eq!(
            digest_matches(&header.replace("SHA-256", "sha-256"), b"payload"),
            Some(true)
        );
    }
}
