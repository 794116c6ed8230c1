//! Content-type negotiation for result payloads.
//!
//! The service uses one vendor media type for results. The bare type is the
//! protobuf encoding; a `+json` suffix marks the JSON encoding.

use std::fmt;

/// Media type of the binary (protobuf) result encoding.
pub const QUERY_RESULT_BINARY: &str = "application/vnd.zvelo.query-result";

/// Media type of the textual (JSON) result encoding.
pub const QUERY_RESULT_JSON: &str = "application/vnd.zvelo.query-result+json";

/// Generic aliases accepted on input.
const GENERIC_JSON: &str = "application/json";
const GENERIC_PROTOBUF: &str = "application/x-protobuf";

/// The two mutually exclusive result encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentType {
    /// Compact protobuf serialization.
    #[default]
    Binary,
    /// Human-readable JSON serialization.
    Json,
}

impl ContentType {
    /// Parses a `Content-Type` (or single `Accept`) header value.
    ///
    /// Media type parameters (`; charset=utf-8`) and letter case are ignored.
    /// Returns `None` for anything that is not a result encoding.
    ///
    /// # Examples
    ///
    /// ```
    /// use query_delivery::codec::ContentType;
    ///
    /// assert_eq!(
    ///     ContentType::parse("application/vnd.zvelo.query-result"),
    ///     Some(ContentType::Binary)
    /// );
    /// assert_eq!(
    ///     ContentType::parse("Application/Vnd.Zvelo.Query-Result+JSON; charset=utf-8"),
    ///     Some(ContentType::Json)
    /// );
    /// assert_eq!(ContentType::parse("text/plain"), None);
    /// ```
    pub fn parse(header: &str) -> Option<Self> {
        let essence = header
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            QUERY_RESULT_BINARY | GENERIC_PROTOBUF => Some(ContentType::Binary),
            QUERY_RESULT_JSON | GENERIC_JSON => Some(ContentType::Json),
            _ => None,
        }
    }

    /// The canonical media type for this encoding.
    pub fn media_type(&self) -> &'static str {
        match self {
            ContentType::Binary => QUERY_RESULT_BINARY,
            ContentType::Json => QUERY_RESULT_JSON,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Binary => write!(f, "binary"),
            ContentType::Json => write!(f, "json"),
        }
    }
}
