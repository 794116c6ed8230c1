//! Parsing of the `Signature` header parameter block.
//!
//! ```text
//! Signature: keyId="https://...",algorithm="ecdsa-sha256",
//!            headers="(request-target) date digest",signature="MEUCIQ..."
//! ```

use super::SignatureError;
use crate::types::KeyId;

/// Covered header list used when the `headers` parameter is absent.
pub const DEFAULT_COVERED: &[&str] = &["date"];

/// The parsed contents of a `Signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParams {
    pub key_id: KeyId,
    /// Declared algorithm, if any. Validated against the key later.
    pub algorithm: Option<String>,
    /// Covered headers, lowercased, in signing order.
    pub headers: Vec<String>,
    /// Base64-encoded signature value.
    pub signature: String,
}

impl SignatureParams {
    /// Parses a `Signature` header value.
    pub fn parse(value: &str) -> Result<Self, SignatureError> {
        let mut key_id = None;
        let mut algorithm = None;
        let mut headers = None;
        let mut signature = None;

        for (name, value) in split_params(value)? {
            let slot = match name.as_str() {
                "keyid" => &mut key_id,
                "algorithm" => &mut algorithm,
                "headers" => &mut headers,
                "signature" => &mut signature,
                // created/expires and extensions are not used
                _ => continue,
            };
            if slot.replace(value).is_some() {
                return Err(SignatureError::Malformed(format!(
                    "duplicate parameter {name}"
                )));
            }
        }

        let key_id = key_id
            .filter(|k| !k.is_empty())
            .ok_or(SignatureError::MissingParameter("keyId"))?;
        let signature = signature
            .filter(|s| !s.is_empty())
            .ok_or(SignatureError::MissingParameter("signature"))?;
        let headers = match headers {
            Some(list) => list
                .split_ascii_whitespace()
                .map(str::to_ascii_lowercase)
                .collect(),
            None => DEFAULT_COVERED.iter().map(|h| h.to_string()).collect(),
        };

        Ok(SignatureParams {
            key_id: KeyId::new(key_id),
            algorithm,
            headers,
            signature,
        })
    }

    /// Renders the parameters back into header form.
    pub fn to_header_value(&self) -> String {
        let mut out = format!("keyId=\"{}\"", self.key_id);
        if let Some(algorithm) = &self.algorithm {
            out.push_str(&format!(",algorithm=\"{algorithm}\""));
        }
        out.push_str(&format!(",headers=\"{}\"", self.headers.join(" ")));
        out.push_str(&format!(",signature=\"{}\"", self.signature));
        out
    }

    pub fn covers(&self, header: &str) -> bool {
        self.headers.iter().any(|h| h == header)
    }
}

/// Splits `name="value",name=value` pairs. Names are lowercased.
fn split_params(input: &str) -> Result<Vec<(String, String)>, SignatureError> {
    let mut out = Vec::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        let (name, after) = rest
            .split_once('=')
            .ok_or_else(|| SignatureError::Malformed("expected name=value".to_string()))?;
        let name = name.trim();
        if name.is_empty() || name.contains([',', '"', ' ']) {
            return Err(SignatureError::Malformed(
                "invalid parameter name".to_string(),
            ));
        }

        let after = after.trim_start();
        let (value, remainder) = match after.strip_prefix('"') {
            Some(quoted) => {
                let end = quoted.find('"').ok_or_else(|| {
                    SignatureError::Malformed("unterminated quoted value".to_string())
                })?;
                (&quoted[..end], &quoted[end + 1..])
            }
            None => match after.find(',') {
                Some(i) => (after[..i].trim_end(), &after[i..]),
                None => (after.trim_end(), ""),
            },
        };
        out.push((name.to_ascii_lowercase(), value.to_string()));

        let remainder = remainder.trim_start();
        rest = if remainder.is_empty() {
            ""
        } else if let Some(next) = remainder.strip_prefix(',') {
            next.trim_start()
        } else {
            return Err(SignatureError::Malformed(
                "expected ',' between parameters".to_string(),
            ));
        };
    }

    Ok(out)
}
