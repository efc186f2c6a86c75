//! Compact token decoding
//!
//! Tokens are `header.payload.signature`, each segment URL-safe base64. Only the
//! payload is read here. The signature is not checked: the client never holds
//! the signing secret, so the server remains the authority on validity.

use crate::auth::models::Claims;
use crate::error::{Error, Result};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

/// URL-safe alphabet, padding accepted but not required
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode the claims of a compact token
pub fn decode(token: &str) -> Result<Claims> {
    let payload = payload_segment(token)?;

    let bytes = URL_SAFE_LENIENT
        .decode(payload)
        .map_err(|e| Error::MalformedToken(format!("payload is not base64url: {}", e)))?;

    // Decode as a whole so multi-byte sequences are kept intact
    let json = String::from_utf8(bytes)
        .map_err(|e| Error::MalformedToken(format!("payload is not UTF-8: {}", e)))?;

    serde_json::from_str::<Claims>(&json)
        .map_err(|e| Error::MalformedToken(format!("payload is not a JSON object: {}", e)))
}

fn payload_segment(token: &str) -> Result<&str> {
    let mut segments = token.trim().split('.');
    match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) if !payload.is_empty() => Ok(payload),
        _ => Err(Error::MalformedToken(
            "expected three dot-separated segments".to_string(),
        )),
    }
}
