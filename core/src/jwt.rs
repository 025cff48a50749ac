//! Unverified JWT claims extraction.
//!
//! The MDS blob is a compact JWS whose payload carries the metadata entries.
//! The feed is public and self-describing and no verification key is
//! available to consumers, so the signature is deliberately not checked:
//! only the payload segment is base64url-decoded and parsed.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;

use crate::error::SyncError;

/// Decode the claims payload of a compact JWS without verifying it.
pub fn decode_claims(token: &str) -> Result<Value, SyncError> {
    let token = token.trim();
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next()) {
        (Some(_header), Some(payload)) if !payload.is_empty() => payload,
        _ => {
            return Err(SyncError::Jwt(
                "token is not in compact JWS form".to_string(),
            ));
        }
    };

    // Some producers emit padded base64; strip it before decoding.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|err| SyncError::Jwt(format!("payload is not valid base64url: {err}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|err| SyncError::Jwt(format!("payload is not valid JSON: {err}")))
}
