//! Bearer token claim decoding.
//!
//! The client never verifies the signature; it only reads the payload
//! segment to learn who is logged in and when the token stops working.
//! The server remains the authority on validity.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{TodoError, TodoResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimSet {
    pub sub: String,

    /// Seconds since the epoch; JWT allows a fractional value.
    #[serde(default)]
    pub exp: Option<f64>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ClaimSet {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let secs = self.exp.filter(|secs| secs.is_finite())?;
        let whole = secs.floor();
        let nanos = ((secs - whole) * 1e9) as u32;
        DateTime::from_timestamp(whole as i64, nanos)
    }

    /// Expired once `exp` lies strictly before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map(|exp| exp < now).unwrap_or(false)
    }
}

/// Splits `token` into header, payload and signature and decodes the
/// payload into a [`ClaimSet`].
pub fn decode_claims(token: &str) -> TodoResult<ClaimSet> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != 3 {
        return Err(TodoError::MalformedToken(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }

    let payload = to_standard_alphabet(segments[1]);
    trace!(payload_len = payload.len(), "decoding token payload");

    let bytes = STANDARD
        .decode(payload.as_bytes())
        .map_err(|err| TodoError::MalformedToken(format!("payload is not base64: {err}")))?;

    serde_json::from_slice::<ClaimSet>(&bytes)
        .map_err(|err| TodoError::MalformedToken(format!("payload is not a claim set: {err}")))
}

/// Maps the URL-safe alphabet onto the standard one and restores the `=`
/// padding JWT segments drop.
fn to_standard_alphabet(segment: &str) -> String {
    let mut out: String = segment
        .chars()
        .map(|ch| match ch {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while out.len() % 4 != 0 {
        out.push('=');
    }
    out
}
