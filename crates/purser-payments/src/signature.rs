// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stripe webhook signature verification.
//!
//! The `Stripe-Signature` header carries `t=<unix ts>,v1=<hex hmac>`
//! pairs; the signed payload is `"{t}.{body}"` under HMAC-SHA256 with the
//! shared webhook secret. Verification runs before any parsing of
//! business fields — an unverified body is never deserialized.

use std::time::Duration;

use hmac::{Hmac, Mac};
use purser_core::PurserError;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Parsed `Stripe-Signature` header.
#[derive(Debug)]
pub struct SignatureHeader {
    pub timestamp: i64,
    /// All `v1` candidates; any one matching accepts the payload
    /// (multiple appear during secret rotation).
    pub v1: Vec<Vec<u8>>,
}

fn invalid(reason: impl Into<String>) -> PurserError {
    PurserError::SignatureInvalid {
        reason: reason.into(),
    }
}

/// Parses the signature header into timestamp and v1 candidates.
pub fn parse_header(header: &str) -> Result<SignatureHeader, PurserError> {
    let mut timestamp = None;
    let mut v1 = Vec::new();

    for part in header.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(value)) => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| invalid("malformed timestamp"))?,
                );
            }
            (Some("v1"), Some(value)) => {
                v1.push(hex::decode(value).map_err(|_| invalid("malformed v1 signature"))?);
            }
            // Unknown schemes (v0, ...) are ignored, per the scheme.
            (Some(_), Some(_)) => {}
            _ => return Err(invalid("malformed signature header")),
        }
    }

    let timestamp = timestamp.ok_or_else(|| invalid("missing timestamp"))?;
    if v1.is_empty() {
        return Err(invalid("no v1 signature present"));
    }
    Ok(SignatureHeader { timestamp, v1 })
}

/// Verifies `payload` against the signature header.
///
/// `now` is the caller's clock (unix seconds); events older or newer
/// than `tolerance` are rejected to bound replay.
pub fn verify(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance: Duration,
    now: i64,
) -> Result<(), PurserError> {
    let parsed = parse_header(header)?;

    let age = (now - parsed.timestamp).unsigned_abs();
    if age > tolerance.as_secs() {
        return Err(invalid(format!(
            "timestamp outside tolerance ({age}s old)"
        )));
    }

    for candidate in &parsed.v1 {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| invalid("unusable webhook secret"))?;
        mac.update(parsed.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        // verify_slice is constant-time.
        if mac.verify_slice(candidate).is_ok() {
            return Ok(());
        }
    }

    Err(invalid("no matching v1 signature"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_700_000_000;

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("t={timestamp},v1={sig}")
    }

    #[test]
    fn valid_signature_verifies() {
        let payload = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;
        let header = sign(payload, SECRET, NOW);
        verify(payload, &header, SECRET, Duration::from_secs(300), NOW).unwrap();
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = b"{}";
        let header = sign(payload, "whsec_other", NOW);
        let err = verify(payload, &header, SECRET, Duration::from_secs(300), NOW).unwrap_err();
        assert!(matches!(err, PurserError::SignatureInvalid { .. }));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let header = sign(b"{\"amount\":100}", SECRET, NOW);
        let err = verify(
            b"{\"amount\":99900}",
            &header,
            SECRET,
            Duration::from_secs(300),
            NOW,
        )
        .unwrap_err();
        assert!(matches!(err, PurserError::SignatureInvalid { .. }));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let payload = b"{}";
        let header = sign(payload, SECRET, NOW - 3600);
        let err = verify(payload, &header, SECRET, Duration::from_secs(300), NOW).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("tolerance"), "got: {text}");
    }

    #[test]
    fn future_timestamp_is_rejected() {
        let payload = b"{}";
        let header = sign(payload, SECRET, NOW + 3600);
        assert!(verify(payload, &header, SECRET, Duration::from_secs(300), NOW).is_err());
    }

    #[test]
    fn rotation_accepts_any_matching_v1() {
        let payload = b"{}";
        let good = sign(payload, SECRET, NOW);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1={},v1={good_sig}", "ab".repeat(32));
        verify(payload, &header, SECRET, Duration::from_secs(300), NOW).unwrap();
    }

    #[test]
    fn malformed_headers_are_rejected() {
        for header in [
            "",
            "v1=abcd",
            "t=notanumber,v1=abcd",
            "t=123",
            "t=123,v1=zzzz",
        ] {
            let err = verify(b"{}", header, SECRET, Duration::from_secs(300), NOW).unwrap_err();
            assert!(
                matches!(err, PurserError::SignatureInvalid { .. }),
                "header {header:?} should be SignatureInvalid"
            );
        }
    }

    #[test]
    fn parse_header_extracts_fields() {
        let header = format!("t=123,v1={},v0=ignored", "ab".repeat(32));
        let parsed = parse_header(&header).unwrap();
        assert_eq!(parsed.timestamp, 123);
        assert_eq!(parsed.v1.len(), 1);
    }
}
