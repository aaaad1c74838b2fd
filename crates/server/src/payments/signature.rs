//! Webhook signature verification.
//!
//! Verification is a pluggable primitive so the reconciler is independent
//! of which processor is integrated. The production scheme is the common
//! HMAC-SHA256 one: the header carries a unix timestamp and one or more
//! hex signatures (`t=<ts>,v1=<hex>`), the signed payload is
//! `"{timestamp}.{raw_body}"`, and stale timestamps are rejected to block
//! replays. The comparison is constant-time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

/// Allowed clock skew between the signature timestamp and now.
const TOLERANCE_SECS: i64 = 300;

/// Signature verification failures. All of them fail closed: the event is
/// never processed unverified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingHeader,
    #[error("malformed signature header")]
    MalformedHeader,
    #[error("signature timestamp outside tolerance")]
    TimestampOutOfTolerance,
    #[error("signature mismatch")]
    Mismatch,
}

/// Verifies inbound webhook payload authenticity.
pub trait SignatureVerifier: Send + Sync {
    /// Verify `payload` against `header`; `header` is `None` when the
    /// transport request carried no signature header at all.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureError`] describing why verification failed.
    fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<(), SignatureError>;
}

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 verifier over a shared secret.
pub struct HmacSignatureVerifier {
    secret: Vec<u8>,
    /// Override of "now" for tests; production uses the system clock.
    now: fn() -> i64,
}

impl HmacSignatureVerifier {
    #[must_use]
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            now: unix_now,
        }
    }

    /// Construct with a fixed clock. Test use only.
    #[must_use]
    pub fn with_clock(secret: Vec<u8>, now: fn() -> i64) -> Self {
        Self { secret, now }
    }

    /// Compute the signature header for a payload. Used by tests and by
    /// local tooling that replays events.
    #[must_use]
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let digest = hex::encode(mac.finalize().into_bytes());
        format!("t={timestamp},v1={digest}")
    }
}

fn unix_now() -> i64 {
    // Safe cast window: unix seconds fit i64 for billions of years.
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

impl SignatureVerifier for HmacSignatureVerifier {
    fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
        let header = header.ok_or(SignatureError::MissingHeader)?;

        let mut timestamp: Option<i64> = None;
        let mut signatures: Vec<&str> = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => {
                    timestamp = Some(
                        value
                            .parse()
                            .map_err(|_| SignatureError::MalformedHeader)?,
                    );
                }
                Some(("v1", value)) => signatures.push(value),
                // Unknown scheme versions are ignored, not rejected.
                Some(_) => {}
                None => return Err(SignatureError::MalformedHeader),
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
        if signatures.is_empty() {
            return Err(SignatureError::MalformedHeader);
        }

        if ((self.now)() - timestamp).abs() > TOLERANCE_SECS {
            return Err(SignatureError::TimestampOutOfTolerance);
        }

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        if signatures
            .iter()
            .any(|candidate| constant_time_eq(candidate.as_bytes(), expected.as_bytes()))
        {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}

/// Constant-time byte comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"whsec_test_8fk29dk1029dkqpz7731";

    fn fixed_now() -> i64 {
        1_700_000_000
    }

    fn verifier() -> HmacSignatureVerifier {
        HmacSignatureVerifier::with_clock(SECRET.to_vec(), fixed_now)
    }

    #[test]
    fn test_valid_signature_accepted() {
        let v = verifier();
        let payload = br#"{"id":"evt_1"}"#;
        let header = v.sign(payload, fixed_now());
        assert_eq!(v.verify(payload, Some(&header)), Ok(()));
    }

    #[test]
    fn test_missing_header_rejected() {
        let v = verifier();
        assert_eq!(
            v.verify(b"{}", None),
            Err(SignatureError::MissingHeader)
        );
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let v = verifier();
        let header = v.sign(br#"{"id":"evt_1"}"#, fixed_now());
        assert_eq!(
            v.verify(br#"{"id":"evt_2"}"#, Some(&header)),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let other = HmacSignatureVerifier::with_clock(b"other-secret-value".to_vec(), fixed_now);
        let payload = br#"{"id":"evt_1"}"#;
        let header = other.sign(payload, fixed_now());
        assert_eq!(
            verifier().verify(payload, Some(&header)),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let v = verifier();
        let payload = br#"{"id":"evt_1"}"#;
        let stale = fixed_now() - TOLERANCE_SECS - 1;
        let header = v.sign(payload, stale);
        assert_eq!(
            v.verify(payload, Some(&header)),
            Err(SignatureError::TimestampOutOfTolerance)
        );
    }

    #[test]
    fn test_malformed_header_rejected() {
        let v = verifier();
        assert_eq!(
            v.verify(b"{}", Some("not-a-signature")),
            Err(SignatureError::MalformedHeader)
        );
        assert_eq!(
            v.verify(b"{}", Some("t=123")),
            Err(SignatureError::MalformedHeader)
        );
    }

    #[test]
    fn test_unknown_scheme_versions_ignored() {
        let v = verifier();
        let payload = br#"{"id":"evt_1"}"#;
        let header = v.sign(payload, fixed_now());
        let with_extra = format!("{header},v0=deadbeef");
        assert_eq!(v.verify(payload, Some(&with_extra)), Ok(()));
    }
}
