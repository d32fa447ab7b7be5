//! `Content-Digest` header helper (RFC 9530, sha-256 only).
//!
//! Format: `sha-256=:<base64 of SHA-256(body)>:` with standard base64.

use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};

use crate::error::SignatureError;

const PREFIX: &str = "sha-256=:";

/// Compute the header value for a body.
pub fn content_digest(body: &[u8]) -> String {
    format!("{}{}:", PREFIX, STANDARD.encode(Sha256::digest(body)))
}

/// Check a received header value against the actual body.
pub fn verify_content_digest(header: &str, body: &[u8]) -> Result<(), SignatureError> {
    let b64 = header
        .trim()
        .strip_prefix(PREFIX)
        .and_then(|s| s.strip_suffix(':'))
        .ok_or_else(|| {
            SignatureError::MalformedSignature("Content-Digest must be sha-256=:…:".into())
        })?;
    let claimed = STANDARD
        .decode(b64)
        .map_err(|_| SignatureError::MalformedSignature("invalid Content-Digest base64".into()))?;
    if claimed == Sha256::digest(body).as_slice() {
        Ok(())
    } else {
        Err(SignatureError::DigestMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_roundtrip() {
        let body = b"{\"op\":\"ping\",\"ts\":1}";
        let header = content_digest(body);
        assert!(header.starts_with("sha-256=:"));
        verify_content_digest(&header, body).unwrap();
    }

    #[test]
    fn rejects_changed_body() {
        let header = content_digest(b"original");
        assert!(matches!(
            verify_content_digest(&header, b"tampered"),
            Err(SignatureError::DigestMismatch)
        ));
    }

    #[test]
    fn rejects_other_algorithms() {
        assert!(verify_content_digest("sha-512=:abc:", b"x").is_err());
    }
}
