//! Verification side: parse the header pair, resolve the key, rebuild the
//! base, check the signature, then enforce freshness and algorithm
//! agreement.

use std::time::Duration;

use sage_crypto::{keys::ed25519_verify, mac, PublicKeyBytes};

use crate::base::signature_base;
use crate::component::RequestMeta;
use crate::error::SignatureError;
use crate::params::{parse_signature_header, SignatureAlgorithm, SignatureInput, DEFAULT_LABEL};

/// Resolved key material on the verifying side.
pub enum VerifierKey {
    Ed25519(PublicKeyBytes),
    HmacSha256([u8; 32]),
}

impl VerifierKey {
    fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            Self::Ed25519(_) => SignatureAlgorithm::Ed25519,
            Self::HmacSha256(_) => SignatureAlgorithm::HmacSha256,
        }
    }
}

/// Verification policy knobs.
pub struct VerifyOptions {
    /// Signature name to look for (default `sig1`).
    pub label: String,
    /// Maximum accepted age of `created` (default 2 min).
    pub max_age: Duration,
    /// Allowed clock skew around `created` in either direction (default 2 min).
    pub max_skew: Duration,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            label: DEFAULT_LABEL.to_string(),
            max_age: Duration::from_secs(120),
            max_skew: Duration::from_secs(120),
        }
    }
}

/// Verify a signed request.
///
/// `resolve_key` maps the `keyid` parameter to key material; return
/// `UnknownKeyId` from it when the id resolves to nothing.  On success the
/// parsed [`SignatureInput`] is returned so callers can reuse `keyid` and
/// `nonce` without reparsing.
pub fn verify_request<F>(
    meta: &RequestMeta,
    signature_input_header: &str,
    signature_header: &str,
    opts: &VerifyOptions,
    now_unix: i64,
    resolve_key: F,
) -> Result<SignatureInput, SignatureError>
where
    F: FnOnce(&str) -> Result<VerifierKey, SignatureError>,
{
    let input = SignatureInput::parse(signature_input_header)?;
    if input.label != opts.label {
        return Err(SignatureError::MalformedSignature(format!(
            "expected signature named `{}`, got `{}`",
            opts.label, input.label
        )));
    }
    let sig = parse_signature_header(signature_header, &opts.label)?;

    let key = resolve_key(&input.params.key_id)?;
    if input.params.alg != key.algorithm() {
        return Err(SignatureError::AlgorithmMismatch {
            claimed: input.params.alg.as_str().into(),
            actual: key.algorithm().as_str().into(),
        });
    }

    // Rebuilding the base also enforces that every covered component is
    // present in the message.
    let base = signature_base(meta, &input.components, &input.params)?;
    match &key {
        VerifierKey::Ed25519(pk) => ed25519_verify(pk, base.as_bytes(), &sig)
            .map_err(|_| SignatureError::BadSignature)?,
        VerifierKey::HmacSha256(mac_key) => mac::verify(mac_key, base.as_bytes(), &sig)
            .map_err(|_| SignatureError::BadSignature)?,
    }

    let created = input.params.created;
    let skew = opts.max_skew.as_secs() as i64;
    let max_age = opts.max_age.as_secs() as i64;
    if (now_unix - created).abs() > skew || now_unix - created > max_age {
        return Err(SignatureError::Expired {
            created,
            now: now_unix,
        });
    }

    Ok(input)
}
