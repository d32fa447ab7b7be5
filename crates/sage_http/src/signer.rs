//! Signing side: build the base, sign it, emit the header pair.

use sage_crypto::{mac, SigningKeyPair};

use crate::base::signature_base;
use crate::component::{CoveredComponent, RequestMeta};
use crate::error::SignatureError;
use crate::params::{format_signature_header, SignatureAlgorithm, SignatureInput, SignatureParams};

/// Key material the signer can hold: the agent's long-term Ed25519 key for
/// DID-signed requests, or a session MAC key for session-signed ones.
pub enum SignerKey<'a> {
    Ed25519(&'a SigningKeyPair),
    HmacSha256(&'a [u8; 32]),
}

impl SignerKey<'_> {
    fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            Self::Ed25519(_) => SignatureAlgorithm::Ed25519,
            Self::HmacSha256(_) => SignatureAlgorithm::HmacSha256,
        }
    }
}

/// The two headers a signed request carries.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub signature_input: String,
    pub signature: String,
}

/// Sign `meta` over `components` with `params`.
///
/// Refuses (`MissingComponent`) if any covered header is absent, and
/// (`AlgorithmMismatch`) if `params.alg` disagrees with the key.
pub fn sign_request(
    meta: &RequestMeta,
    components: &[CoveredComponent],
    params: &SignatureParams,
    key: &SignerKey<'_>,
    label: &str,
) -> Result<SignedHeaders, SignatureError> {
    if params.alg != key.algorithm() {
        return Err(SignatureError::AlgorithmMismatch {
            claimed: params.alg.as_str().into(),
            actual: key.algorithm().as_str().into(),
        });
    }

    let base = signature_base(meta, components, params)?;
    let sig = match key {
        SignerKey::Ed25519(kp) => kp.sign(base.as_bytes()),
        SignerKey::HmacSha256(mac_key) => mac::tag(mac_key, base.as_bytes()),
    };

    let input = SignatureInput {
        label: label.to_string(),
        components: components.to_vec(),
        params: params.clone(),
    };
    Ok(SignedHeaders {
        signature_input: input.format(),
        signature: format_signature_header(label, &sig),
    })
}
