//! Signature parameters and the `Signature-Input` / `Signature` headers.
//!
//! Emission is canonical: parameters appear in exactly the order
//! `alg`, `keyid`, `created`, `nonce` (absent ones skipped).  Parsing is
//! tolerant of parameter order but strict about syntax; anything else is
//! `MalformedSignature`.
//!
//! `Signature` values use standard base64 — padding is emitted and
//! tolerated on parse.

use base64::{
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD},
    Engine,
};

use crate::component::CoveredComponent;
use crate::error::SignatureError;

/// Default signature name used by the protected endpoint.
pub const DEFAULT_LABEL: &str = "sig1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Ed25519,
    HmacSha256,
}

impl SignatureAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ed25519 => "ed25519",
            Self::HmacSha256 => "hmac-sha256",
        }
    }

    pub fn parse(s: &str) -> Result<Self, SignatureError> {
        match s {
            "ed25519" => Ok(Self::Ed25519),
            "hmac-sha256" => Ok(Self::HmacSha256),
            other => Err(SignatureError::MalformedSignature(format!(
                "unknown algorithm `{other}`"
            ))),
        }
    }
}

/// The `;`-separated parameters attached to a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParams {
    pub alg: SignatureAlgorithm,
    pub key_id: String,
    pub created: i64,
    pub nonce: Option<String>,
}

impl SignatureParams {
    /// Render `;alg="…";keyid="…";created=…;nonce="…"` in canonical order.
    pub fn suffix(&self) -> String {
        let mut out = format!(
            ";alg=\"{}\";keyid=\"{}\";created={}",
            self.alg.as_str(),
            self.key_id,
            self.created
        );
        if let Some(nonce) = &self.nonce {
            out.push_str(&format!(";nonce=\"{nonce}\""));
        }
        out
    }
}

/// A parsed (or to-be-emitted) `Signature-Input` entry.
#[derive(Debug, Clone)]
pub struct SignatureInput {
    pub label: String,
    pub components: Vec<CoveredComponent>,
    pub params: SignatureParams,
}

impl SignatureInput {
    /// Render the full header value: `label=("…" "…");alg=…;…`.
    pub fn format(&self) -> String {
        let list = self
            .components
            .iter()
            .map(|c| format!("\"{}\"", c.identifier()))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{}=({}){}", self.label, list, self.params.suffix())
    }

    /// Parse a `Signature-Input` header value.
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        let malformed = |why: &str| SignatureError::MalformedSignature(why.to_string());

        let (label, rest) = header
            .split_once('=')
            .ok_or_else(|| malformed("missing `=` after signature name"))?;
        let label = label.trim();
        if label.is_empty() {
            return Err(malformed("empty signature name"));
        }
        let rest = rest.trim_start();
        if !rest.starts_with('(') {
            return Err(malformed("component list must start with `(`"));
        }
        let close = rest
            .find(')')
            .ok_or_else(|| malformed("unterminated component list"))?;
        let list = &rest[1..close];
        let mut components = Vec::new();
        for item in list.split_whitespace() {
            let id = item
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .ok_or_else(|| malformed("component identifiers must be quoted"))?;
            components.push(CoveredComponent::parse(id)?);
        }
        if components.is_empty() {
            return Err(malformed("empty component list"));
        }

        let mut alg = None;
        let mut key_id = None;
        let mut created = None;
        let mut nonce = None;
        for param in rest[close + 1..].split(';') {
            let param = param.trim();
            if param.is_empty() {
                continue;
            }
            let (name, value) = param
                .split_once('=')
                .ok_or_else(|| malformed("parameter without value"))?;
            match name {
                "alg" => alg = Some(SignatureAlgorithm::parse(unquote(value)?)?),
                "keyid" => key_id = Some(unquote(value)?.to_string()),
                "created" => {
                    created = Some(value.parse::<i64>().map_err(|_| {
                        malformed("created must be an integer timestamp")
                    })?)
                }
                "nonce" => nonce = Some(unquote(value)?.to_string()),
                other => {
                    return Err(malformed(&format!("unknown parameter `{other}`")));
                }
            }
        }

        Ok(Self {
            label: label.to_string(),
            components,
            params: SignatureParams {
                alg: alg.ok_or_else(|| malformed("missing alg parameter"))?,
                key_id: key_id.ok_or_else(|| malformed("missing keyid parameter"))?,
                created: created.ok_or_else(|| malformed("missing created parameter"))?,
                nonce,
            },
        })
    }
}

fn unquote(value: &str) -> Result<&str, SignatureError> {
    value
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| SignatureError::MalformedSignature("parameter value must be quoted".into()))
}

/// Render the `Signature` header value: `label=:<base64>:`.
pub fn format_signature_header(label: &str, signature: &[u8]) -> String {
    format!("{}=:{}:", label, STANDARD.encode(signature))
}

/// Extract the raw signature bytes for `label` from a `Signature` header.
pub fn parse_signature_header(header: &str, label: &str) -> Result<Vec<u8>, SignatureError> {
    let malformed = |why: &str| SignatureError::MalformedSignature(why.to_string());

    let (name, value) = header
        .split_once('=')
        .ok_or_else(|| malformed("missing `=` in Signature header"))?;
    if name.trim() != label {
        return Err(malformed(&format!("expected signature named `{label}`")));
    }
    let value = value.trim();
    let b64 = value
        .strip_prefix(':')
        .and_then(|s| s.strip_suffix(':'))
        .ok_or_else(|| malformed("signature must be wrapped in colons"))?;
    // Padding is preserved on the wire but tolerated either way on parse.
    STANDARD
        .decode(b64)
        .or_else(|_| STANDARD_NO_PAD.decode(b64))
        .map_err(|_| malformed("invalid base64 signature"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::default_components;

    fn params() -> SignatureParams {
        SignatureParams {
            alg: SignatureAlgorithm::Ed25519,
            key_id: "kid-1".into(),
            created: 1_700_000_000,
            nonce: Some("abc123".into()),
        }
    }

    #[test]
    fn format_matches_wire_shape() {
        let input = SignatureInput {
            label: DEFAULT_LABEL.into(),
            components: default_components(),
            params: params(),
        };
        assert_eq!(
            input.format(),
            "sig1=(\"@method\" \"@path\" \"@authority\" \"date\" \"content-digest\")\
             ;alg=\"ed25519\";keyid=\"kid-1\";created=1700000000;nonce=\"abc123\""
        );
    }

    #[test]
    fn parse_roundtrip() {
        let input = SignatureInput {
            label: DEFAULT_LABEL.into(),
            components: default_components(),
            params: params(),
        };
        let parsed = SignatureInput::parse(&input.format()).unwrap();
        assert_eq!(parsed.label, "sig1");
        assert_eq!(parsed.components, default_components());
        assert_eq!(parsed.params, params());
    }

    #[test]
    fn parse_tolerates_parameter_order() {
        let header = "sig1=(\"@method\");created=5;nonce=\"n\";keyid=\"k\";alg=\"hmac-sha256\"";
        let parsed = SignatureInput::parse(header).unwrap();
        assert_eq!(parsed.params.alg, SignatureAlgorithm::HmacSha256);
        assert_eq!(parsed.params.created, 5);
    }

    #[test]
    fn parse_rejects_missing_keyid() {
        let header = "sig1=(\"@method\");alg=\"ed25519\";created=5";
        assert!(SignatureInput::parse(header).is_err());
    }

    #[test]
    fn parse_rejects_unquoted_component() {
        assert!(SignatureInput::parse("sig1=(@method);alg=\"ed25519\";keyid=\"k\";created=1").is_err());
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["", "sig1", "sig1=@", "sig1=()", "sig1=(\"@method\""] {
            assert!(SignatureInput::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn signature_header_roundtrip() {
        let header = format_signature_header("sig1", &[1, 2, 3, 250]);
        let bytes = parse_signature_header(&header, "sig1").unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 250]);
    }

    #[test]
    fn signature_header_tolerates_missing_padding() {
        // 4 bytes encode to 6 chars + `==` padding; strip it.
        let header = "sig1=:AQIDBA:";
        let bytes = parse_signature_header(header, "sig1").unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn signature_header_rejects_wrong_label() {
        let header = format_signature_header("sig2", &[1]);
        assert!(parse_signature_header(&header, "sig1").is_err());
    }
}
