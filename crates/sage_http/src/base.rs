//! Signature base construction.
//!
//! The base is the exact byte string both ends sign/verify.  Rules:
//!   - each covered component renders as `"<identifier>": <value>\n`;
//!   - `@method` is uppercased, `@path` is the target path including query,
//!     `@authority` is the Host value;
//!   - header values are trimmed and inner whitespace runs collapse to one
//!     space — nothing else is normalised (a `Date` header must match what
//!     went on the wire byte-for-byte after that);
//!   - the final line is `"@signature-params": (<list>)<params>` with no
//!     trailing newline.
//!
//! An absent covered header makes the signer refuse and the verifier
//! reject, both via `MissingComponent`.

use crate::component::{CoveredComponent, RequestMeta};
use crate::error::SignatureError;
use crate::params::SignatureParams;

/// Build the canonical signature base.  Deterministic and side-effect-free.
pub fn signature_base(
    meta: &RequestMeta,
    components: &[CoveredComponent],
    params: &SignatureParams,
) -> Result<String, SignatureError> {
    let mut base = String::new();
    for component in components {
        let value = match component {
            CoveredComponent::Method => meta.method.to_ascii_uppercase(),
            CoveredComponent::Path => {
                if meta.path_and_query.is_empty() {
                    return Err(SignatureError::MissingComponent("@path".into()));
                }
                meta.path_and_query.clone()
            }
            CoveredComponent::Authority => {
                if meta.authority.is_empty() {
                    return Err(SignatureError::MissingComponent("@authority".into()));
                }
                meta.authority.clone()
            }
            CoveredComponent::Header(name) => {
                let raw = meta
                    .header(name)
                    .ok_or_else(|| SignatureError::MissingComponent(name.clone()))?;
                canonical_header_value(raw)
            }
        };
        base.push('"');
        base.push_str(component.identifier());
        base.push_str("\": ");
        base.push_str(&value);
        base.push('\n');
    }

    let list = components
        .iter()
        .map(|c| format!("\"{}\"", c.identifier()))
        .collect::<Vec<_>>()
        .join(" ");
    base.push_str(&format!(
        "\"@signature-params\": ({}){}",
        list,
        params.suffix()
    ));
    Ok(base)
}

/// Trim leading/trailing whitespace and collapse inner runs to one space.
fn canonical_header_value(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
