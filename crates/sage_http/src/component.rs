//! Covered components and the transport-agnostic request view.

use crate::error::SignatureError;

/// One entry of the covered-component list.
///
/// Header names are stored lowercase; derived components are the three the
/// protected endpoint uses.  `@signature-params` is implicit and never
/// appears in this list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoveredComponent {
    Method,
    Path,
    Authority,
    Header(String),
}

impl CoveredComponent {
    pub fn header(name: &str) -> Self {
        Self::Header(name.to_ascii_lowercase())
    }

    /// The identifier as it appears (quoted) in `Signature-Input`.
    pub fn identifier(&self) -> &str {
        match self {
            Self::Method => "@method",
            Self::Path => "@path",
            Self::Authority => "@authority",
            Self::Header(name) => name,
        }
    }

    /// Parse an unquoted component identifier.
    pub fn parse(id: &str) -> Result<Self, SignatureError> {
        match id {
            "@method" => Ok(Self::Method),
            "@path" => Ok(Self::Path),
            "@authority" => Ok(Self::Authority),
            other if other.starts_with('@') => Err(SignatureError::MalformedSignature(format!(
                "unsupported derived component `{other}`"
            ))),
            "" => Err(SignatureError::MalformedSignature(
                "empty component identifier".into(),
            )),
            other => Ok(Self::header(other)),
        }
    }
}

/// The fixed covered set for the protected endpoint.
pub fn default_components() -> Vec<CoveredComponent> {
    vec![
        CoveredComponent::Method,
        CoveredComponent::Path,
        CoveredComponent::Authority,
        CoveredComponent::header("date"),
        CoveredComponent::header("content-digest"),
    ]
}

/// Minimal request description the signature engine works on.
///
/// `authority` carries the `Host` header value; `path_and_query` is the
/// request target including any query string.  Header names are matched
/// case-insensitively.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub method: String,
    pub path_and_query: String,
    pub authority: String,
    pub headers: Vec<(String, String)>,
}

impl RequestMeta {
    pub fn new(method: &str, path_and_query: &str, authority: &str) -> Self {
        Self {
            method: method.to_string(),
            path_and_query: path_and_query.to_string(),
            authority: authority.to_string(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_roundtrip() {
        for c in default_components() {
            let parsed = CoveredComponent::parse(c.identifier()).unwrap();
            assert_eq!(parsed, c);
        }
    }

    #[test]
    fn header_names_lowercase() {
        assert_eq!(
            CoveredComponent::header("Content-Digest"),
            CoveredComponent::Header("content-digest".into())
        );
    }

    #[test]
    fn rejects_unknown_derived() {
        assert!(CoveredComponent::parse("@status").is_err());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let meta = RequestMeta::new("POST", "/protected", "example.com")
            .with_header("Date", "Mon, 01 Jan 2024 00:00:00 GMT");
        assert!(meta.header("date").is_some());
        assert!(meta.header("DATE").is_some());
    }
}
