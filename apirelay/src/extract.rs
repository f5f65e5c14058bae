//! Derive the result string from a remote response

use crate::error::AppError;

pub struct ResponseExtractor;

impl ResponseExtractor {
    /// The rule is accepted but not interpreted: the body is returned as text
    /// verbatim. Invalid UTF-8 sequences are replaced, never rejected.
    pub fn extract(rule: &str, raw: &[u8]) -> Result<String, AppError> {
        if !rule.is_empty() {
            tracing::debug!(rule, "response rule ignored, passing body through");
        }
        Ok(String::from_utf8_lossy(raw).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_body_through_regardless_of_rule() {
        let body = br#"{"data":{"url":"https://cdn/x.png"}}"#;
        for rule in ["", "data.url", "regex:(.*)", "$[0]"] {
            let out = ResponseExtractor::extract(rule, body).unwrap();
            assert_eq!(out.as_bytes(), body);
        }
    }

    #[test]
    fn empty_and_non_utf8_bodies() {
        assert_eq!(ResponseExtractor::extract("", b"").unwrap(), "");
        let out = ResponseExtractor::extract("", &[b'o', b'k', 0xff]).unwrap();
        assert!(out.starts_with("ok"));
    }
}
