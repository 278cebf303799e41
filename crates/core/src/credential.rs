//! Operator credential.
//!
//! The credential lives in process memory only. It is deliberately not
//! `Serialize`, and its `Debug`/`Display` output is redacted so it cannot
//! leak into logs or config files.

use std::fmt;

use crate::error::{AppError, AppResult};

/// Opaque API secret supplied by the operator.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a secret, trimming surrounding whitespace.
    ///
    /// Fails with `InvalidCredential` when the secret is blank.
    pub fn new(secret: impl Into<String>) -> AppResult<Self> {
        let secret = secret.into().trim().to_string();
        if secret.is_empty() {
            return Err(AppError::InvalidCredential(
                "no API key supplied; pass --api-key or set OPENAI_API_KEY".to_string(),
            ));
        }
        Ok(Self(secret))
    }

    /// Expose the secret for building request headers.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Short, non-reversible hint for diagnostics (`sk-...abcd`).
    pub fn hint(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 8 {
            return "***".to_string();
        }
        let prefix: String = chars.iter().take(3).collect();
        let suffix: String = chars.iter().skip(chars.len() - 4).collect();
        format!("{}...{}", prefix, suffix)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.hint())
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_credential_rejected() {
        assert!(matches!(
            Credential::new("   "),
            Err(AppError::InvalidCredential(_))
        ));
    }

    #[test]
    fn test_credential_is_trimmed() {
        let credential = Credential::new("  sk-test-0123456789\n").unwrap();
        assert_eq!(credential.expose(), "sk-test-0123456789");
    }

    #[test]
    fn test_debug_is_redacted() {
        let credential = Credential::new("sk-secret-value-9876").unwrap();
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("secret-value"));
        assert_eq!(debug, "Credential(sk-...9876)");
        assert_eq!(credential.to_string(), "sk-...9876");
    }

    #[test]
    fn test_short_credential_hint() {
        let credential = Credential::new("abc").unwrap();
        assert_eq!(credential.hint(), "***");
    }
}
