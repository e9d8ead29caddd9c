use crate::VaultError;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

const MASK: &str = "***";
const HASH_PREFIX_LEN: usize = 8;

/// How much of a confidential value may reach logs and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfidentialityLevel {
    /// Values are printed verbatim. Local debugging only.
    High,
    /// Values are replaced by a short SHA-256 prefix.
    #[default]
    Medium,
    /// Values are masked entirely.
    Low,
}

impl FromStr for ConfidentialityLevel {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(VaultError::Config(format!(
                "unknown confidentiality level: {other}"
            ))),
        }
    }
}

/// Render a confidential value for a diagnostic sink.
pub fn redact(value: &str, level: ConfidentialityLevel) -> String {
    match level {
        ConfidentialityLevel::High => value.to_string(),
        ConfidentialityLevel::Medium => {
            let digest = format!("{:x}", Sha256::digest(value.as_bytes()));
            digest[..HASH_PREFIX_LEN].to_string()
        }
        ConfidentialityLevel::Low => MASK.to_string(),
    }
}

/// Replace every occurrence of `secret` inside free-form diagnostic text.
pub fn scrub(text: &str, secret: &str, level: ConfidentialityLevel) -> String {
    if secret.is_empty() || level == ConfidentialityLevel::High {
        return text.to_string();
    }
    text.replace(secret, &redact(secret, level))
}

/// `Display` adapter applying [`redact`] lazily, for use in tracing fields.
pub struct Redacted<'a> {
    value: &'a str,
    level: ConfidentialityLevel,
}

impl<'a> Redacted<'a> {
    pub fn new(value: &'a str, level: ConfidentialityLevel) -> Self {
        Self { value, level }
    }
}

impl fmt::Display for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&redact(self.value, self.level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "s.tmaYRmdXqKVF810aYOinWgMd";

    #[test]
    fn test_low_masks_value() {
        assert_eq!(redact(TOKEN, ConfidentialityLevel::Low), "***");
    }

    #[test]
    fn test_medium_uses_sha256_prefix() {
        // sha256("abc") = ba7816bf8f01cfea...
        assert_eq!(redact("abc", ConfidentialityLevel::Medium), "ba7816bf");

        let rendered = redact(TOKEN, ConfidentialityLevel::Medium);
        assert_eq!(rendered.len(), 8);
        assert!(rendered.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!rendered.contains(TOKEN));
    }

    #[test]
    fn test_high_is_verbatim() {
        assert_eq!(redact(TOKEN, ConfidentialityLevel::High), TOKEN);
    }

    #[test]
    fn test_scrub_replaces_embedded_token() {
        let text = format!("renewal of {TOKEN} rejected");
        let scrubbed = scrub(&text, TOKEN, ConfidentialityLevel::Low);
        assert_eq!(scrubbed, "renewal of *** rejected");
        assert_eq!(scrub(&text, "", ConfidentialityLevel::Low), text);
    }

    #[test]
    fn test_redacted_display() {
        let shown = Redacted::new(TOKEN, ConfidentialityLevel::Low).to_string();
        assert_eq!(shown, "***");
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(
            "LOW".parse::<ConfidentialityLevel>().unwrap(),
            ConfidentialityLevel::Low
        );
        assert_eq!(
            "medium".parse::<ConfidentialityLevel>().unwrap(),
            ConfidentialityLevel::Medium
        );
        assert!("secret".parse::<ConfidentialityLevel>().is_err());
    }
}
