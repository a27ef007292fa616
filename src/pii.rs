//! PII redaction for text written to the audit log.
//!
//! A [`Redactor`] replaces every match of its enabled entity patterns with
//! [`REDACTION`]. Entities are named in `[pii].entities`; an unknown name is
//! a configuration error.

use std::borrow::Cow;

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::config::PiiConfig;

pub const REDACTION: &str = "[REDACTED]";

/// Entity kinds the redactor knows how to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiiEntity {
    Email,
    Phone,
    Ssn,
    CreditCard,
}

impl PiiEntity {
    pub const ALL: [PiiEntity; 4] = [
        PiiEntity::Email,
        PiiEntity::Ssn,
        PiiEntity::CreditCard,
        PiiEntity::Phone,
    ];

    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "phone" => Ok(Self::Phone),
            "ssn" => Ok(Self::Ssn),
            "credit_card" => Ok(Self::CreditCard),
            other => bail!(
                "Unknown PII entity: '{}'. Must be email, phone, ssn, or credit_card.",
                other
            ),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Ssn => "ssn",
            Self::CreditCard => "credit_card",
        }
    }

    fn pattern(&self) -> &'static str {
        match self {
            Self::Email => r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b",
            Self::Ssn => r"\b\d{3}-\d{2}-\d{4}\b",
            // 13 to 16 digits, optionally grouped by spaces or dashes.
            Self::CreditCard => r"\b(?:\d[ -]?){12,15}\d\b",
            Self::Phone => r"(?:\+?\d{1,2}[ .-]?)?(?:\(\d{3}\)|\b\d{3})[ .-]?\d{3}[ .-]?\d{4}\b",
        }
    }

    /// Longer, more specific shapes run first so a card number is not
    /// partially consumed as a phone number.
    fn precedence(&self) -> u8 {
        match self {
            Self::Email => 0,
            Self::Ssn => 1,
            Self::CreditCard => 2,
            Self::Phone => 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Redactor {
    patterns: Vec<(PiiEntity, Regex)>,
}

impl Redactor {
    /// A redactor that passes text through unchanged.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(entities: &[PiiEntity]) -> Result<Self> {
        let mut entities = entities.to_vec();
        entities.sort_by_key(PiiEntity::precedence);
        entities.dedup();
        let patterns = entities
            .into_iter()
            .map(|entity| {
                let re = Regex::new(entity.pattern())
                    .with_context(|| format!("invalid {} pattern", entity.as_str()))?;
                Ok((entity, re))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn from_config(config: &PiiConfig) -> Result<Self> {
        if !config.redaction_enabled {
            return Ok(Self::disabled());
        }
        let entities = config
            .entities
            .iter()
            .map(|name| PiiEntity::parse(name))
            .collect::<Result<Vec<_>>>()?;
        Self::new(&entities)
    }

    pub fn is_enabled(&self) -> bool {
        !self.patterns.is_empty()
    }

    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(text);
        for (_, re) in &self.patterns {
            let replaced = match re.replace_all(&out, REDACTION) {
                Cow::Owned(s) => Some(s),
                Cow::Borrowed(_) => None,
            };
            if let Some(s) = replaced {
                out = Cow::Owned(s);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all() -> Redactor {
        Redactor::new(&PiiEntity::ALL).unwrap()
    }

    #[test]
    fn test_redacts_each_entity() {
        let r = all();
        assert_eq!(
            r.redact("mail jane.doe@acme.com today"),
            "mail [REDACTED] today"
        );
        assert_eq!(r.redact("ssn 123-45-6789 on file"), "ssn [REDACTED] on file");
        assert_eq!(
            r.redact("card 4111 1111 1111 1111 expired"),
            "card [REDACTED] expired"
        );
        assert_eq!(r.redact("call (555) 123-4567"), "call [REDACTED]");
        assert_eq!(r.redact("call 555.123.4567 now"), "call [REDACTED] now");
    }

    #[test]
    fn test_clean_text_is_borrowed() {
        let text = "how many days of medical leave do I get";
        assert!(matches!(all().redact(text), Cow::Borrowed(_)));
    }

    #[test]
    fn test_only_configured_entities_are_redacted() {
        let r = Redactor::new(&[PiiEntity::Email]).unwrap();
        assert_eq!(
            r.redact("a@b.io or 123-45-6789"),
            "[REDACTED] or 123-45-6789"
        );
    }

    #[test]
    fn test_disabled_config_passes_through() {
        let config = PiiConfig {
            redaction_enabled: false,
            ..PiiConfig::default()
        };
        let r = Redactor::from_config(&config).unwrap();
        assert!(!r.is_enabled());
        assert_eq!(r.redact("a@b.io"), "a@b.io");
    }

    #[test]
    fn test_unknown_entity_rejected() {
        let config = PiiConfig {
            redaction_enabled: true,
            entities: vec!["person".to_string()],
        };
        assert!(Redactor::from_config(&config).is_err());
    }
}
