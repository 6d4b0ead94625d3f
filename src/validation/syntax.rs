//! Syntax validation: length limits and an RFC-5322-shaped grammar check.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::utils::email::local_part_of;

const MAX_ADDRESS_LENGTH: usize = 254;
const MAX_LOCAL_PART_LENGTH: usize = 64;

/// RFC 5322-shaped address grammar, including quoted local parts and IP
/// literal domains.
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)^(?:[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*|"(?:[\x01-\x08\x0b\x0c\x0e-\x1f\x21\x23-\x5b\x5d-\x7f]|\\[\x01-\x09\x0b\x0c\x0e-\x7f])*")@(?:(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?|\[(?:(?:25[0-5]|2[0-4][0-9]|1[0-9][0-9]|[1-9]?[0-9])\.){3}(?:25[0-5]|2[0-4][0-9]|1[0-9][0-9]|[1-9]?[0-9])\])$"#,
    )
    .expect("address grammar pattern failed to compile")
});

/// Result of the syntax stage. A failure here is a hard failure for the
/// whole validation.
#[derive(Debug, Clone, Serialize)]
pub struct SyntaxCheck {
    pub valid: bool,
    pub message: String,
}

impl SyntaxCheck {
    fn fail(message: &str) -> Self {
        Self {
            valid: false,
            message: message.to_string(),
        }
    }
}

/// Checks emptiness first, then lengths, then the grammar.
pub fn validate_syntax(email: &str) -> SyntaxCheck {
    if email.is_empty() {
        return SyntaxCheck::fail("Email is required");
    }
    if email.len() > MAX_ADDRESS_LENGTH {
        return SyntaxCheck::fail("Email too long");
    }
    if local_part_of(email).len() > MAX_LOCAL_PART_LENGTH {
        return SyntaxCheck::fail("Local part too long");
    }
    if !EMAIL_REGEX.is_match(email) {
        return SyntaxCheck::fail("Invalid email format");
    }
    SyntaxCheck {
        valid: true,
        message: String::new(),
    }
}
