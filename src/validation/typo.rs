//! Structural typo detection and known typo-domain correction.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

use crate::utils::email::{domain_of, local_part_of};

/// Frequently mistyped provider names mapped to the intended one.
static KNOWN_TYPO_DOMAINS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("gmial", "gmail"),
        ("gmal", "gmail"),
        ("gamil", "gmail"),
        ("gnail", "gmail"),
        ("gmaik", "gmail"),
        ("yahooo", "yahoo"),
        ("yaho", "yahoo"),
        ("yahhoo", "yahoo"),
        ("hotmial", "hotmail"),
        ("hotmal", "hotmail"),
        ("hotmai", "hotmail"),
        ("outllok", "outlook"),
        ("outlok", "outlook"),
        ("oultook", "outlook"),
    ]
    .into_iter()
    .collect()
});

/// Result of the typo stage: structural anomalies plus a suggested corrected
/// address when the domain matches a known typo.
#[derive(Debug, Clone, Serialize)]
pub struct TypoCheck {
    pub has_typos: bool,
    pub issues: Vec<String>,
    pub suggestion: Option<String>,
}

pub fn check_typos(email: &str) -> TypoCheck {
    let mut issues = Vec::new();

    if email.contains("..") {
        issues.push("Repeated dots found".to_string());
    }
    if email.matches('@').count() > 1 {
        issues.push("Multiple @ symbols found".to_string());
    }

    let domain = domain_of(email);
    let mut suggestion = None;
    if let Some((name, rest)) = domain.split_once('.') {
        if let Some(corrected) = KNOWN_TYPO_DOMAINS.get(name) {
            issues.push(format!("Possible typo: did you mean {corrected}?"));
            suggestion = Some(format!("{}@{corrected}.{rest}", local_part_of(email)));
        }
    }

    TypoCheck {
        has_typos: !issues.is_empty(),
        issues,
        suggestion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_addresses_have_no_typos() {
        let check = check_typos("user@gmail.com");
        assert!(!check.has_typos);
        assert!(check.suggestion.is_none());
    }

    #[test]
    fn known_typo_domains_get_a_suggestion() {
        let check = check_typos("user@gamil.com");
        assert!(check.has_typos);
        assert_eq!(check.suggestion.as_deref(), Some("user@gmail.com"));
    }

    #[test]
    fn structural_anomalies_are_reported() {
        assert!(check_typos("user..name@corp.com").has_typos);
        assert!(check_typos("user@host@corp.com")
            .issues
            .iter()
            .any(|i| i.contains("Multiple @")));
    }

    #[test]
    fn typo_suggestion_preserves_tld() {
        let check = check_typos("sales@hotmial.co.uk");
        assert_eq!(check.suggestion.as_deref(), Some("sales@hotmail.co.uk"));
    }
}
