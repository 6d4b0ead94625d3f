//! Domain reputation: disposable-domain detection, free-provider
//! classification, and role-account detection.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashSet;

/// Disposable and temporary mail domains. A hard negative signal: scores for
/// these domains are capped regardless of every other check.
static DISPOSABLE_DOMAINS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // Common temporary email services
        "tempmail.com",
        "temp-mail.org",
        "tempm.com",
        "tmpmail.com",
        "tempmail.net",
        "tempemail.com",
        "tempinbox.com",
        "tempinbox.net",
        "tempmailbox.com",
        // 10 minute mail services
        "10minutemail.com",
        "10minutemail.net",
        "10minutemail.org",
        "10minemail.com",
        "10mail.org",
        // Guerrilla Mail services
        "guerrillamail.com",
        "guerrillamail.net",
        "guerrillamail.org",
        "guerrillamailblock.com",
        "grr.la",
        "guerrillamail.biz",
        "guerrillamail.de",
        "guerrillamail.info",
        // Mailinator and variants
        "mailinator.com",
        "mailinator.net",
        "mailinator2.com",
        "mailinater.com",
        "mailnesia.com",
        "mailnator.com",
        "mailtothis.com",
        // YOPmail services
        "yopmail.com",
        "yopmail.net",
        "yopmail.org",
        "yopmail.fr",
        "yopmail.info",
        // ThrowAwayMail services
        "throwawaymail.com",
        "throwaway.com",
        "trashmail.com",
        "trashmail.net",
        "trashymail.com",
        "trashmail.ws",
        // Spam services
        "spam4.me",
        "spamfree24.org",
        "spamfree24.net",
        "spamfree24.com",
        "spamfree24.de",
        "spamfree24.eu",
        "spamfree24.info",
        // Disposable services
        "disposable.com",
        "disposemail.com",
        "dispostable.com",
        "discard.email",
        "discardmail.com",
        "discardmail.de",
        // Maildrop services
        "maildrop.cc",
        "maildrop.cf",
        "maildrop.ga",
        "maildrop.gq",
        "maildrop.ml",
        // Misc services
        "getairmail.com",
        "jetable.org",
        "nospam.ze.tc",
        "nomail.xl.cx",
        "dodgit.com",
        "dodgeit.com",
        "ghosttexter.de",
        "anonymbox.com",
        "privacy.net",
        "wegwerfemail.de",
    ]
    .into_iter()
    .collect()
});

/// Common free providers: a soft negative signal (personal, not corporate).
static FREE_PROVIDERS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "gmail.com",
        "yahoo.com",
        "hotmail.com",
        "outlook.com",
        "aol.com",
        "protonmail.com",
        "mail.com",
        "zoho.com",
    ]
    .into_iter()
    .collect()
});

/// Local parts conventionally bound to a function rather than a person.
static ROLE_ACCOUNTS: &[&str] = &[
    "admin",
    "administrator",
    "webmaster",
    "hostmaster",
    "postmaster",
    "support",
    "info",
    "contact",
    "sales",
    "marketing",
    "help",
    "noreply",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainQuality {
    Low,
    Medium,
    High,
}

/// Reputation verdict for a domain.
#[derive(Debug, Clone, Serialize)]
pub struct DomainReputation {
    pub valid: bool,
    pub disposable: bool,
    pub free_provider: bool,
    pub corporate: bool,
    pub quality: DomainQuality,
    pub message: String,
}

/// Classifies a domain as disposable, free, or corporate.
pub fn classify_domain(domain: &str) -> DomainReputation {
    let domain = domain.to_lowercase();
    let disposable = DISPOSABLE_DOMAINS.contains(domain.as_str());
    let free_provider = FREE_PROVIDERS.contains(domain.as_str());
    let (quality, message) = if disposable {
        (DomainQuality::Low, "Disposable email detected")
    } else if free_provider {
        (DomainQuality::Medium, "Free email provider")
    } else {
        (DomainQuality::High, "Corporate email")
    };
    DomainReputation {
        valid: !disposable,
        disposable,
        free_provider,
        corporate: !disposable && !free_provider,
        quality,
        message: message.to_string(),
    }
}

/// Role-account detection over the local part. Informational: reduces the
/// score, never a hard failure.
#[derive(Debug, Clone, Serialize)]
pub struct RoleCheck {
    pub is_role: bool,
    pub role: Option<String>,
}

pub fn detect_role(local_part: &str) -> RoleCheck {
    let lowered = local_part.to_lowercase();
    let role = ROLE_ACCOUNTS
        .iter()
        .find(|role| lowered.contains(**role))
        .map(|role| role.to_string());
    RoleCheck {
        is_role: role.is_some(),
        role,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposable_domains_are_low_quality() {
        let rep = classify_domain("Mailinator.com");
        assert!(rep.disposable);
        assert!(!rep.valid);
        assert_eq!(rep.quality, DomainQuality::Low);
    }

    #[test]
    fn free_providers_are_medium_quality() {
        let rep = classify_domain("gmail.com");
        assert!(rep.free_provider);
        assert!(rep.valid);
        assert!(!rep.corporate);
        assert_eq!(rep.quality, DomainQuality::Medium);
    }

    #[test]
    fn everything_else_is_corporate() {
        let rep = classify_domain("trylon.ai");
        assert!(rep.corporate);
        assert_eq!(rep.quality, DomainQuality::High);
    }

    #[test]
    fn role_accounts_match_on_containment() {
        assert!(detect_role("admin").is_role);
        assert!(detect_role("it-support").is_role);
        assert_eq!(detect_role("postmaster").role.as_deref(), Some("postmaster"));
        assert!(!detect_role("alice.smith").is_role);
    }
}
