//! Pattern-based classification of RCPT TO responses.
//!
//! The rules are a policy table, not control flow: an ordered list of
//! (pattern, classification) pairs evaluated top to bottom over the raw
//! response text. Block patterns outrank everything else because a blocked
//! reply says nothing about the address and everything about our identity.

use once_cell::sync::Lazy;
use regex::Regex;

use super::outcome::ProbeOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseClass {
    Blocked,
    Exists,
    DoesNotExist,
    Temporary,
}

struct Rule {
    pattern: Regex,
    class: ResponseClass,
}

/// Ordered rule table. Priority: block > exists > does-not-exist > temporary;
/// anything unmatched falls through to ambiguous.
static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    let table: &[(&str, ResponseClass)] = &[
        // Adversarial replies: abuse filters, blacklists, connection policing.
        (r"(?i)spam", ResponseClass::Blocked),
        (r"(?i)abuse", ResponseClass::Blocked),
        (r"(?i)blacklist", ResponseClass::Blocked),
        (r"(?i)blocked", ResponseClass::Blocked),
        (r"(?i)denied", ResponseClass::Blocked),
        (r"(?i)too many connections", ResponseClass::Blocked),
        (r"(?i)connection.{0,20}timed? ?out", ResponseClass::Blocked),
        // Positive completion of RCPT.
        (r"(?m)^250", ResponseClass::Exists),
        (r"(?m)^251", ResponseClass::Exists),
        (r"(?i)user exists", ResponseClass::Exists),
        (r"(?i)address valid", ResponseClass::Exists),
        (r"(?i)recipient ok", ResponseClass::Exists),
        // Permanent rejection of the mailbox.
        (r"(?m)^550", ResponseClass::DoesNotExist),
        (r"(?m)^551", ResponseClass::DoesNotExist),
        (r"(?m)^553", ResponseClass::DoesNotExist),
        (r"(?m)^554", ResponseClass::DoesNotExist),
        (r"(?i)no such user", ResponseClass::DoesNotExist),
        (r"(?i)user unknown", ResponseClass::DoesNotExist),
        (r"(?i)mailbox unavailable", ResponseClass::DoesNotExist),
        (r"(?i)recipient rejected", ResponseClass::DoesNotExist),
        (r"(?i)does not exist", ResponseClass::DoesNotExist),
        (r"(?i)invalid recipient", ResponseClass::DoesNotExist),
        // Transient codes, commonly greylisting.
        (r"(?m)^450", ResponseClass::Temporary),
        (r"(?m)^451", ResponseClass::Temporary),
        (r"(?m)^452", ResponseClass::Temporary),
    ];
    table
        .iter()
        .map(|(pattern, class)| Rule {
            pattern: Regex::new(pattern).expect("classification pattern failed to compile"),
            class: *class,
        })
        .collect()
});

/// Classifies the captured RCPT response text into a [`ProbeOutcome`].
pub fn classify_rcpt_response(response: &str) -> ProbeOutcome {
    for rule in RULES.iter() {
        if rule.pattern.is_match(response) {
            return match rule.class {
                ResponseClass::Blocked => {
                    ProbeOutcome::Blocked(first_line(response).to_string())
                }
                ResponseClass::Exists => ProbeOutcome::Exists,
                ResponseClass::DoesNotExist => ProbeOutcome::DoesNotExist,
                ResponseClass::Temporary => ProbeOutcome::Unknown(
                    "temporary failure, possible greylisting".to_string(),
                ),
            };
        }
    }
    ProbeOutcome::Unknown(format!("ambiguous response: {}", first_line(response)))
}

fn first_line(response: &str) -> &str {
    response.lines().next().unwrap_or(response).trim()
}
