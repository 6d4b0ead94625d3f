//! Address-string helpers: splitting, normalization, sanitization.

/// Domain part of an address (after the last `@`), lowercased. Empty when
/// there is no `@` at all.
pub fn domain_of(email: &str) -> String {
    match email.rfind('@') {
        Some(at) => email[at + 1..].to_lowercase(),
        None => String::new(),
    }
}

/// Local part of an address (before the last `@`); the whole input when there
/// is no `@`.
pub fn local_part_of(email: &str) -> &str {
    match email.rfind('@') {
        Some(at) => &email[..at],
        None => email,
    }
}

/// Canonical form for comparison: trimmed, lowercased, and with the dots
/// gmail ignores stripped from gmail local parts.
pub fn normalize(email: &str) -> String {
    let email = email.trim().to_lowercase();
    let Some(at) = email.rfind('@') else {
        return email;
    };
    let (local, domain) = (&email[..at], &email[at + 1..]);
    if domain == "gmail.com" {
        format!("{}@{domain}", local.replace('.', ""))
    } else {
        email
    }
}

/// Strips the noise commonly pasted around addresses: whitespace, angle
/// brackets, wrapping quotes.
pub fn sanitize(email: &str) -> String {
    let cleaned: String = email
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '<' && *c != '>')
        .collect();
    cleaned.trim_matches(|c| c == '\'' || c == '"').to_string()
}
