//! Defines the result type for SMTP probe operations.

/// Terminal outcome of one RCPT TO probe against a mail exchanger.
///
/// A probe never escapes as an error: every socket-level failure collapses
/// into one of these variants so callers can reason about retry and scoring
/// without touching I/O errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The server accepted the recipient.
    Exists,
    /// The server permanently rejected the recipient.
    DoesNotExist,
    /// The server answered, but not conclusively (greylisting, 4xx, odd reply).
    Unknown(String),
    /// The server indicated our probing itself is unwelcome; rotate identity.
    Blocked(String),
    /// Connection-level failure before a RCPT response was observed.
    Error(String),
}

impl ProbeOutcome {
    /// True when the outcome is a definite answer about the address.
    pub fn is_conclusive(&self) -> bool {
        matches!(self, ProbeOutcome::Exists | ProbeOutcome::DoesNotExist)
    }

    /// True when trying again (another exchanger or identity) could help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProbeOutcome::Blocked(_) | ProbeOutcome::Error(_))
    }

    /// True when the probe should be recorded as a failure against the
    /// identity that performed it.
    pub fn counts_as_identity_failure(&self) -> bool {
        matches!(self, ProbeOutcome::Blocked(_) | ProbeOutcome::Error(_))
    }

    /// Human-readable reason, where the variant carries one.
    pub fn reason(&self) -> Option<&str> {
        match self {
            ProbeOutcome::Unknown(reason)
            | ProbeOutcome::Blocked(reason)
            | ProbeOutcome::Error(reason) => Some(reason),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeOutcome::Exists => write!(f, "exists"),
            ProbeOutcome::DoesNotExist => write!(f, "does not exist"),
            ProbeOutcome::Unknown(reason) => write!(f, "unknown ({reason})"),
            ProbeOutcome::Blocked(reason) => write!(f, "blocked ({reason})"),
            ProbeOutcome::Error(cause) => write!(f, "error ({cause})"),
        }
    }
}
