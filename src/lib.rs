//! veriprobe: estimates whether an email address is real and deliverable
//! without sending mail.
//!
//! The engine speaks a minimal SMTP prefix to the destination's mail
//! exchangers and interprets their responses, rotating outbound sending
//! identities, rate-limiting per identity, detecting catch-all domains, and
//! composing syntax, reputation, DNS, and SMTP signals into a weighted
//! confidence score. Mail servers actively resist probing, so the engine
//! degrades to "unknown" rather than inventing certainty.
//!
//! Entry points: [`VerificationEngine`] for a fully wired process, or
//! [`validation::Orchestrator`] when the caller wires components itself.

pub mod catchall;
pub mod core;
pub mod dns;
pub mod engine;
pub mod health;
pub mod ratelimit;
pub mod rotation;
pub mod smtp;
pub mod utils;
pub mod validation;

pub use crate::core::config::{Config, ConfigBuilder, RelayIdentity, ScorePolicy};
pub use crate::core::error::{AppError, Result};
pub use crate::engine::VerificationEngine;
pub use crate::smtp::ProbeOutcome;
pub use crate::validation::{ValidationOptions, ValidationResult};
