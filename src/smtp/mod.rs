//! The raw-socket SMTP probe stack.
//!
//! [`client::ProbeClient`] drives the minimal handshake, [`session`] owns one
//! connection and its stage machine, and [`classify`] turns the captured
//! RCPT response into a [`ProbeOutcome`].

pub mod classify;
pub mod client;
pub mod outcome;
pub mod session;

pub use client::ProbeClient;
pub use outcome::ProbeOutcome;
