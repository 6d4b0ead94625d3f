//! Core building blocks shared across the engine: configuration and errors.

pub mod config;
pub mod error;
