//! Small shared helpers.

pub mod email;
