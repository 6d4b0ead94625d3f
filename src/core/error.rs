//! Defines the custom error types for the veriprobe engine.

use std::io;
use thiserror::Error;

/// The primary error type for the verification engine.
#[derive(Error, Debug)]
pub enum AppError {
    /// Error occurring during configuration loading or validation.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// Error initializing necessary components (e.g., resolvers, rotators).
    #[error("Initialization Error: {0}")]
    Initialization(String),

    /// Error related to file input/output operations.
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// Error during DNS resolution.
    #[error("DNS Resolution Error: {0}")]
    Dns(#[from] trust_dns_resolver::error::ResolveError),

    /// Specific DNS error indicating the domain does not exist.
    #[error("Domain Not Found (NXDOMAIN): {0}")]
    NxDomain(String),

    /// Specific DNS error indicating no relevant records were found.
    #[error("No DNS Records Found (MX/A): {0}")]
    NoDnsRecords(String),

    /// DNS operation timed out.
    #[error("DNS Timeout for domain: {0}")]
    DnsTimeout(String),

    /// Error establishing or using an SMTP connection.
    #[error("SMTP Connection Error: {0}")]
    SmtpConnection(String),

    /// The remote server replied out of sequence or with an unparseable line.
    #[error("SMTP Protocol Error: {0}")]
    SmtpProtocol(String),

    /// SMTP operation exceeded its deadline.
    #[error("SMTP Timeout: {0}")]
    SmtpTimeout(String),

    /// No relay identity is currently eligible for an outbound probe.
    #[error("No Available Relay Identity: {0}")]
    NoAvailableRelay(String),

    /// A caller exceeded the request ceiling of the service surface.
    #[error("Rate Limited: retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the caller's window frees up.
        retry_after_secs: u64,
    },
}

pub type Result<T> = std::result::Result<T, AppError>;
