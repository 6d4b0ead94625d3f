//! DNS lookups backing the verification pipeline.
//!
//! Two consumers: the SMTP layer needs an ordered mail-exchange list for a
//! domain ([`Resolver::resolve_mail_exchanges`]), and the orchestrator wants a
//! broader deliverability picture (MX, A fallback, SPF and DMARC TXT records)
//! via [`Resolver::validate_domain`].

use std::net::IpAddr;
use std::time::Duration;

use serde::Serialize;
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::ResolveErrorKind;
use trust_dns_resolver::proto::op::ResponseCode;
use trust_dns_resolver::TokioAsyncResolver;

use crate::core::config::Config;
use crate::core::error::{AppError, Result};

/// One mail exchanger for a domain, ordered by ascending priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailExchange {
    pub host: String,
    pub priority: u16,
}

/// Presence check for a single DNS record type.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecordCheck {
    pub valid: bool,
    pub count: usize,
}

/// Aggregate DNS picture for a domain, as consumed by the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct DnsValidation {
    /// True when the domain has MX records, or A records as a fallback.
    pub valid: bool,
    pub mx: RecordCheck,
    pub a: RecordCheck,
    pub spf: RecordCheck,
    pub dmarc: RecordCheck,
    pub message: String,
}

/// Thin wrapper around the tokio resolver, configured from [`Config`].
pub struct Resolver {
    inner: TokioAsyncResolver,
}

impl Resolver {
    /// Builds a resolver pointed at the configured nameservers.
    pub fn new(config: &Config) -> Result<Self> {
        let ips: Vec<IpAddr> = config
            .dns_servers
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        if ips.is_empty() {
            return Err(AppError::Initialization(
                "no usable DNS server addresses in configuration".to_string(),
            ));
        }
        let group = NameServerConfigGroup::from_ips_clear(&ips, 53, true);
        let resolver_config = ResolverConfig::from_parts(None, vec![], group);
        let mut opts = ResolverOpts::default();
        opts.timeout = config.dns_timeout;
        opts.attempts = 2;
        Ok(Self {
            inner: TokioAsyncResolver::tokio(resolver_config, opts),
        })
    }

    /// Resolves the domain's mail exchangers, sorted by priority, falling back
    /// to the domain's own A record (priority 0) when no MX records exist.
    pub async fn resolve_mail_exchanges(&self, domain: &str) -> Result<Vec<MailExchange>> {
        match self.inner.mx_lookup(domain).await {
            Ok(lookup) => {
                let mut exchanges: Vec<MailExchange> = lookup
                    .iter()
                    .map(|mx| MailExchange {
                        host: mx.exchange().to_utf8().trim_end_matches('.').to_string(),
                        priority: mx.preference(),
                    })
                    .collect();
                if exchanges.is_empty() {
                    return self.a_record_fallback(domain).await;
                }
                sort_exchanges(&mut exchanges);
                tracing::debug!(
                    domain,
                    count = exchanges.len(),
                    primary = %exchanges[0].host,
                    "resolved mail exchangers"
                );
                Ok(exchanges)
            }
            Err(err) => match classify_resolve_error(domain, &err.kind().to_string(), err.kind()) {
                AppError::NoDnsRecords(_) => self.a_record_fallback(domain).await,
                other => Err(other),
            },
        }
    }

    async fn a_record_fallback(&self, domain: &str) -> Result<Vec<MailExchange>> {
        match self.inner.ipv4_lookup(domain).await {
            Ok(lookup) if lookup.iter().next().is_some() => {
                tracing::debug!(domain, "no MX records, using A record fallback");
                Ok(vec![MailExchange {
                    host: domain.to_string(),
                    priority: 0,
                }])
            }
            Ok(_) => Err(AppError::NoDnsRecords(domain.to_string())),
            Err(err) => Err(classify_resolve_error(
                domain,
                &err.kind().to_string(),
                err.kind(),
            )),
        }
    }

    /// Full DNS validation for the orchestrator: MX, A, SPF, and DMARC checks
    /// run concurrently; the domain is DNS-valid when MX or A records exist.
    pub async fn validate_domain(&self, domain: &str) -> DnsValidation {
        let dmarc_name = format!("_dmarc.{domain}");
        let (mx, a, txt, dmarc) = tokio::join!(
            self.inner.mx_lookup(domain),
            self.inner.ipv4_lookup(domain),
            self.inner.txt_lookup(domain),
            self.inner.txt_lookup(dmarc_name),
        );

        let mx_count = mx.map(|l| l.iter().count()).unwrap_or(0);
        let a_count = a.map(|l| l.iter().count()).unwrap_or(0);
        let spf_found = txt
            .map(|l| l.iter().any(|record| txt_contains(record.txt_data(), "v=spf1")))
            .unwrap_or(false);
        let dmarc_found = dmarc
            .map(|l| l.iter().any(|record| txt_contains(record.txt_data(), "v=dmarc1")))
            .unwrap_or(false);

        let has_mx = mx_count > 0;
        let has_a = a_count > 0;
        let message = if has_mx {
            "Valid mail server found"
        } else if has_a {
            "Fallback mail server found"
        } else {
            "No mail server found"
        };

        DnsValidation {
            valid: has_mx || has_a,
            mx: RecordCheck {
                valid: has_mx,
                count: mx_count,
            },
            a: RecordCheck {
                valid: has_a,
                count: a_count,
            },
            spf: RecordCheck {
                valid: spf_found,
                count: usize::from(spf_found),
            },
            dmarc: RecordCheck {
                valid: dmarc_found,
                count: usize::from(dmarc_found),
            },
            message: message.to_string(),
        }
    }
}

fn sort_exchanges(exchanges: &mut [MailExchange]) {
    exchanges.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.host.cmp(&b.host)));
}

fn txt_contains(data: &[Box<[u8]>], needle: &str) -> bool {
    data.iter().any(|chunk| {
        String::from_utf8_lossy(chunk)
            .to_ascii_lowercase()
            .contains(needle)
    })
}

fn classify_resolve_error(domain: &str, message: &str, kind: &ResolveErrorKind) -> AppError {
    match kind {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => {
            if *response_code == ResponseCode::NXDomain {
                AppError::NxDomain(domain.to_string())
            } else {
                AppError::NoDnsRecords(domain.to_string())
            }
        }
        ResolveErrorKind::Timeout => AppError::DnsTimeout(domain.to_string()),
        _ => AppError::Dns(trust_dns_resolver::error::ResolveError::from(
            message.to_string(),
        )),
    }
}
