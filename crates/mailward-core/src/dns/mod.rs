//! DNS lookups for record verification
//!
//! Wraps trust-dns behind a small trait so verification logic can be
//! exercised against canned answers.

use async_trait::async_trait;
use mailward_common::types::DnsRecordType;
use mailward_common::{Error, Result};
use std::net::IpAddr;
use thiserror::Error as ThisError;
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::proto::op::ResponseCode;
use trust_dns_resolver::TokioAsyncResolver;

/// Lookup failure, distinguished so verification can report precisely
/// what went wrong for each record.
#[derive(Debug, ThisError)]
pub enum DnsError {
    /// The name does not exist at all (NXDOMAIN)
    #[error("name not found: {host}")]
    NotFound { host: String },
    /// The name exists but carries no records of the requested type
    #[error("no {record_type} records at {host}")]
    NoAnswer { host: String, record_type: DnsRecordType },
    /// Transport-level or server failure
    #[error("lookup for {host} failed: {message}")]
    Resolve { host: String, message: String },
}

/// Resolver seam used by record verification.
///
/// MX lookups return the exchange host only; verification compares
/// exchanges, not preferences.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn resolve(
        &self,
        record_type: DnsRecordType,
        host: &str,
    ) -> std::result::Result<Vec<String>, DnsError>;
}

/// Production resolver backed by trust-dns
pub struct SystemDnsResolver {
    resolver: TokioAsyncResolver,
}

impl SystemDnsResolver {
    /// Build a resolver. Explicit nameservers are queried over plain UDP/TCP
    /// port 53; an empty list falls back to the system configuration.
    pub fn new(nameservers: &[String]) -> Result<Self> {
        let resolver = if nameservers.is_empty() {
            TokioAsyncResolver::tokio_from_system_conf()
                .map_err(|e| Error::Config(format!("Failed to read resolver config: {}", e)))?
        } else {
            let ips: Vec<IpAddr> = nameservers
                .iter()
                .map(|ns| {
                    ns.parse()
                        .map_err(|_| Error::Config(format!("Invalid nameserver address: {}", ns)))
                })
                .collect::<Result<_>>()?;
            let group = NameServerConfigGroup::from_ips_clear(&ips, 53, true);
            let config = ResolverConfig::from_parts(None, Vec::new(), group);
            TokioAsyncResolver::tokio(config, ResolverOpts::default())
        };

        Ok(Self { resolver })
    }
}

#[async_trait]
impl DnsResolver for SystemDnsResolver {
    async fn resolve(
        &self,
        record_type: DnsRecordType,
        host: &str,
    ) -> std::result::Result<Vec<String>, DnsError> {
        match record_type {
            DnsRecordType::Txt => {
                let lookup = self
                    .resolver
                    .txt_lookup(host)
                    .await
                    .map_err(|e| classify(host, record_type, e))?;
                Ok(lookup
                    .iter()
                    .map(|txt| {
                        // Chunked TXT values come back as multiple segments
                        txt.txt_data()
                            .iter()
                            .map(|d| String::from_utf8_lossy(d).to_string())
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .collect())
            }
            DnsRecordType::A => {
                let lookup = self
                    .resolver
                    .ipv4_lookup(host)
                    .await
                    .map_err(|e| classify(host, record_type, e))?;
                Ok(lookup.iter().map(|a| a.to_string()).collect())
            }
            DnsRecordType::Aaaa => {
                let lookup = self
                    .resolver
                    .ipv6_lookup(host)
                    .await
                    .map_err(|e| classify(host, record_type, e))?;
                Ok(lookup.iter().map(|a| a.to_string()).collect())
            }
            DnsRecordType::Mx => {
                let lookup = self
                    .resolver
                    .mx_lookup(host)
                    .await
                    .map_err(|e| classify(host, record_type, e))?;
                Ok(lookup.iter().map(|mx| mx.exchange().to_string()).collect())
            }
        }
    }
}

fn classify(host: &str, record_type: DnsRecordType, e: ResolveError) -> DnsError {
    match e.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => {
            if *response_code == ResponseCode::NXDomain {
                DnsError::NotFound {
                    host: host.to_string(),
                }
            } else {
                DnsError::NoAnswer {
                    host: host.to_string(),
                    record_type,
                }
            }
        }
        _ => DnsError::Resolve {
            host: host.to_string(),
            message: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dns_error_messages() {
        let not_found = DnsError::NotFound {
            host: "missing.example.com".to_string(),
        };
        assert!(not_found.to_string().contains("missing.example.com"));

        let no_answer = DnsError::NoAnswer {
            host: "example.com".to_string(),
            record_type: DnsRecordType::Mx,
        };
        assert!(no_answer.to_string().contains("MX"));
    }
}
