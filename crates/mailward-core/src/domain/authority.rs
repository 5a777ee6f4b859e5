//! DNS record synthesis and verification for mail domains

use crate::dns::DnsResolver;
use crate::domain::keys;
use chrono::Utc;
use mailward_common::config::{DnsConfig, ServersConfig};
use mailward_common::types::{DnsRecord, DnsRecordCategory, DnsRecordType};
use mailward_common::{Error, Result};
use mailward_storage::models::Domain;
use sqlx::types::Json;
use tracing::{info, warn};

/// One record that failed verification, with what was expected and what
/// the resolver actually returned.
#[derive(Debug, Clone)]
pub struct RecordMismatch {
    /// Position of the record in the domain's record list
    pub index: usize,
    pub host: String,
    pub record_type: DnsRecordType,
    pub expected: String,
    /// Resolved values, empty when the lookup itself failed
    pub found: Vec<String>,
}

/// Outcome of a verification pass over a record set
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub all_verified: bool,
    pub mismatches: Vec<RecordMismatch>,
}

/// Synthesizes and verifies the DNS record sets that make a domain able
/// to send and receive mail through the service.
pub struct DomainAuthority {
    dns: DnsConfig,
    servers: ServersConfig,
}

impl DomainAuthority {
    pub fn new(dns: DnsConfig, servers: ServersConfig) -> Self {
        Self { dns, servers }
    }

    /// Generate a fresh DKIM keypair for the domain and rebuild its records.
    ///
    /// Validation happens before any key generation: the selector must be a
    /// plain DNS label (lowercase alphanumerics and underscores) and the key
    /// size at least 1024 bits.
    pub fn generate_records(&self, domain: &mut Domain) -> Result<()> {
        let selector = domain.dkim_selector.to_lowercase();
        validate_label(&selector, "DKIM selector")?;
        if domain.dkim_bits < 1024 {
            return Err(Error::Validation(format!(
                "DKIM key size must be at least 1024 bits, got {}",
                domain.dkim_bits
            )));
        }

        let keypair = keys::generate_dkim_keypair(domain.dkim_bits as u32)?;
        domain.dkim_selector = selector;
        domain.dkim_private_key = Some(keypair.private_key);
        domain.dkim_public_key = Some(keypair.public_key);

        info!(domain = %domain.domain_name, "Generated new DKIM keypair");

        self.refresh_records(domain)
    }

    /// Rebuild the domain's record set from its current key material.
    ///
    /// The previous set is discarded wholesale and `verified` is cleared;
    /// a fresh verification pass has to confirm the new set.
    pub fn refresh_records(&self, domain: &mut Domain) -> Result<()> {
        domain.verified = false;

        let mut records = Vec::new();

        // SPF: delegate to the service-wide include host
        records.push(DnsRecord {
            category: DnsRecordCategory::Sending,
            record_type: DnsRecordType::Txt,
            host: domain.domain_name.clone(),
            value: format!(
                "v=spf1 include:{}.{} ~all",
                self.dns.spf_host, self.dns.primary_domain
            ),
            ttl: self.dns.default_ttl,
            priority: None,
            verified: false,
        });

        // DKIM public key
        if let Some(public_key) = &domain.dkim_public_key {
            records.push(DnsRecord {
                category: DnsRecordCategory::Sending,
                record_type: DnsRecordType::Txt,
                host: format!("{}._domainkey.{}", domain.dkim_selector, domain.domain_name),
                value: format!("v=DKIM1;k=rsa;p={}", public_key),
                ttl: self.dns.default_ttl,
                priority: None,
                verified: false,
            });
        }

        // DMARC: monitoring policy only
        records.push(DnsRecord {
            category: DnsRecordCategory::Sending,
            record_type: DnsRecordType::Txt,
            host: format!("_dmarc.{}", domain.domain_name),
            value: "v=DMARC1; p=none;".to_string(),
            ttl: self.dns.default_ttl,
            priority: None,
            verified: false,
        });

        // One MX per configured incoming server
        for incoming in &self.servers.incoming {
            records.push(DnsRecord {
                category: DnsRecordCategory::Receiving,
                record_type: DnsRecordType::Mx,
                host: domain.domain_name.clone(),
                value: format!("{}.", incoming.server),
                ttl: self.dns.default_ttl,
                priority: Some(incoming.priority),
                verified: false,
            });
        }

        domain.dns_records = Json(records);
        domain.updated_at = Utc::now();
        Ok(())
    }

    /// Synthesize the service-wide server records: an A/AAAA pair per
    /// enabled outgoing server plus one aggregate SPF record at
    /// `<spf_host>.<primary_domain>` listing every enabled server.
    pub fn server_records(&self) -> Result<Vec<DnsRecord>> {
        let spf_host = self.dns.spf_host.to_lowercase();
        validate_label(&spf_host, "SPF host")?;

        let mut records = Vec::new();
        let mut mechanisms = Vec::new();

        for outgoing in &self.servers.outgoing {
            if !outgoing.enabled {
                continue;
            }
            if let Some(ipv4) = &outgoing.ipv4 {
                records.push(DnsRecord {
                    category: DnsRecordCategory::Server,
                    record_type: DnsRecordType::A,
                    host: outgoing.server.clone(),
                    value: ipv4.clone(),
                    ttl: self.dns.default_ttl,
                    priority: None,
                    verified: false,
                });
            }
            if let Some(ipv6) = &outgoing.ipv6 {
                records.push(DnsRecord {
                    category: DnsRecordCategory::Server,
                    record_type: DnsRecordType::Aaaa,
                    host: outgoing.server.clone(),
                    value: ipv6.clone(),
                    ttl: self.dns.default_ttl,
                    priority: None,
                    verified: false,
                });
            }
            mechanisms.push(format!("a:{}", outgoing.server));
        }

        records.push(DnsRecord {
            category: DnsRecordCategory::Server,
            record_type: DnsRecordType::Txt,
            host: format!("{}.{}", spf_host, self.dns.primary_domain),
            value: format!("v=spf1 {} ~all", mechanisms.join(" ")),
            ttl: self.dns.default_ttl,
            priority: None,
            verified: false,
        });

        Ok(records)
    }

    /// Verify every record in the set against live DNS.
    ///
    /// Each record is checked independently and its `verified` flag updated
    /// in place; a failing lookup fails only that record. A record passes
    /// when any resolved answer matches its expected value after
    /// normalization (quotes stripped, and all whitespace removed for DKIM
    /// records, whose TXT values may come back chunked).
    pub async fn verify_records(
        &self,
        resolver: &dyn DnsResolver,
        records: &mut [DnsRecord],
    ) -> VerifyReport {
        let mut mismatches = Vec::new();

        for (index, record) in records.iter_mut().enumerate() {
            let answers = match resolver.resolve(record.record_type, &record.host).await {
                Ok(answers) => answers,
                Err(e) => {
                    warn!(
                        host = %record.host,
                        record_type = %record.record_type,
                        "Record lookup failed: {}",
                        e
                    );
                    record.verified = false;
                    mismatches.push(RecordMismatch {
                        index,
                        host: record.host.clone(),
                        record_type: record.record_type,
                        expected: record.value.clone(),
                        found: Vec::new(),
                    });
                    continue;
                }
            };

            let expected = normalize(record, &record.value);
            let matched = answers.iter().any(|a| normalize(record, a) == expected);
            record.verified = matched;

            if !matched {
                warn!(
                    host = %record.host,
                    record_type = %record.record_type,
                    expected = %record.value,
                    found = ?answers,
                    "Record does not match the expected value"
                );
                mismatches.push(RecordMismatch {
                    index,
                    host: record.host.clone(),
                    record_type: record.record_type,
                    expected: record.value.clone(),
                    found: answers,
                });
            }
        }

        VerifyReport {
            all_verified: mismatches.is_empty(),
            mismatches,
        }
    }

    /// Run a verification pass over the domain's records and update its
    /// `verified` flag. An inactive domain is never verified.
    pub async fn verify_domain(
        &self,
        resolver: &dyn DnsResolver,
        domain: &mut Domain,
    ) -> VerifyReport {
        let report = self.verify_records(resolver, &mut domain.dns_records.0).await;
        domain.verified = report.all_verified && domain.active;
        domain.updated_at = Utc::now();

        if domain.verified {
            info!(domain = %domain.domain_name, "All DNS records verified");
        }

        report
    }

    /// Apply the record maintenance policy after a domain change.
    ///
    /// A new domain, or one whose key size changed or that has no key yet,
    /// gets a fresh keypair and record set. A selector-only change keeps the
    /// keypair and rebuilds the records. Deactivation just clears `verified`.
    /// Missing selector or key size are filled from the configured defaults.
    pub fn apply_change(&self, domain: &mut Domain, before: Option<&Domain>) -> Result<()> {
        if domain.dkim_selector.is_empty() {
            domain.dkim_selector = self.dns.default_dkim_selector.clone();
        }
        if domain.dkim_bits <= 0 {
            domain.dkim_bits = self.dns.default_dkim_bits as i32;
        }

        match before {
            None => self.generate_records(domain),
            Some(prev) => {
                if prev.dkim_bits != domain.dkim_bits || domain.dkim_private_key.is_none() {
                    self.generate_records(domain)
                } else if prev.dkim_selector != domain.dkim_selector {
                    self.refresh_records(domain)
                } else if prev.active && !domain.active {
                    domain.verified = false;
                    domain.updated_at = Utc::now();
                    Ok(())
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Compare-side normalization: resolvers quote TXT values, and DKIM
/// records may come back split into chunks.
fn normalize(record: &DnsRecord, value: &str) -> String {
    let unquoted = value.replace('"', "");
    if record.is_dkim() {
        unquoted.split_whitespace().collect()
    } else {
        unquoted.trim().to_string()
    }
}

/// Hostname labels for selectors and the SPF host: lowercase
/// alphanumerics and underscores only.
fn validate_label(label: &str, what: &str) -> Result<()> {
    let valid = !label.is_empty()
        && label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "{} may only contain alphanumerics and underscores, got {:?}",
            what, label
        )))
    }
}
