use std::fmt;

use ::time::OffsetDateTime;
use x509_parser::prelude::*;

use super::errors::{CrlError, CrlResult};

/// Transport schemes a CRL distribution point can be fetched over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrlScheme {
    Http,
    Https,
    Ftp,
    Ldap,
}

/// The two transport families that serve CRLs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFamily {
    /// Plain byte stream (http, https, ftp)
    Web,
    /// Directory attribute (ldap)
    Directory,
}

impl CrlScheme {
    /// Select the scheme from the URI prefix. Returns `None` for anything
    /// that is not one of the supported transports.
    pub fn from_uri(uri: &str) -> Option<Self> {
        const PREFIXES: [(&str, CrlScheme); 4] = [
            ("http://", CrlScheme::Http),
            ("https://", CrlScheme::Https),
            ("ftp://", CrlScheme::Ftp),
            ("ldap://", CrlScheme::Ldap),
        ];

        PREFIXES.iter().find_map(|(prefix, scheme)| {
            uri.get(..prefix.len())
                .filter(|head| head.eq_ignore_ascii_case(prefix))
                .map(|_| *scheme)
        })
    }

    pub fn family(self) -> TransportFamily {
        match self {
            CrlScheme::Http | CrlScheme::Https | CrlScheme::Ftp => TransportFamily::Web,
            CrlScheme::Ldap => TransportFamily::Directory,
        }
    }
}

/// A single CRL retrieval location taken from a certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrlEndpoint {
    pub uri: String,
    /// `None` when the URI names an unsupported transport
    pub scheme: Option<CrlScheme>,
}

impl CrlEndpoint {
    pub fn new(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let scheme = CrlScheme::from_uri(&uri);
        Self { uri, scheme }
    }
}

impl fmt::Display for CrlEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Represents a fetched Certificate Revocation List
///
/// Holds the DER encoding; the structured view is parsed on demand since
/// x509-parser borrows from the input buffer.
#[derive(Debug, Clone)]
pub struct CrlData {
    /// The raw CRL data in DER format
    pub der_data: Vec<u8>,
    /// Distribution point the CRL was fetched from
    pub distribution_point: String,
    /// The issuer of this CRL, rendered for diagnostics
    pub issuer: String,
}

impl CrlData {
    /// Decode a CRL from DER or PEM bytes
    pub fn from_bytes(bytes: Vec<u8>, distribution_point: &str) -> CrlResult<Self> {
        let der_data = if looks_like_pem(&bytes) {
            let (_, pem) = x509_parser::pem::parse_x509_pem(&bytes)
                .map_err(|e| CrlError::decode(distribution_point, e))?;
            if pem.label != "X509 CRL" {
                return Err(CrlError::decode(
                    distribution_point,
                    format!("unexpected PEM label {}", pem.label),
                ));
            }
            pem.contents
        } else {
            bytes
        };

        let (rest, crl) = CertificateRevocationList::from_der(&der_data)
            .map_err(|e| CrlError::decode(distribution_point, e))?;
        if !rest.is_empty() {
            return Err(CrlError::decode(
                distribution_point,
                format!("{} trailing bytes after CRL", rest.len()),
            ));
        }
        let issuer = crl.issuer().to_string();

        Ok(Self {
            der_data,
            distribution_point: distribution_point.to_string(),
            issuer,
        })
    }

    /// Parse the CRL from DER data
    pub(crate) fn parse(&self) -> CrlResult<CertificateRevocationList<'_>> {
        let (_, crl) = CertificateRevocationList::from_der(&self.der_data)
            .map_err(|e| CrlError::decode(&self.distribution_point, e))?;
        Ok(crl)
    }
}

fn looks_like_pem(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(b"-----BEGIN")
}

/// Reasons a certificate was revoked (RFC 5280 §5.3.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationReason {
    Unspecified,
    KeyCompromise,
    CaCompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
    CertificateHold,
    RemoveFromCrl,
    PrivilegeWithdrawn,
    AaCompromise,
}

impl RevocationReason {
    pub fn from_u8(code: u8) -> Option<Self> {
        Some(match code {
            0 => RevocationReason::Unspecified,
            1 => RevocationReason::KeyCompromise,
            2 => RevocationReason::CaCompromise,
            3 => RevocationReason::AffiliationChanged,
            4 => RevocationReason::Superseded,
            5 => RevocationReason::CessationOfOperation,
            6 => RevocationReason::CertificateHold,
            // 7 is unassigned
            8 => RevocationReason::RemoveFromCrl,
            9 => RevocationReason::PrivilegeWithdrawn,
            10 => RevocationReason::AaCompromise,
            _ => return None,
        })
    }
}

/// A CRL entry matching the certificate under evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokedEntry {
    /// Big-endian serial number
    pub serial: Vec<u8>,
    pub revocation_date: OffsetDateTime,
    pub reason: Option<RevocationReason>,
}

/// Outcome of a revocation check at a reference time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The certificate is not listed in the CRL
    NotRevoked,
    /// Revoked at or before the reference time
    Revoked(RevokedEntry),
    /// Revoked, but only after the reference time
    RevokedAfterReference(RevokedEntry),
}

impl Verdict {
    pub fn is_revoked(&self) -> bool {
        matches!(self, Verdict::Revoked(_))
    }

    /// Treat a revocation before the reference time as an error.
    pub fn ensure_not_revoked(self) -> CrlResult<Self> {
        match self {
            Verdict::Revoked(entry) => Err(CrlError::Revoked {
                revocation_date: entry.revocation_date,
            }),
            other => Ok(other),
        }
    }
}
