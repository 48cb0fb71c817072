use tracing::{debug, warn};
use x509_parser::extensions::ParsedExtension;
use x509_parser::num_bigint::BigUint;
use x509_parser::prelude::*;

use super::errors::{CrlError, CrlResult};
use super::types::{CrlData, RevocationReason, RevokedEntry};

/// A CRL whose signature has been checked against a trust anchor.
///
/// Revoked entries are only reachable through this type.
#[derive(Debug)]
pub struct AuthenticatedCrl<'a> {
    crl: CertificateRevocationList<'a>,
}

impl CrlData {
    /// Verify the CRL signature against the issuing certificate
    ///
    /// The issuer must be named by the CRL, may restrict itself to CRL signing
    /// through its KeyUsage extension, and its key must verify the signature.
    pub fn authenticate(&self, issuer_cert: &X509Certificate<'_>) -> CrlResult<AuthenticatedCrl<'_>> {
        let crl = self.parse()?;

        if issuer_cert.subject().as_raw() != crl.issuer().as_raw() {
            return Err(CrlError::IssuerNotTrusted {
                issuer: self.issuer.clone(),
                endpoint: self.distribution_point.clone(),
            });
        }

        // A certificate without KeyUsage is not restricted (RFC 5280 §4.2.1.3)
        if let Ok(Some(key_usage)) = issuer_cert.key_usage()
            && !key_usage.value.crl_sign()
        {
            warn!("Issuer certificate not authorized for CRL signing (cRLSign bit not set)");
            return Err(CrlError::UnauthorizedIssuer {
                issuer: self.issuer.clone(),
            });
        }

        match crl.verify_signature(issuer_cert.public_key()) {
            Ok(()) => {
                debug!("[OK] CRL signature verification passed");
                Ok(AuthenticatedCrl { crl })
            }
            Err(e) => {
                debug!("[ERROR] CRL signature verification failed: {:?}", e);
                Err(CrlError::SignatureInvalid {
                    issuer: self.issuer.clone(),
                    endpoint: self.distribution_point.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

impl AuthenticatedCrl<'_> {
    /// Look up the entry for a certificate serial number
    pub fn revoked_entry(&self, serial: &BigUint) -> Option<RevokedEntry> {
        let revoked_cert = self
            .crl
            .iter_revoked_certificates()
            .find(|revoked| &revoked.user_certificate == serial)?;

        let reason = revoked_cert
            .extensions()
            .iter()
            .find_map(|ext| match ext.parsed_extension() {
                ParsedExtension::ReasonCode(code) => RevocationReason::from_u8(code.0),
                _ => None,
            });

        Some(RevokedEntry {
            serial: serial.to_bytes_be(),
            revocation_date: revoked_cert.revocation_date.to_datetime(),
            reason,
        })
    }

    pub fn revoked_count(&self) -> usize {
        self.crl.iter_revoked_certificates().count()
    }
}
