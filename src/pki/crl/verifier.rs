use ::time::OffsetDateTime;
use tracing::{info, instrument, warn};
use x509_parser::prelude::*;

use crate::config::CrlConfig;
use crate::pki::truststore::TrustAnchors;

use super::errors::{CrlError, CrlResult};
use super::fetcher::CrlFetcher;
use super::parser::extract_crl_distribution_points;
use super::types::{CrlEndpoint, Verdict};

/// Decides whether a certificate was revoked as of a reference time, using
/// the CRLs named in its distribution points extension.
#[derive(Clone)]
pub struct CrlVerifier {
    fetcher: CrlFetcher,
    advance_on_endpoint_failure: bool,
}

impl CrlVerifier {
    /// Create a verifier that fetches over the network
    pub fn new(config: &CrlConfig) -> CrlResult<Self> {
        Ok(Self::with_fetcher(config, CrlFetcher::new(config)?))
    }

    pub fn with_fetcher(config: &CrlConfig, fetcher: CrlFetcher) -> Self {
        Self {
            fetcher,
            advance_on_endpoint_failure: config.advance_on_endpoint_failure,
        }
    }

    /// Evaluate the revocation status of `cert` at `reference_time`.
    ///
    /// Distribution points are consulted in order and the first one that
    /// yields a CRL decides; per RFC 5280 §4.2.1.13 several names describe
    /// alternative ways to obtain the same CRL. Unless the verifier is
    /// configured to advance, a failure on the first endpoint is final.
    #[instrument(skip_all, fields(subject = %cert.subject()))]
    pub async fn evaluate(
        &self,
        cert: &X509Certificate<'_>,
        reference_time: OffsetDateTime,
        anchors: &TrustAnchors,
    ) -> CrlResult<Verdict> {
        let subject = cert.subject().to_string();
        let endpoints = extract_crl_distribution_points(cert)?;

        if endpoints.is_empty() {
            warn!("No CRL distribution points found in certificate");
            return Err(CrlError::NoDistributionPoints { subject });
        }

        let mut last_failure = None;
        for endpoint in &endpoints {
            info!("Checking distribution point URL: {}", endpoint);

            match self
                .check_endpoint(cert, endpoint, reference_time, anchors)
                .await
            {
                Ok(verdict) => return Ok(verdict),
                Err(e) if self.advance_on_endpoint_failure && e.is_endpoint_failure() => {
                    warn!("{e}: trying next distribution point");
                    last_failure = Some(e);
                }
                Err(e) => return Err(into_failure(subject, e)),
            }
        }

        Err(match last_failure {
            Some(e) => into_failure(subject, e),
            None => CrlError::NoDistributionPoints { subject },
        })
    }

    async fn check_endpoint(
        &self,
        cert: &X509Certificate<'_>,
        endpoint: &CrlEndpoint,
        reference_time: OffsetDateTime,
        anchors: &TrustAnchors,
    ) -> CrlResult<Verdict> {
        let crl = self.fetcher.fetch(endpoint).await?;

        // "To validate a specific CRL prior to relying on it, the
        // certificate of its corresponding CA is needed"
        let anchor = anchors
            .find_by_subject(crl.parse()?.issuer())
            .ok_or_else(|| CrlError::IssuerNotTrusted {
                issuer: crl.issuer.clone(),
                endpoint: endpoint.uri.clone(),
            })?;
        let issuer_cert = anchor.parse()?;
        let authenticated = crl.authenticate(&issuer_cert)?;

        let verdict = match authenticated.revoked_entry(&cert.tbs_certificate.serial) {
            None => {
                info!("The certificate was not revoked by CRL {}", endpoint);
                Verdict::NotRevoked
            }
            Some(entry) if entry.revocation_date <= reference_time => {
                info!(
                    "The certificate {} was revoked by CRL {} on {}",
                    hex::encode(&entry.serial),
                    endpoint,
                    entry.revocation_date
                );
                Verdict::Revoked(entry)
            }
            Some(entry) => {
                info!(
                    "The certificate {} was revoked after signing by CRL {} on {}",
                    hex::encode(&entry.serial),
                    endpoint,
                    entry.revocation_date
                );
                Verdict::RevokedAfterReference(entry)
            }
        };

        Ok(verdict)
    }
}

/// Endpoint-level causes are reported as a verification failure of the
/// certificate; trust failures keep their own kind.
fn into_failure(subject: String, err: CrlError) -> CrlError {
    if err.is_endpoint_failure() {
        CrlError::VerificationFailure {
            subject,
            source: Box::new(err),
        }
    } else {
        err
    }
}
