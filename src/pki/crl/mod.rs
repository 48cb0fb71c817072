//! Certificate Revocation List (CRL) checking
//!
//! This module decides whether an X.509 certificate was revoked as of a
//! reference time, following RFC 5280 §4.2.1.13 and §5.
//!
//! # Features
//! - Extracting URI distribution points from a certificate
//! - Fetching CRLs over http, https, ftp and ldap
//! - Authenticating each CRL against caller-supplied trust anchors
//! - Comparing a matching revocation date against the reference time

mod errors;
mod fetcher;
mod parser;
mod types;
mod validation;
mod verifier;

// Re-export public types
pub use errors::{CrlError, CrlResult};
pub use fetcher::{CrlFetcher, DirectoryTransport, LdapDirectory, WebClient, WebTransport};
pub use parser::extract_crl_distribution_points;
pub use types::{
    CrlData, CrlEndpoint, CrlScheme, RevocationReason, RevokedEntry, TransportFamily, Verdict,
};
pub use validation::AuthenticatedCrl;
pub use verifier::CrlVerifier;
