use thiserror::Error;
use time::OffsetDateTime;

use crate::pki::truststore::TrustStoreError;

/// CRL-related errors
#[derive(Error, Debug)]
pub enum CrlError {
    #[error("Malformed CRL distribution points extension: {0}")]
    MalformedExtension(String),

    #[error("No CRL distribution point found in certificate {subject}")]
    NoDistributionPoints { subject: String },

    #[error("Can not download CRL from certificate distribution point: {0}")]
    UnsupportedScheme(String),

    #[error("Failed to fetch CRL from {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("Failed to decode CRL from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    #[error(
        "Certificate for {issuer} not found among trust anchors, so the CRL at {endpoint} could not be verified"
    )]
    IssuerNotTrusted { issuer: String, endpoint: String },

    #[error("Issuer {issuer} not authorized for CRL signing")]
    UnauthorizedIssuer { issuer: String },

    #[error("CRL signature verification failed for {issuer} at {endpoint}: {reason}")]
    SignatureInvalid {
        issuer: String,
        endpoint: String,
        reason: String,
    },

    #[error("Cannot verify CRL for certificate {subject}: {source}")]
    VerificationFailure {
        subject: String,
        #[source]
        source: Box<CrlError>,
    },

    #[error("The certificate was revoked on {revocation_date}")]
    Revoked { revocation_date: OffsetDateTime },

    #[error("Trust store error: {0}")]
    TrustStore(#[from] TrustStoreError),

    #[error("HTTP client initialisation failed: {0}")]
    Client(#[from] reqwest::Error),
}

impl CrlError {
    pub(crate) fn transport(endpoint: &str, reason: impl ToString) -> Self {
        CrlError::Transport {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn decode(endpoint: &str, reason: impl ToString) -> Self {
        CrlError::Decode {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    /// The innermost error behind any `VerificationFailure` wrappers.
    pub fn root_cause(&self) -> &CrlError {
        let mut current = self;
        while let CrlError::VerificationFailure { source, .. } = current {
            current = source;
        }
        current
    }

    /// Whether another distribution point could still yield an answer.
    ///
    /// Only failures tied to reaching or reading one endpoint qualify; trust
    /// failures describe the CRL issuer and repeat on every endpoint.
    pub fn is_endpoint_failure(&self) -> bool {
        matches!(
            self.root_cause(),
            CrlError::UnsupportedScheme(_) | CrlError::Transport { .. } | CrlError::Decode { .. }
        )
    }
}

/// Convenient Result type alias
pub type CrlResult<T> = Result<T, CrlError>;
