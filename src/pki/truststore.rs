use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::fs;
use walkdir::WalkDir;
use x509_parser::error::PEMError;
use x509_parser::pem::Pem;
use x509_parser::prelude::*;

/// Error type for trust store operations.
#[derive(Debug, Error)]
pub enum TrustStoreError {
    #[error("X.509 error: {0}")]
    X509(#[from] X509Error),

    #[error("PEM error: {0}")]
    Pem(#[from] PEMError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<walkdir::Error> for TrustStoreError {
    fn from(e: walkdir::Error) -> Self {
        TrustStoreError::Io(e.into())
    }
}

/// Represents a certificate with additional metadata.
#[derive(Debug, Clone)]
pub struct CertificateEntry {
    pub raw: Arc<Vec<u8>>,
    pub serial_number: String,
    pub subject: String,
    /// DER of the subject name, compared against CRL issuers
    raw_subject: Vec<u8>,
}

impl CertificateEntry {
    /// Create a certificate entry from DER-encoded bytes
    pub fn from_der(der: impl AsRef<[u8]>) -> Result<Self, TrustStoreError> {
        let der_bytes = der.as_ref();
        let (_, cert) =
            X509Certificate::from_der(der_bytes).map_err(|e| TrustStoreError::X509(e.into()))?;

        let serial_number = cert.tbs_certificate.raw_serial_as_string();
        let subject = cert.subject().to_string();
        let raw_subject = cert.subject().as_raw().to_vec();

        Ok(Self {
            raw: Arc::new(der_bytes.to_vec()),
            serial_number,
            subject,
            raw_subject,
        })
    }

    /// Parse the certificate from stored DER bytes
    pub fn parse(&self) -> Result<X509Certificate<'_>, TrustStoreError> {
        let (_, cert) =
            X509Certificate::from_der(&self.raw).map_err(|e| TrustStoreError::X509(e.into()))?;
        Ok(cert)
    }
}

/// The certificates a caller accepts as authoritative CRL issuers.
///
/// The set is fixed once built; clones share the same storage, so one set can
/// back any number of concurrent evaluations.
#[derive(Debug, Clone, Default)]
pub struct TrustAnchors {
    entries: Arc<[CertificateEntry]>,
}

impl TrustAnchors {
    /// Build the set from DER encoded certificates.
    pub fn from_der_certs<I, D>(der_certs: I) -> Result<Self, TrustStoreError>
    where
        I: IntoIterator<Item = D>,
        D: AsRef<[u8]>,
    {
        let entries = der_certs
            .into_iter()
            .map(CertificateEntry::from_der)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            entries: entries.into(),
        })
    }

    /// Build the set from every CERTIFICATE block of a PEM bundle.
    pub fn from_pem(pem: impl AsRef<[u8]>) -> Result<Self, TrustStoreError> {
        Self::from_der_certs(pem_certificates(pem.as_ref())?)
    }

    /// Load trust anchors from a directory.
    ///
    /// Files with .der, .crt or .pem extensions are read; files that cannot
    /// be read or do not hold a certificate are skipped.
    pub async fn load_dir(base_path: impl AsRef<Path>) -> Result<Self, TrustStoreError> {
        let mut entries = Vec::new();

        for entry in WalkDir::new(base_path.as_ref()).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                // A missing or unreadable base directory is still an error
                Err(e) if e.depth() == 0 => return Err(e.into()),
                Err(e) => {
                    tracing::warn!("Skipping directory entry: {e}");
                    continue;
                }
            };
            let path = entry.path();

            let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
                continue;
            };
            if !["der", "crt", "pem"]
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
            {
                continue;
            }

            let bytes = match fs::read(path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("Skipping {}: {e}", path.display());
                    continue;
                }
            };
            let ders = if bytes.starts_with(b"-----BEGIN") {
                match pem_certificates(&bytes) {
                    Ok(ders) => ders,
                    Err(e) => {
                        tracing::warn!("Skipping {}: {e}", path.display());
                        continue;
                    }
                }
            } else {
                vec![bytes]
            };

            for der in ders {
                match CertificateEntry::from_der(der) {
                    Ok(cert_entry) => entries.push(cert_entry),
                    Err(e) => tracing::warn!("Skipping {}: {e}", path.display()),
                }
            }
        }

        tracing::info!("Loaded {} trust anchors from disk", entries.len());
        Ok(Self {
            entries: entries.into(),
        })
    }

    /// Return the amount of trust anchors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CertificateEntry> + '_ {
        self.entries.iter()
    }

    /// First anchor whose subject equals the given name.
    pub fn find_by_subject(&self, name: &X509Name<'_>) -> Option<&CertificateEntry> {
        let found = self
            .entries
            .iter()
            .find(|entry| entry.raw_subject == name.as_raw());
        if let Some(entry) = found {
            tracing::debug!(
                "Matched trust anchor {} (serial {})",
                entry.subject,
                entry.serial_number
            );
        }
        found
    }
}

fn pem_certificates(bytes: &[u8]) -> Result<Vec<Vec<u8>>, PEMError> {
    let mut ders = Vec::new();
    for pem in Pem::iter_from_buffer(bytes) {
        let pem = pem?;
        if pem.label == "CERTIFICATE" {
            ders.push(pem.contents);
        }
    }
    Ok(ders)
}
