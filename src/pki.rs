pub mod crl;
pub mod truststore;

// Re-export commonly used types
pub use crl::{CrlError, CrlVerifier, Verdict};
pub use truststore::{TrustAnchors, TrustStoreError};
