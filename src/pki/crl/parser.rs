use tracing::debug;
use x509_parser::extensions::{DistributionPointName, GeneralName, ParsedExtension};
use x509_parser::oid_registry::OID_X509_EXT_CRL_DISTRIBUTION_POINTS;
use x509_parser::prelude::*;

use super::errors::{CrlError, CrlResult};
use super::types::CrlEndpoint;

/// Extract CRL distribution points from a certificate
///
/// Only the `fullName` form of each distribution point is inspected, and
/// within it only URI general names are kept, in document order. A
/// certificate without the extension yields an empty list.
pub fn extract_crl_distribution_points(cert: &X509Certificate<'_>) -> CrlResult<Vec<CrlEndpoint>> {
    // Look for CRL Distribution Points extension (OID: 2.5.29.31)
    let Some(ext) = cert
        .get_extension_unique(&OID_X509_EXT_CRL_DISTRIBUTION_POINTS)
        .map_err(|e| CrlError::MalformedExtension(e.to_string()))?
    else {
        debug!("No CRL distribution points extension in {}", cert.subject());
        return Ok(Vec::new());
    };

    let points = match ext.parsed_extension() {
        ParsedExtension::CRLDistributionPoints(points) => points,
        ParsedExtension::ParseError { error } => {
            return Err(CrlError::MalformedExtension(error.to_string()));
        }
        other => {
            return Err(CrlError::MalformedExtension(format!(
                "unexpected extension content: {other:?}"
            )));
        }
    };

    let mut endpoints = Vec::new();
    for point in points.points.iter() {
        match &point.distribution_point {
            Some(DistributionPointName::FullName(names)) => {
                for name in names {
                    if let GeneralName::URI(uri) = name {
                        endpoints.push(CrlEndpoint::new(*uri));
                    } else {
                        debug!("Skipping non-URI general name: {name:?}");
                    }
                }
            }
            // Needs the CRL issuer's name to resolve; not supported
            Some(DistributionPointName::NameRelativeToCRLIssuer(_)) => {
                debug!("Skipping distribution point relative to CRL issuer");
            }
            None => {}
        }
    }

    debug!("Found {} CRL distribution points", endpoints.len());
    Ok(endpoints)
}
