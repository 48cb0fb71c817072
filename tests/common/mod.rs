#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use crl_verifier::{
    config::CrlConfig,
    pki::crl::{
        CrlEndpoint, CrlError, CrlFetcher, CrlResult, CrlVerifier, DirectoryTransport,
        WebTransport,
    },
    telemetry,
};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CertificateRevocationListParams,
    CrlDistributionPoint, DistinguishedName, DnType, IsCa, KeyIdMethod, KeyPair, KeyUsagePurpose,
    RevocationReason, RevokedCertParams, SerialNumber, date_time_ymd,
};
use time::OffsetDateTime;

/// A CA that can issue leaves and sign CRLs
pub struct TestCa {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl TestCa {
    pub fn new(name: &str) -> Self {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, name);
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    pub fn der(&self) -> Vec<u8> {
        self.cert.der().to_vec()
    }

    /// Issue a leaf certificate naming the given CRL locations
    pub fn issue_leaf(&self, serial: u64, crl_uris: &[&str]) -> Vec<u8> {
        let mut params = CertificateParams::new(vec!["signer.example.com".to_string()]).unwrap();
        params.serial_number = Some(SerialNumber::from(serial));
        if !crl_uris.is_empty() {
            params.crl_distribution_points = vec![CrlDistributionPoint {
                uris: crl_uris.iter().map(|uri| uri.to_string()).collect(),
            }];
        }
        let key = KeyPair::generate().unwrap();
        params
            .signed_by(&key, &self.cert, &self.key)
            .unwrap()
            .der()
            .to_vec()
    }

    /// Sign a CRL revoking the given serials at the given dates
    pub fn crl(&self, revoked: &[(u64, OffsetDateTime)]) -> Vec<u8> {
        self.crl_params(revoked)
            .signed_by(&self.cert, &self.key)
            .unwrap()
            .der()
            .to_vec()
    }

    pub fn crl_pem(&self, revoked: &[(u64, OffsetDateTime)]) -> String {
        self.crl_params(revoked)
            .signed_by(&self.cert, &self.key)
            .unwrap()
            .pem()
            .unwrap()
    }

    fn crl_params(&self, revoked: &[(u64, OffsetDateTime)]) -> CertificateRevocationListParams {
        CertificateRevocationListParams {
            this_update: date_time_ymd(2020, 1, 1),
            next_update: date_time_ymd(2040, 1, 1),
            crl_number: SerialNumber::from(1u64),
            issuing_distribution_point: None,
            revoked_certs: revoked
                .iter()
                .map(|(serial, at)| RevokedCertParams {
                    serial_number: SerialNumber::from(*serial),
                    revocation_time: *at,
                    reason_code: Some(RevocationReason::KeyCompromise),
                    invalidity_date: None,
                })
                .collect(),
            key_identifier_method: KeyIdMethod::Sha256,
        }
    }
}

/// In-memory stand-in for both transport families
#[derive(Default)]
pub struct FakeNetwork {
    web: HashMap<String, Vec<u8>>,
    directory: HashMap<String, Vec<u8>>,
    requested: Mutex<Vec<String>>,
}

impl FakeNetwork {
    pub fn serve(mut self, uri: &str, body: Vec<u8>) -> Self {
        self.web.insert(uri.to_string(), body);
        self
    }

    pub fn publish(mut self, uri: &str, attribute: Vec<u8>) -> Self {
        self.directory.insert(uri.to_string(), attribute);
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }

    fn record(&self, endpoint: &CrlEndpoint) {
        self.requested.lock().unwrap().push(endpoint.uri.clone());
    }
}

#[async_trait]
impl WebTransport for FakeNetwork {
    async fn open_stream(&self, endpoint: &CrlEndpoint) -> CrlResult<Vec<u8>> {
        self.record(endpoint);
        self.web
            .get(&endpoint.uri)
            .cloned()
            .ok_or_else(|| CrlError::Transport {
                endpoint: endpoint.uri.clone(),
                reason: "connection refused".to_string(),
            })
    }
}

#[async_trait]
impl DirectoryTransport for FakeNetwork {
    async fn fetch_attribute(
        &self,
        endpoint: &CrlEndpoint,
        _attribute: &str,
    ) -> CrlResult<Option<Vec<u8>>> {
        self.record(endpoint);
        Ok(self.directory.get(&endpoint.uri).cloned())
    }
}

pub fn verifier(network: Arc<FakeNetwork>, config: &CrlConfig) -> CrlVerifier {
    telemetry::init_tracing();
    let fetcher = CrlFetcher::with_transports(config, network.clone(), network);
    CrlVerifier::with_fetcher(config, fetcher)
}
