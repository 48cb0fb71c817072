use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use reqwest::Client;
use suppaftp::{FtpError, FtpStream};
use suppaftp::types::FileType;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::CrlConfig;

use super::errors::{CrlError, CrlResult};
use super::types::{CrlData, CrlEndpoint, CrlScheme, TransportFamily};

const DEFAULT_LDAP_PORT: u16 = 389;
const DEFAULT_FTP_PORT: u16 = 21;

/// Byte-stream retrieval for http, https and ftp distribution points
#[async_trait]
pub trait WebTransport: Send + Sync {
    /// Read the whole resource behind the endpoint
    async fn open_stream(&self, endpoint: &CrlEndpoint) -> CrlResult<Vec<u8>>;
}

/// Attribute retrieval for ldap distribution points
#[async_trait]
pub trait DirectoryTransport: Send + Sync {
    /// Read one attribute of the entry the endpoint addresses.
    ///
    /// Returns `Ok(None)` when the entry carries no such attribute.
    async fn fetch_attribute(
        &self,
        endpoint: &CrlEndpoint,
        attribute: &str,
    ) -> CrlResult<Option<Vec<u8>>>;
}

/// Default web transport: reqwest for http(s), suppaftp for ftp
#[derive(Debug, Clone)]
pub struct WebClient {
    client: Client,
    timeout: Duration,
    max_crl_size: usize,
}

impl WebClient {
    /// Client that stops reading a response once it passes `max_crl_size` bytes
    pub fn new(request_timeout: Duration, max_crl_size: usize) -> CrlResult<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            timeout: request_timeout,
            max_crl_size,
        })
    }

    async fn fetch_http(&self, uri: &str) -> CrlResult<Vec<u8>> {
        let mut response = match timeout(self.timeout, self.client.get(uri).send()).await {
            Ok(result) => result.map_err(|e| CrlError::transport(uri, e))?,
            Err(_) => {
                return Err(CrlError::transport(
                    uri,
                    format!("timed out after {:?}", self.timeout),
                ));
            }
        };

        if !response.status().is_success() {
            return Err(CrlError::transport(
                uri,
                format!("HTTP error {}", response.status()),
            ));
        }

        if let Some(length) = response.content_length()
            && length > self.max_crl_size as u64
        {
            return Err(too_large(uri, length, self.max_crl_size));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| CrlError::transport(uri, e))?
        {
            body.extend_from_slice(&chunk);
            if body.len() > self.max_crl_size {
                return Err(CrlError::transport(
                    uri,
                    format!("CRL exceeds the limit of {} bytes", self.max_crl_size),
                ));
            }
        }
        Ok(body)
    }

    async fn fetch_ftp(&self, uri: &str) -> CrlResult<Vec<u8>> {
        let target = FtpTarget::parse(uri)?;
        let request_timeout = self.timeout;
        let max_crl_size = self.max_crl_size;

        // suppaftp's stream is blocking
        tokio::task::spawn_blocking(move || target.retrieve(request_timeout, max_crl_size))
            .await
            .map_err(|e| CrlError::transport(uri, e))?
            .map_err(|e| CrlError::transport(uri, e))
    }
}

#[async_trait]
impl WebTransport for WebClient {
    async fn open_stream(&self, endpoint: &CrlEndpoint) -> CrlResult<Vec<u8>> {
        match endpoint.scheme {
            Some(CrlScheme::Http | CrlScheme::Https) => self.fetch_http(&endpoint.uri).await,
            Some(CrlScheme::Ftp) => self.fetch_ftp(&endpoint.uri).await,
            _ => Err(CrlError::UnsupportedScheme(endpoint.uri.clone())),
        }
    }
}

/// Parsed ftp:// location
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FtpTarget {
    host: String,
    port: u16,
    user: String,
    password: String,
    path: String,
}

impl FtpTarget {
    pub(crate) fn parse(uri: &str) -> CrlResult<Self> {
        let url = Url::parse(uri).map_err(|e| CrlError::transport(uri, e))?;
        let host = url
            .host_str()
            .ok_or_else(|| CrlError::transport(uri, "missing host"))?
            .to_string();
        let path = urlencoding::decode(url.path())
            .map_err(|e| CrlError::transport(uri, e))?
            .into_owned();
        let user = match url.username() {
            "" => "anonymous".to_string(),
            user => urlencoding::decode(user)
                .map_err(|e| CrlError::transport(uri, e))?
                .into_owned(),
        };
        let password = match url.password() {
            None => "anonymous".to_string(),
            Some(password) => urlencoding::decode(password)
                .map_err(|e| CrlError::transport(uri, e))?
                .into_owned(),
        };

        Ok(Self {
            host,
            port: url.port().unwrap_or(DEFAULT_FTP_PORT),
            user,
            password,
            path,
        })
    }

    fn retrieve(self, request_timeout: Duration, max_crl_size: usize) -> Result<Vec<u8>, String> {
        use std::io::Read;
        use std::net::ToSocketAddrs;

        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| e.to_string())?
            .next()
            .ok_or_else(|| format!("could not resolve {}", self.host))?;

        let mut ftp = FtpStream::connect_timeout(addr, request_timeout).map_err(|e| e.to_string())?;
        ftp.login(&self.user, &self.password)
            .map_err(|e| e.to_string())?;
        ftp.transfer_type(FileType::Binary)
            .map_err(|e| e.to_string())?;
        let data = ftp
            .retr(&self.path, |stream| {
                let mut data = Vec::new();
                stream
                    .take(max_crl_size as u64 + 1)
                    .read_to_end(&mut data)
                    .map_err(FtpError::ConnectionError)?;
                Ok(data)
            })
            .map_err(|e| e.to_string())?;
        if let Err(e) = ftp.quit() {
            debug!("FTP quit failed: {e}");
        }
        if data.len() > max_crl_size {
            return Err(format!("CRL exceeds the limit of {max_crl_size} bytes"));
        }
        Ok(data)
    }
}

/// Default directory transport backed by ldap3
#[derive(Debug, Clone)]
pub struct LdapDirectory {
    timeout: Duration,
}

impl LdapDirectory {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            timeout: request_timeout,
        }
    }
}

#[async_trait]
impl DirectoryTransport for LdapDirectory {
    async fn fetch_attribute(
        &self,
        endpoint: &CrlEndpoint,
        attribute: &str,
    ) -> CrlResult<Option<Vec<u8>>> {
        let uri = endpoint.uri.as_str();
        let target = LdapTarget::parse(uri)?;
        debug!(
            "Reading {attribute} of '{}' from {}",
            target.base_dn, target.server
        );

        let settings = LdapConnSettings::new().set_conn_timeout(self.timeout);
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &target.server)
            .await
            .map_err(|e| CrlError::transport(uri, e))?;
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!("LDAP connection error: {e}");
            }
        });

        let (entries, _) = ldap
            .with_timeout(self.timeout)
            .search(
                &target.base_dn,
                Scope::Base,
                "(objectClass=*)",
                vec![attribute],
            )
            .await
            .map_err(|e| CrlError::transport(uri, e))?
            .success()
            .map_err(|e| CrlError::transport(uri, e))?;

        if let Err(e) = ldap.unbind().await {
            debug!("LDAP unbind failed: {e}");
        }

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .find_map(|entry| take_attribute(entry, attribute)))
    }
}

/// First value of `attribute`, matched case-insensitively
fn take_attribute(entry: SearchEntry, attribute: &str) -> Option<Vec<u8>> {
    let SearchEntry {
        attrs, bin_attrs, ..
    } = entry;

    bin_attrs
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
        .and_then(|(_, values)| values.into_iter().next())
        .or_else(|| {
            attrs
                .into_iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
                .and_then(|(_, values)| values.into_iter().next())
                .map(String::into_bytes)
        })
}

/// Server and entry addressed by an ldap:// URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LdapTarget {
    server: String,
    base_dn: String,
}

impl LdapTarget {
    pub(crate) fn parse(uri: &str) -> CrlResult<Self> {
        let url = Url::parse(uri).map_err(|e| CrlError::transport(uri, e))?;
        let host = url
            .host_str()
            .ok_or_else(|| CrlError::transport(uri, "missing host"))?;
        let port = url.port().unwrap_or(DEFAULT_LDAP_PORT);
        let base_dn = urlencoding::decode(url.path().trim_start_matches('/'))
            .map_err(|e| CrlError::transport(uri, e))?
            .into_owned();

        Ok(Self {
            server: format!("ldap://{host}:{port}"),
            base_dn,
        })
    }
}

fn too_large(uri: &str, size: u64, limit: usize) -> CrlError {
    CrlError::transport(
        uri,
        format!("CRL of {size} bytes exceeds the limit of {limit} bytes"),
    )
}

/// Retrieves and decodes CRLs, dispatching on the endpoint's scheme
#[derive(Clone)]
pub struct CrlFetcher {
    web: Arc<dyn WebTransport>,
    directory: Arc<dyn DirectoryTransport>,
    ldap_attribute: String,
    max_crl_size: usize,
}

impl CrlFetcher {
    /// Fetcher with the network transports
    pub fn new(config: &CrlConfig) -> CrlResult<Self> {
        let request_timeout = config.fetch_timeout();
        Ok(Self::with_transports(
            config,
            Arc::new(WebClient::new(request_timeout, config.max_crl_size)?),
            Arc::new(LdapDirectory::new(request_timeout)),
        ))
    }

    /// Fetcher with caller-supplied transports
    pub fn with_transports(
        config: &CrlConfig,
        web: Arc<dyn WebTransport>,
        directory: Arc<dyn DirectoryTransport>,
    ) -> Self {
        Self {
            web,
            directory,
            ldap_attribute: config.ldap_attribute.clone(),
            max_crl_size: config.max_crl_size,
        }
    }

    /// Fetch a CRL from a distribution point
    pub async fn fetch(&self, endpoint: &CrlEndpoint) -> CrlResult<CrlData> {
        let Some(scheme) = endpoint.scheme else {
            return Err(CrlError::UnsupportedScheme(endpoint.uri.clone()));
        };

        info!("Fetching CRL from: {}", endpoint);

        let bytes = match scheme.family() {
            TransportFamily::Web => self.web.open_stream(endpoint).await?,
            TransportFamily::Directory => {
                match self
                    .directory
                    .fetch_attribute(endpoint, &self.ldap_attribute)
                    .await?
                {
                    Some(bytes) if !bytes.is_empty() => bytes,
                    _ => {
                        return Err(CrlError::transport(
                            &endpoint.uri,
                            format!("attribute {} is missing or empty", self.ldap_attribute),
                        ));
                    }
                }
            }
        };

        if bytes.len() > self.max_crl_size {
            return Err(too_large(&endpoint.uri, bytes.len() as u64, self.max_crl_size));
        }

        let crl = CrlData::from_bytes(bytes, &endpoint.uri)?;
        debug!("Fetched CRL issued by {} from {}", crl.issuer, endpoint);
        Ok(crl)
    }
}
