use std::{collections::HashMap, time::Duration};

use config::{Config as ConfigLib, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Name of the directory attribute that carries a binary CRL
pub const DEFAULT_LDAP_ATTRIBUTE: &str = "certificateRevocationList;binary";

/// Default maximum CRL size (10 MB)
pub const DEFAULT_MAX_CRL_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crl: CrlConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrlConfig {
    /// Timeout applied to every HTTP, FTP and LDAP fetch
    pub fetch_timeout_secs: u64,
    /// Fetched CRLs larger than this are rejected
    pub max_crl_size: usize,
    /// Directory attribute read from ldap:// distribution points
    pub ldap_attribute: String,
    /// Try the next distribution point when one cannot be fetched or decoded.
    ///
    /// Off by default: the distribution point names of a certificate are
    /// alternative locations of one CRL, so the first answer is final.
    pub advance_on_endpoint_failure: bool,
}

impl Default for CrlConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 30,
            max_crl_size: DEFAULT_MAX_CRL_SIZE,
            ldap_attribute: DEFAULT_LDAP_ATTRIBUTE.to_string(),
            advance_on_endpoint_failure: false,
        }
    }
}

impl CrlConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let defaults = CrlConfig::default();
        let mut builder = ConfigLib::builder()
            .set_default("crl.fetch_timeout_secs", defaults.fetch_timeout_secs)?
            .set_default("crl.max_crl_size", defaults.max_crl_size as u64)?
            .set_default("crl.ldap_attribute", defaults.ldap_attribute)?
            .set_default(
                "crl.advance_on_endpoint_failure",
                defaults.advance_on_endpoint_failure,
            )?
            .add_source(File::with_name("config/settings").required(false));

        // If env_vars is provided, we use it instead of system environment
        // This is to avoid systems variables pollution across tests
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // Should be in the format APP_CRL__FETCH_TIMEOUT_SECS
            builder = builder.add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        builder.build()?.try_deserialize()
    }
}
