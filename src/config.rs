use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{bail, Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Connection settings for the Keystone identity service.
///
/// Read from a JSON document with kebab-case keys, for example:
///
/// ```json
/// {
///   "auth-url": "https://keystone.example.com/v2.0",
///   "user-name": "kube-admin",
///   "password": "${KEYSTONE_PASSWORD}",
///   "tenant-id": "31213d3bc3144cfaacb60f040206baae"
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct KeystoneConfig {
    /// Identity endpoint, e.g. `https://keystone:5000/v2.0`. Required.
    #[serde(default)]
    pub auth_url: String,

    /// Service user name. Either this or `user-id` is required.
    #[serde(default)]
    pub user_name: String,

    #[serde(default)]
    pub user_id: String,

    #[serde(default)]
    pub password: String,

    /// Rackspace-style API key, used when `password` is empty.
    #[serde(default)]
    pub api_key: String,

    /// Tenant to scope the service token to. The identity admin calls (listing users
    /// and tenants, reading role assignments) need an admin-scoped token.
    #[serde(default)]
    pub tenant_id: String,

    #[serde(default)]
    pub tenant_name: String,

    /// Region of the identity endpoint. Kept for compatibility with cloud provider
    /// configs, the v2 identity calls do not use it.
    #[serde(default)]
    pub region: String,
}

impl KeystoneConfig {
    /// Parses a config from a JSON reader without validating it.
    pub fn read<R: Read>(reader: R) -> Result<Self> {
        serde_json::from_reader(reader).context("parse keystone config json")
    }

    /// Reads, expands and validates the config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("open keystone config file: {}", path.display()))?;
        let mut cfg = Self::read(BufReader::new(file))?;
        cfg.complete().context("validate keystone config")?;
        Ok(cfg)
    }

    /// Expands environment references in every field and checks that the client can
    /// be built from the result.
    pub fn complete(&mut self) -> Result<()> {
        self.auth_url = expandenv("auth-url", &self.auth_url)?;
        if self.auth_url.is_empty() {
            bail!("auth-url cannot be empty");
        }
        check_auth_url(&self.auth_url)?;

        self.user_name = expandenv("user-name", &self.user_name)?;
        self.user_id = expandenv("user-id", &self.user_id)?;
        if self.user_name.is_empty() && self.user_id.is_empty() {
            bail!("one of user-name or user-id is required");
        }

        self.password = expandenv("password", &self.password)?;
        self.api_key = expandenv("api-key", &self.api_key)?;
        if self.password.is_empty() && self.api_key.is_empty() {
            bail!("one of password or api-key is required");
        }

        self.tenant_id = expandenv("tenant-id", &self.tenant_id)?;
        self.tenant_name = expandenv("tenant-name", &self.tenant_name)?;
        self.region = expandenv("region", &self.region)?;

        Ok(())
    }
}

pub fn check_auth_url(url: &str) -> Result<Url> {
    let parsed = match Url::parse(url) {
        Ok(url) => url,
        Err(_) => bail!("invalid auth url '{url}'"),
    };

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => bail!("invalid auth url scheme, expect 'http' or 'https', not '{scheme}'"),
    }
}

/// See: [`shellexpand::full`].
pub fn expandenv(name: &str, s: impl AsRef<str>) -> Result<String> {
    let s =
        shellexpand::full(s.as_ref()).with_context(|| format!("expand env value for '{name}'"))?;
    Ok(s.to_string())
}
