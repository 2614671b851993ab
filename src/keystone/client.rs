use std::collections::HashSet;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::authn::{PasswordAuthenticator, UserInfo};
use crate::config::{check_auth_url, KeystoneConfig};

use super::{IdentityProvider, RoleChecker, Tenant, User};

const HEADER_AUTH_TOKEN: &str = "X-Auth-Token";

/// Client for the Keystone v2.0 identity API.
///
/// A client built with [`KeystoneClient::connect`] holds service credentials and
/// implements the directory and role calls. A client built with
/// [`KeystoneClient::for_auth_url`] can only check user passwords.
pub struct KeystoneClient {
    url: String,

    client: reqwest::Client,

    service: Option<KeystoneConfig>,
    token: RwLock<Option<String>>,
}

impl KeystoneClient {
    const REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Builds a client for the service account in `cfg` and authenticates it once.
    /// Failing to authenticate here is fatal for the caller.
    pub async fn connect(cfg: KeystoneConfig) -> Result<Self> {
        let url = cfg.auth_url.clone();
        let client = Self::build(&url, Some(cfg))?;
        client
            .reauthenticate()
            .await
            .context("authenticate keystone service user")?;
        info!("Authenticated to keystone at {}", client.url);
        Ok(client)
    }

    /// Builds a client that only checks user passwords against `auth_url`.
    pub fn for_auth_url(auth_url: &str) -> Result<Self> {
        Self::build(auth_url, None)
    }

    fn build(auth_url: &str, service: Option<KeystoneConfig>) -> Result<Self> {
        check_auth_url(auth_url)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(Self::REQUEST_TIMEOUT_SECS))
            .build()
            .context("build keystone http client")?;
        Ok(Self {
            url: auth_url.trim_end_matches('/').to_string(),
            client,
            service,
            token: RwLock::new(None),
        })
    }

    /// Issues a token for `auth`. `Ok(None)` means keystone rejected the credentials.
    async fn issue_token(&self, auth: TokenRequest<'_>) -> Result<Option<String>> {
        let url = format!("{}/tokens", self.url);
        debug!("Request keystone token: {url}");
        let resp = self
            .client
            .post(&url)
            .json(&auth)
            .send()
            .await
            .context("send keystone token request")?;

        match resp.status() {
            StatusCode::UNAUTHORIZED => return Ok(None),
            status if !status.is_success() => {
                let text = resp.text().await.unwrap_or_default();
                bail!("keystone token request failed: {status}, {text}");
            }
            _ => {}
        }

        let token: TokenResponse = resp.json().await.context("parse keystone token response")?;
        if token.access.token.id.is_empty() {
            bail!("empty token id in keystone response");
        }
        Ok(Some(token.access.token.id))
    }

    async fn reauthenticate(&self) -> Result<String> {
        let cfg = match self.service {
            Some(ref cfg) => cfg,
            None => bail!("keystone client has no service credentials"),
        };

        let token = match self.issue_token(TokenRequest::service(cfg)).await? {
            Some(token) => token,
            None => bail!("keystone rejected the service credentials"),
        };
        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    async fn current_token(&self) -> Result<String> {
        if let Some(ref token) = *self.token.read().await {
            return Ok(token.clone());
        }
        self.reauthenticate().await
    }

    /// Sends an authenticated GET, re-authenticating once if the token was revoked or
    /// expired.
    async fn get_json<T>(&self, url: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let token = self.current_token().await?;
        let mut resp = self.send_get(url, &token).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            info!("Keystone token rejected, reauthenticating");
            let token = self.reauthenticate().await?;
            resp = self.send_get(url, &token).await?;
        }

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("keystone request '{url}' failed: {status}, {text}");
        }
        resp.json().await.context("parse keystone json response")
    }

    async fn send_get(&self, url: &str, token: &str) -> Result<reqwest::Response> {
        debug!("Request keystone: {url}");
        self.client
            .request(Method::GET, url)
            .header(HEADER_AUTH_TOKEN, token)
            .send()
            .await
            .with_context(|| format!("send keystone request '{url}'"))
    }
}

#[async_trait]
impl IdentityProvider for KeystoneClient {
    async fn list_users(&self) -> Result<Vec<User>> {
        let url = format!("{}/users", self.url);
        let page: UsersPage = self.get_json(&url).await?;
        Ok(page.users)
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let mut url = format!("{}/tenants", self.url);
        let mut tenants = Vec::new();
        let mut visited = HashSet::new();
        loop {
            let page: TenantsPage = self.get_json(&url).await?;
            tenants.extend(page.tenants);
            visited.insert(url);
            match next_page(&page.tenants_links, &visited) {
                Some(next) => url = next,
                None => break,
            }
        }
        Ok(tenants)
    }
}

#[async_trait]
impl RoleChecker for KeystoneClient {
    async fn check_role(&self, user_id: &str, tenant_id: &str) -> Result<bool> {
        if user_id.is_empty() {
            bail!("user id is empty");
        }
        if tenant_id.is_empty() {
            bail!("tenant id is empty");
        }

        let url = format!("{}/tenants/{tenant_id}/users/{user_id}/roles", self.url);
        let page: RolesPage = self.get_json(&url).await?;
        Ok(!page.roles.is_empty())
    }
}

#[async_trait]
impl PasswordAuthenticator for KeystoneClient {
    async fn authenticate_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<UserInfo>> {
        if username.is_empty() || password.is_empty() {
            return Ok(None);
        }

        let token = self
            .issue_token(TokenRequest::password(username, password))
            .await?;
        Ok(token.map(|_| UserInfo {
            name: username.to_string(),
        }))
    }
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    auth: TokenAuth<'a>,
}

#[derive(Debug, Serialize)]
struct TokenAuth<'a> {
    #[serde(rename = "passwordCredentials", skip_serializing_if = "Option::is_none")]
    password_credentials: Option<PasswordCredentials<'a>>,

    #[serde(
        rename = "RAX-KSKEY:apiKeyCredentials",
        skip_serializing_if = "Option::is_none"
    )]
    api_key_credentials: Option<ApiKeyCredentials<'a>>,

    #[serde(rename = "tenantId", skip_serializing_if = "Option::is_none")]
    tenant_id: Option<&'a str>,

    #[serde(rename = "tenantName", skip_serializing_if = "Option::is_none")]
    tenant_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct PasswordCredentials<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,

    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,

    password: &'a str,
}

#[derive(Debug, Serialize)]
struct ApiKeyCredentials<'a> {
    username: &'a str,

    #[serde(rename = "apiKey")]
    api_key: &'a str,
}

impl<'a> TokenRequest<'a> {
    fn password(username: &'a str, password: &'a str) -> Self {
        Self {
            auth: TokenAuth {
                password_credentials: Some(PasswordCredentials {
                    username: Some(username),
                    user_id: None,
                    password,
                }),
                api_key_credentials: None,
                tenant_id: None,
                tenant_name: None,
            },
        }
    }

    fn service(cfg: &'a KeystoneConfig) -> Self {
        let (password_credentials, api_key_credentials) = if cfg.password.is_empty() {
            let creds = ApiKeyCredentials {
                username: &cfg.user_name,
                api_key: &cfg.api_key,
            };
            (None, Some(creds))
        } else {
            let creds = PasswordCredentials {
                username: non_empty(&cfg.user_name),
                user_id: non_empty(&cfg.user_id),
                password: &cfg.password,
            };
            (Some(creds), None)
        };

        Self {
            auth: TokenAuth {
                password_credentials,
                api_key_credentials,
                tenant_id: non_empty(&cfg.tenant_id),
                tenant_name: non_empty(&cfg.tenant_name),
            },
        }
    }
}

/// Href of the `next` link, unless that page was already fetched.
fn next_page(links: &[Link], visited: &HashSet<String>) -> Option<String> {
    links
        .iter()
        .find(|link| link.rel == "next")
        .filter(|link| !visited.contains(&link.href))
        .map(|link| link.href.clone())
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access: TokenAccess,
}

#[derive(Debug, Deserialize)]
struct TokenAccess {
    token: TokenInfo,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct UsersPage {
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Debug, Deserialize)]
struct TenantsPage {
    #[serde(default)]
    tenants: Vec<Tenant>,

    #[serde(default)]
    tenants_links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,

    #[serde(default)]
    rel: String,
}

#[derive(Debug, Deserialize)]
struct RolesPage {
    #[serde(default)]
    roles: Vec<serde_json::Value>,
}
