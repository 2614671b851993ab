use std::fs::File;
use std::io::BufReader;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;

use keystone_auth::authn::keystone::KeystoneAuthenticator;
use keystone_auth::authn::AuthnResponse;
use keystone_auth::config::{expandenv, KeystoneConfig};

use super::{GlobalArgs, RunCommand};

/// Check an `Authorization` header value against keystone.
#[derive(Args)]
pub struct AuthenticateArgs {
    /// Value of the `Authorization` header, e.g. "Basic dXNlcjpwYXNz".
    #[arg(long)]
    pub header: String,

    /// Identity endpoint to check against. Default is the `auth-url` of the config file.
    #[arg(long)]
    pub auth_url: Option<String>,
}

impl AuthenticateArgs {
    fn get_auth_url(&self, global: &GlobalArgs) -> Result<String> {
        if let Some(ref url) = self.auth_url {
            return Ok(url.clone());
        }

        // Only the url is needed here, the service credentials are not validated
        let path = global.require_config()?;
        let file = File::open(path)
            .with_context(|| format!("open keystone config file: {}", path.display()))?;
        let cfg = KeystoneConfig::read(BufReader::new(file))?;
        expandenv("auth-url", &cfg.auth_url)
    }
}

#[async_trait]
impl RunCommand for AuthenticateArgs {
    async fn run(&self, global: &GlobalArgs) -> Result<()> {
        let auth_url = self.get_auth_url(global)?;
        let authenticator = KeystoneAuthenticator::new(&auth_url)?;

        match authenticator.authenticate_header(Some(self.header.as_str())).await {
            Ok(AuthnResponse::Ok(user)) => println!("authenticated: {}", user.name),
            Ok(AuthnResponse::Unauthenticated) => println!("unauthenticated"),
            Err(e) => println!("error: {e}"),
        }
        Ok(())
    }
}
