use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use log::info;

use keystone_auth::authz::keystone::refresh::RefreshOptions;
use keystone_auth::authz::keystone::KeystoneAuthorizer;
use keystone_auth::authz::union::UnionAuthorizer;
use keystone_auth::authz::{Attributes, Authorizer};

use super::{GlobalArgs, RunCommand};

/// Check whether a user may access a namespace, using the live keystone service.
#[derive(Args)]
pub struct AuthorizeArgs {
    /// Name of the user to check.
    #[arg(long, short)]
    pub user: String,

    /// Namespace to check, same as the keystone tenant name.
    #[arg(long, short)]
    pub namespace: String,

    /// Interval of the background user and tenant refresh.
    #[arg(long, default_value = "60s", value_parser = humantime::parse_duration)]
    pub period: Duration,

    /// Timeout of one refresh call.
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
    pub timeout: Duration,
}

#[async_trait]
impl RunCommand for AuthorizeArgs {
    async fn run(&self, global: &GlobalArgs) -> Result<()> {
        let path = global.require_config()?;
        let opts = RefreshOptions {
            period: self.period,
            timeout: self.timeout,
        };

        let keystone = KeystoneAuthorizer::from_config_file(path, opts).await?;
        let authorizer = UnionAuthorizer::new(vec![Box::new(keystone)]);

        let attrs = Attributes::new(self.user.as_str(), self.namespace.as_str());
        info!(
            "Authorizing user '{}' for namespace '{}'",
            attrs.user, attrs.namespace
        );
        match authorizer.authorize(&attrs).await {
            Ok(()) => println!("allowed"),
            Err(e) => println!("denied: {e}"),
        }
        Ok(())
    }
}
