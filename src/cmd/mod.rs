mod authenticate;
mod authorize;

use std::path::PathBuf;

use anyhow::{bail, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about)]
pub struct App {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Path of the keystone config json file.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Log level, one of "error", "warn", "info", "debug" or "trace".
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

impl GlobalArgs {
    pub fn require_config(&self) -> Result<&PathBuf> {
        match self.config {
            Some(ref path) => Ok(path),
            None => bail!("missing keystone config file, please provide it with `--config`"),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    Authorize(authorize::AuthorizeArgs),
    Authenticate(authenticate::AuthenticateArgs),
}

#[async_trait]
pub trait RunCommand {
    async fn run(&self, global: &GlobalArgs) -> Result<()>;
}

impl App {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Authorize(args) => args.run(&self.global).await,
            Commands::Authenticate(args) => args.run(&self.global).await,
        }
    }
}
