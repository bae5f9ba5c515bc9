use std::{env, path::PathBuf, process};

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use crate::{
    config::{ConfigError, Credentials},
    contracts::ContractArtifact,
    deploy::{failure_report, success_report, Deploy, DeployError},
    progress::stdout_progress,
    rpc::RpcClient,
};

/// Originates a compiled Michelson contract and prints its address.
#[derive(Debug, Parser)]
pub struct CommandLine {
    /// Compiled contract in Micheline JSON
    #[clap(short, long, default_value = "build/contract.json")]
    artifact: PathBuf,

    /// File holding the PK and RPC_URL variables
    #[clap(short, long, default_value = "deploy/.env")]
    env_file: PathBuf,
}

impl CommandLine {
    pub async fn execute(self) -> Result<()> {
        let location = self.env_file.display().to_string();
        match dotenvy::from_path(&self.env_file) {
            Ok(()) => {}
            Err(e) if e.not_found() => log::debug!("env file {} not found", location),
            Err(e) => {
                log::warn!("env file {} not loaded: {}", location, e);
                println!("{}", env_file_warning(&location, &e));
            }
        }

        let credentials = match Credentials::from_env(|name| env::var(name).ok(), &location) {
            Ok(credentials) => credentials,
            Err(e) => {
                println!("{}", e.diagnostic());
                process::exit(ConfigError::EXIT_CODE);
            }
        };

        let progress = stdout_progress();
        let result = match ContractArtifact::from_file(&self.artifact) {
            Ok(artifact) => {
                Deploy::new(RpcClient::new, &*progress)
                    .run(&credentials, &artifact)
                    .await
            }
            Err(e) => Err(DeployError::Artifact(e)),
        };

        match result {
            Ok(contract) => {
                println!("{}", success_report(&contract));
                Ok(())
            }
            Err(e) => {
                println!("{}", failure_report(&e));
                process::exit(DeployError::EXIT_CODE);
            }
        }
    }
}

fn env_file_warning(location: &str, error: &dotenvy::Error) -> String {
    format!(
        "{}{}{}",
        "Couldn't read env file ".yellow(),
        location.yellow().bold(),
        format!(": {}", error).yellow()
    )
}
