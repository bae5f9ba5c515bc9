use colored::Colorize;
use thiserror::Error;

use crate::{
    client::ContractClient,
    config::Credentials,
    contracts::{ContractArtifact, DeployedContract, MichelsonMap},
    progress::{with_progress, Progress},
    signer::InMemorySigner,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployState {
    Configuring,
    Submitting,
    Confirming { tentative_address: String },
    Done { address: String },
    Failed,
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("{0:#}")]
    Artifact(anyhow::Error),
    #[error("{0:#}")]
    Signing(anyhow::Error),
    #[error("{0:#}")]
    Submission(anyhow::Error),
    #[error("{0:#}")]
    Confirmation(anyhow::Error),
}

impl DeployError {
    pub const EXIT_CODE: i32 = 1;
}

pub struct Deploy<'a, F, P: ?Sized> {
    connect: F,
    progress: &'a P,
    state: DeployState,
}

impl<'a, F, C, P> Deploy<'a, F, P>
where
    F: Fn(&str, InMemorySigner) -> anyhow::Result<C>,
    C: ContractClient,
    P: Progress + ?Sized,
{
    pub fn new(connect: F, progress: &'a P) -> Self {
        Self {
            connect,
            progress,
            state: DeployState::Configuring,
        }
    }

    pub fn state(&self) -> &DeployState {
        &self.state
    }

    pub async fn run(
        &mut self,
        credentials: &Credentials,
        artifact: &ContractArtifact,
    ) -> Result<DeployedContract, DeployError> {
        match self.originate(credentials, artifact).await {
            Ok(contract) => {
                self.transition(DeployState::Done {
                    address: contract.address.clone(),
                });
                Ok(contract)
            }
            Err(e) => {
                self.transition(DeployState::Failed);
                Err(e)
            }
        }
    }

    async fn originate(
        &mut self,
        credentials: &Credentials,
        artifact: &ContractArtifact,
    ) -> Result<DeployedContract, DeployError> {
        self.transition(DeployState::Configuring);
        let signer = InMemorySigner::from_secret_key(credentials.secret_key())
            .map_err(DeployError::Signing)?;
        log::info!("deploying from {}", signer.public_key_hash());
        let client =
            (self.connect)(credentials.rpc_url(), signer).map_err(DeployError::Submission)?;
        let storage = MichelsonMap::new();

        self.transition(DeployState::Submitting);
        let origination = with_progress(
            self.progress,
            client.originate(artifact, &storage),
            &"Deploying contract".bright_yellow().to_string(),
            &"Contract deployed!".green().to_string(),
        )
        .await
        .map_err(DeployError::Submission)?;

        self.transition(DeployState::Confirming {
            tentative_address: origination.contract_address.clone(),
        });
        let contract = with_progress(
            self.progress,
            client.confirm(&origination),
            &confirming_message(&origination.contract_address),
            &"Contract confirmed!".green().to_string(),
        )
        .await
        .map_err(DeployError::Confirmation)?;

        log::info!(
            "contract {} confirmed in block {} at level {}",
            contract.address,
            contract.block_hash,
            contract.level
        );
        Ok(contract)
    }

    fn transition(&mut self, state: DeployState) {
        log::debug!("deploy state:{:?} -> {:?}", self.state, state);
        self.state = state;
    }
}

fn confirming_message(address: &str) -> String {
    format!(
        "{}{}",
        "Waiting for contract to be confirmed at: ".bright_yellow(),
        address.yellow().bold()
    )
}

pub fn success_report(contract: &DeployedContract) -> String {
    format!(
        "{}{}",
        "\nContract address: \n- ".green(),
        contract.address.green().underline()
    )
}

pub fn failure_report(error: &DeployError) -> String {
    format!("\n{}\n{}", "Error during deployment:".bright_red(), error)
}
