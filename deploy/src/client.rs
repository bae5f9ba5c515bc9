use anyhow::Result;
use async_trait::async_trait;

use crate::contracts::{ContractArtifact, DeployedContract, MichelsonMap, Origination};

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait ContractClient: Send + Sync {
    async fn originate(
        &self,
        code: &ContractArtifact,
        storage: &MichelsonMap,
    ) -> Result<Origination>;

    async fn confirm(&self, origination: &Origination) -> Result<DeployedContract>;
}
