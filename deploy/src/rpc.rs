use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use serde_with::{serde_as, DisplayFromStr};
use tokio::time::{sleep, Instant};
use url::Url;

use crate::{
    client::ContractClient,
    contracts::{ContractArtifact, DeployedContract, MichelsonMap, Origination},
    signer::InMemorySigner,
    utils::{b58_decode, b58_encode, prefix, GENERIC_OPERATION_WATERMARK},
};

const MINIMAL_FEE_MUTEZ: u64 = 100;
const MINIMAL_NANOTEZ_PER_GAS_UNIT: u64 = 100;
const MINIMAL_MUTEZ_PER_BYTE: u64 = 1;
const SIGNATURE_SIZE: u64 = 64;
// fee fields grow once they are filled in
const SIZE_MARGIN: u64 = 10;

const GAS_BUFFER: u64 = 100;
const STORAGE_BUFFER: u64 = 20;
const ORIGINATION_SIZE: u64 = 257;
const REVEAL_GAS_LIMIT: u64 = 1000;

const MANAGER_OPERATIONS_PASS: usize = 3;
const CONFIRMATIONS: i64 = 1;
const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug)]
pub struct RpcClient {
    http: reqwest::Client,
    endpoint: Url,
    signer: InMemorySigner,
}

#[derive(Debug, Clone, Deserialize)]
struct BlockHeader {
    hash: String,
    level: i64,
    protocol: String,
    chain_id: String,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
struct Constants {
    #[serde_as(as = "DisplayFromStr")]
    hard_gas_limit_per_operation: u64,
    #[serde_as(as = "DisplayFromStr")]
    hard_storage_limit_per_operation: u64,
    #[serde_as(as = "Option<DisplayFromStr>")]
    minimal_block_delay: Option<u64>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
struct ManagerOperation {
    #[serde(flatten)]
    kind: OperationKind,
    source: String,
    #[serde_as(as = "DisplayFromStr")]
    fee: u64,
    #[serde_as(as = "DisplayFromStr")]
    counter: u64,
    #[serde_as(as = "DisplayFromStr")]
    gas_limit: u64,
    #[serde_as(as = "DisplayFromStr")]
    storage_limit: u64,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum OperationKind {
    Reveal {
        public_key: String,
    },
    Origination {
        #[serde_as(as = "DisplayFromStr")]
        balance: u64,
        script: Value,
    },
}

#[derive(Debug, Deserialize)]
struct OperationWithMetadata {
    contents: Vec<ContentResult>,
}

#[derive(Debug, Deserialize)]
struct ContentResult {
    kind: String,
    metadata: ContentMetadata,
}

#[derive(Debug, Deserialize)]
struct ContentMetadata {
    operation_result: OperationResult,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct OperationResult {
    status: String,
    #[serde_as(as = "Option<DisplayFromStr>")]
    consumed_milligas: Option<u64>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    paid_storage_size_diff: Option<u64>,
    #[serde(default)]
    originated_contracts: Vec<String>,
    #[serde(default)]
    errors: Vec<Value>,
}

impl ManagerOperation {
    fn reveal(source: &str, counter: u64, public_key: String) -> Self {
        Self {
            kind: OperationKind::Reveal { public_key },
            source: source.to_string(),
            fee: 0,
            counter,
            gas_limit: REVEAL_GAS_LIMIT,
            storage_limit: 0,
        }
    }

    fn origination(source: &str, counter: u64, script: Value, constants: &Constants) -> Self {
        Self {
            kind: OperationKind::Origination { balance: 0, script },
            source: source.to_string(),
            fee: 0,
            counter,
            gas_limit: constants.hard_gas_limit_per_operation,
            storage_limit: constants.hard_storage_limit_per_operation,
        }
    }
}

impl RpcClient {
    pub fn new(endpoint: &str, signer: InMemorySigner) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint: normalize_endpoint(endpoint)?,
            signer,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.endpoint
            .join(path)
            .with_context(|| format!("invalid RPC path {}", path))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        log::debug!("GET {}", url);
        self.send(self.http.get(url), path).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.url(path)?;
        log::debug!("POST {}", url);
        self.send(self.http.post(url).json(body), path).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, path: &str) -> Result<T> {
        let response = request
            .send()
            .await
            .with_context(|| format!("RPC request {} failed", path))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("RPC {} returned {}: {}", path, status, body);
        }
        response
            .json()
            .await
            .with_context(|| format!("invalid response from RPC {}", path))
    }

    async fn head(&self) -> Result<BlockHeader> {
        self.get("chains/main/blocks/head/header").await
    }

    async fn constants(&self) -> Result<Constants> {
        self.get("chains/main/blocks/head/context/constants").await
    }

    async fn counter(&self, source: &str) -> Result<u64> {
        let counter: String = self
            .get(&format!(
                "chains/main/blocks/head/context/contracts/{}/counter",
                source
            ))
            .await?;
        counter
            .parse()
            .with_context(|| format!("invalid counter {}", counter))
    }

    async fn is_revealed(&self, source: &str) -> Result<bool> {
        let key: Option<String> = self
            .get(&format!(
                "chains/main/blocks/head/context/contracts/{}/manager_key",
                source
            ))
            .await?;
        Ok(key.is_some())
    }

    async fn simulate(
        &self,
        header: &BlockHeader,
        contents: &[ManagerOperation],
    ) -> Result<Vec<ContentResult>> {
        let body = json!({
            "operation": {
                "branch": header.hash,
                "contents": contents,
                "signature": b58_encode(prefix::ED25519_SIGNATURE, &[0u8; 64]),
            },
            "chain_id": header.chain_id,
        });
        let result: OperationWithMetadata = self
            .post("chains/main/blocks/head/helpers/scripts/run_operation", &body)
            .await?;
        Ok(result.contents)
    }

    async fn forge(&self, branch: &str, contents: &[ManagerOperation]) -> Result<Vec<u8>> {
        let forged: String = self
            .post(
                "chains/main/blocks/head/helpers/forge/operations",
                &json!({ "branch": branch, "contents": contents }),
            )
            .await?;
        Ok(hex::decode(forged)?)
    }

    async fn preapply(
        &self,
        header: &BlockHeader,
        contents: &[ManagerOperation],
        signature: &str,
    ) -> Result<Vec<ContentResult>> {
        let body = json!([{
            "protocol": header.protocol,
            "branch": header.hash,
            "contents": contents,
            "signature": signature,
        }]);
        let mut result: Vec<OperationWithMetadata> = self
            .post("chains/main/blocks/head/helpers/preapply/operations", &body)
            .await?;
        result
            .pop()
            .map(|op| op.contents)
            .ok_or(anyhow!("empty preapply response"))
    }

    async fn included_in(&self, level: i64, hash: &str) -> Result<bool> {
        let hashes: Vec<String> = self
            .get(&format!(
                "chains/main/blocks/{}/operation_hashes/{}",
                level, MANAGER_OPERATIONS_PASS
            ))
            .await?;
        Ok(hashes.iter().any(|h| h == hash))
    }
}

#[async_trait]
impl ContractClient for RpcClient {
    async fn originate(
        &self,
        code: &ContractArtifact,
        storage: &MichelsonMap,
    ) -> Result<Origination> {
        let source = self.signer.public_key_hash();
        let header = self.head().await?;
        let constants = self.constants().await?;
        let mut counter = self.counter(&source).await?;

        let mut contents = Vec::new();
        if !self.is_revealed(&source).await? {
            log::info!("revealing public key of {}", source);
            counter += 1;
            contents.push(ManagerOperation::reveal(
                &source,
                counter,
                self.signer.public_key(),
            ));
        }
        counter += 1;
        let script = json!({ "code": code.code, "storage": storage.to_micheline() });
        contents.push(ManagerOperation::origination(
            &source, counter, script, &constants,
        ));

        let simulated = self.simulate(&header, &contents).await?;
        check_applied(&simulated)?;
        apply_estimates(&mut contents, &simulated)?;

        let forged = self.forge(&header.hash, &contents).await?;
        apply_fees(&mut contents, forged.len() as u64);
        log::debug!("operation contents:{:?}", contents);

        let forged = self.forge(&header.hash, &contents).await?;
        let signature = self.signer.sign(&forged, GENERIC_OPERATION_WATERMARK)?;

        let applied = self
            .preapply(&header, &contents, &signature.prefixed)
            .await?;
        check_applied(&applied)?;
        let contract_address = originated_address(&applied)?;

        let signed = hex::encode([&forged[..], &signature.bytes[..]].concat());
        let hash: String = self.post("injection/operation", &signed).await?;
        log::info!("operation hash:{}", hash);

        Ok(Origination {
            hash,
            contract_address,
            branch_level: header.level,
        })
    }

    async fn confirm(&self, origination: &Origination) -> Result<DeployedContract> {
        let deadline = Instant::now() + CONFIRMATION_TIMEOUT;
        let interval = poll_interval(self.constants().await?.minimal_block_delay);

        let mut next_level = origination.branch_level + 1;
        let mut included: Option<BlockHeader> = None;
        loop {
            let head = self.head().await?;
            while included.is_none() && next_level <= head.level {
                if self.included_in(next_level, &origination.hash).await? {
                    log::info!("operation {} included at level {}", origination.hash, next_level);
                    included = Some(
                        self.get(&format!("chains/main/blocks/{}/header", next_level))
                            .await?,
                    );
                }
                next_level += 1;
            }

            if let Some(block) = &included {
                if head.level - block.level + 1 >= CONFIRMATIONS {
                    self.get::<Value>(&format!(
                        "chains/main/blocks/head/context/contracts/{}/script",
                        origination.contract_address
                    ))
                    .await
                    .with_context(|| {
                        format!("contract {} not found", origination.contract_address)
                    })?;
                    return Ok(DeployedContract {
                        address: origination.contract_address.clone(),
                        block_hash: block.hash.clone(),
                        level: block.level,
                    });
                }
            }

            if Instant::now() >= deadline {
                bail!(
                    "timeout waiting for operation {} to be confirmed",
                    origination.hash
                );
            }
            sleep(interval).await;
        }
    }
}

fn normalize_endpoint(endpoint: &str) -> Result<Url> {
    let mut url =
        Url::parse(endpoint).with_context(|| format!("invalid RPC url {}", endpoint))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("unsupported RPC url scheme {}", url.scheme());
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn poll_interval(minimal_block_delay: Option<u64>) -> Duration {
    Duration::from_secs((minimal_block_delay.unwrap_or(0) / 3).max(1))
}

fn check_applied(results: &[ContentResult]) -> Result<()> {
    let errors: Vec<&Value> = results
        .iter()
        .flat_map(|r| r.metadata.operation_result.errors.iter())
        .collect();
    match results
        .iter()
        .find(|r| r.metadata.operation_result.status != "applied")
    {
        Some(failed) => bail!(
            "{} operation {}: {}",
            failed.kind,
            failed.metadata.operation_result.status,
            Value::from(errors.into_iter().cloned().collect::<Vec<_>>())
        ),
        None => Ok(()),
    }
}

fn apply_estimates(contents: &mut [ManagerOperation], results: &[ContentResult]) -> Result<()> {
    if contents.len() != results.len() {
        bail!(
            "simulation returned {} results for {} operations",
            results.len(),
            contents.len()
        );
    }
    for (content, result) in contents.iter_mut().zip(results) {
        let result = &result.metadata.operation_result;
        content.gas_limit = result.consumed_milligas.unwrap_or(0).div_ceil(1000) + GAS_BUFFER;
        content.storage_limit = match content.kind {
            OperationKind::Reveal { .. } => 0,
            OperationKind::Origination { .. } => {
                result.paid_storage_size_diff.unwrap_or(0) + ORIGINATION_SIZE + STORAGE_BUFFER
            }
        };
    }
    Ok(())
}

/// The batch size is charged to the last operation, every operation pays its gas.
fn apply_fees(contents: &mut [ManagerOperation], forged_size: u64) {
    let last = contents.len().saturating_sub(1);
    for (i, content) in contents.iter_mut().enumerate() {
        let size = if i == last {
            forged_size + SIGNATURE_SIZE + SIZE_MARGIN
        } else {
            0
        };
        content.fee = minimal_fee(content.gas_limit, size);
    }
}

fn minimal_fee(gas_limit: u64, size: u64) -> u64 {
    MINIMAL_FEE_MUTEZ
        + (gas_limit * MINIMAL_NANOTEZ_PER_GAS_UNIT).div_ceil(1000)
        + size * MINIMAL_MUTEZ_PER_BYTE
}

fn originated_address(results: &[ContentResult]) -> Result<String> {
    let address = results
        .iter()
        .filter(|r| r.kind == "origination")
        .flat_map(|r| r.metadata.operation_result.originated_contracts.iter())
        .next()
        .ok_or(anyhow!("no originated contract in operation result"))?;
    b58_decode(prefix::CONTRACT_HASH, address, 20)
        .with_context(|| format!("invalid contract address {}", address))?;
    Ok(address.clone())
}
