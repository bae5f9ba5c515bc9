use std::{cmp::Ordering, path::Path};

use anyhow::{Context, Result};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct ContractArtifact {
    pub code: Value,
}

impl ContractArtifact {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read contract artifact {}", path.display()))?;
        let code = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse contract artifact {}", path.display()))?;
        Ok(Self { code })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MichelsonMap {
    entries: Vec<(Value, Value)>,
}

impl MichelsonMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: Value, value: Value) {
        match self
            .entries
            .binary_search_by(|(existing, _)| compare_keys(existing, &key))
        {
            Ok(i) => self.entries[i].1 = value,
            Err(i) => self.entries.insert(i, (key, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_micheline(&self) -> Value {
        Value::Array(
            self.entries
                .iter()
                .map(|(k, v)| json!({ "prim": "Elt", "args": [k, v] }))
                .collect(),
        )
    }
}

fn compare_keys(a: &Value, b: &Value) -> Ordering {
    let int = |v: &Value| v.get("int").and_then(Value::as_str)?.parse::<i128>().ok();
    if let (Some(a), Some(b)) = (int(a), int(b)) {
        return a.cmp(&b);
    }
    for field in ["string", "bytes"] {
        if let (Some(a), Some(b)) = (
            a.get(field).and_then(Value::as_str),
            b.get(field).and_then(Value::as_str),
        ) {
            return a.cmp(b);
        }
    }
    a.to_string().cmp(&b.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origination {
    pub hash: String,
    /// Address the contract will have once the operation is included.
    pub contract_address: String,
    pub branch_level: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedContract {
    pub address: String,
    pub block_hash: String,
    pub level: i64,
}
