use anyhow::{anyhow, bail, Result};
use bitcoin::base58;
use blake2::{
    digest::consts::{U20, U32},
    Blake2b, Digest,
};

pub mod prefix {
    pub const ED25519_SEED: &[u8] = &[13, 15, 58, 7];
    pub const ED25519_SECRET_KEY: &[u8] = &[43, 246, 78, 7];
    pub const ED25519_PUBLIC_KEY: &[u8] = &[13, 15, 37, 217];
    pub const ED25519_PUBLIC_KEY_HASH: &[u8] = &[6, 161, 159];
    pub const ED25519_SIGNATURE: &[u8] = &[9, 245, 205, 134, 18];

    pub const SECP256K1_SECRET_KEY: &[u8] = &[17, 162, 224, 201];
    pub const SECP256K1_PUBLIC_KEY: &[u8] = &[3, 254, 226, 86];
    pub const SECP256K1_PUBLIC_KEY_HASH: &[u8] = &[6, 161, 161];
    pub const SECP256K1_SIGNATURE: &[u8] = &[13, 115, 101, 19, 63];

    pub const CONTRACT_HASH: &[u8] = &[2, 90, 121];
}

pub const GENERIC_OPERATION_WATERMARK: &[u8] = &[3];

pub fn b58_encode(prefix: &[u8], payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(prefix.len() + payload.len());
    data.extend_from_slice(prefix);
    data.extend_from_slice(payload);
    base58::encode_check(&data)
}

pub fn b58_decode(prefix: &[u8], value: &str, len: usize) -> Result<Vec<u8>> {
    let data = base58::decode_check(value).map_err(|e| anyhow!("invalid base58 value: {}", e))?;
    let payload = data
        .strip_prefix(prefix)
        .ok_or(anyhow!("unexpected base58 prefix"))?;
    if payload.len() != len {
        bail!("expected {} bytes, got {}", len, payload.len());
    }
    Ok(payload.to_vec())
}

pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Blake2b::<U32>::digest(data));
    out
}

pub fn blake2b_160(data: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(&Blake2b::<U20>::digest(data));
    out
}
