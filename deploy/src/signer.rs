use std::fmt;

use anyhow::{anyhow, bail, Result};
use bitcoin::secp256k1::{self, Message, Secp256k1};
use ed25519_dalek::{Signer as _, SigningKey};

use crate::utils::{b58_decode, b58_encode, blake2b_160, blake2b_256, prefix};

pub enum InMemorySigner {
    Ed25519(SigningKey),
    Secp256k1(secp256k1::SecretKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub bytes: Vec<u8>,
    pub prefixed: String,
}

impl InMemorySigner {
    pub fn from_secret_key(secret: &str) -> Result<Self> {
        match secret.get(..5) {
            Some("edesk") | Some("spesk") | Some("p2esk") => {
                bail!("encrypted secret keys are not supported")
            }
            _ => {}
        }
        match secret.get(..4) {
            Some("edsk") if secret.len() == 54 => {
                let seed = b58_decode(prefix::ED25519_SEED, secret, 32)?;
                Ok(Self::Ed25519(SigningKey::from_bytes(&to_array(&seed)?)))
            }
            Some("edsk") if secret.len() == 98 => {
                let bytes = b58_decode(prefix::ED25519_SECRET_KEY, secret, 64)?;
                let key = SigningKey::from_bytes(&to_array(&bytes[..32])?);
                if key.verifying_key().as_bytes()[..] != bytes[32..] {
                    bail!("secret key does not match its embedded public key");
                }
                Ok(Self::Ed25519(key))
            }
            Some("edsk") => bail!("invalid ed25519 secret key length"),
            Some("spsk") => {
                let bytes = b58_decode(prefix::SECP256K1_SECRET_KEY, secret, 32)?;
                Ok(Self::Secp256k1(secp256k1::SecretKey::from_slice(&bytes)?))
            }
            _ => bail!("unsupported secret key format"),
        }
    }

    pub fn public_key(&self) -> String {
        match self {
            Self::Ed25519(key) => {
                b58_encode(prefix::ED25519_PUBLIC_KEY, key.verifying_key().as_bytes())
            }
            Self::Secp256k1(key) => b58_encode(
                prefix::SECP256K1_PUBLIC_KEY,
                &key.public_key(&Secp256k1::signing_only()).serialize(),
            ),
        }
    }

    pub fn public_key_hash(&self) -> String {
        match self {
            Self::Ed25519(key) => b58_encode(
                prefix::ED25519_PUBLIC_KEY_HASH,
                &blake2b_160(key.verifying_key().as_bytes()),
            ),
            Self::Secp256k1(key) => b58_encode(
                prefix::SECP256K1_PUBLIC_KEY_HASH,
                &blake2b_160(&key.public_key(&Secp256k1::signing_only()).serialize()),
            ),
        }
    }

    /// Signs `blake2b-256(watermark || bytes)`.
    pub fn sign(&self, bytes: &[u8], watermark: &[u8]) -> Result<Signature> {
        let digest = blake2b_256(&[watermark, bytes].concat());
        let signature = match self {
            Self::Ed25519(key) => {
                let bytes = key.sign(&digest).to_bytes().to_vec();
                let prefixed = b58_encode(prefix::ED25519_SIGNATURE, &bytes);
                Signature { bytes, prefixed }
            }
            Self::Secp256k1(key) => {
                let message = Message::from_digest_slice(&digest)?;
                let bytes = Secp256k1::signing_only()
                    .sign_ecdsa(&message, key)
                    .serialize_compact()
                    .to_vec();
                let prefixed = b58_encode(prefix::SECP256K1_SIGNATURE, &bytes);
                Signature { bytes, prefixed }
            }
        };
        Ok(signature)
    }
}

impl fmt::Debug for InMemorySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemorySigner")
            .field("public_key_hash", &self.public_key_hash())
            .finish_non_exhaustive()
    }
}

fn to_array(bytes: &[u8]) -> Result<[u8; 32]> {
    bytes.try_into().map_err(|_| anyhow!("expected 32 key bytes"))
}
