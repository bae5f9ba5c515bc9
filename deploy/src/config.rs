use std::fmt;

use colored::Colorize;
use thiserror::Error;

pub const SECRET_KEY_VAR: &str = "PK";
pub const RPC_URL_VAR: &str = "RPC_URL";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    secret_key: String,
    rpc_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("couldn't find env variables in {location}")]
    BothMissing { location: String },
    #[error("missing {name} env var in {location}")]
    Missing {
        name: &'static str,
        location: String,
    },
}

impl ConfigError {
    pub const EXIT_CODE: i32 = -1;

    pub fn diagnostic(&self) -> String {
        match self {
            Self::BothMissing { location } => format!(
                "{}{}",
                "Couldn't find env variables. Have you filled ".bright_red(),
                location.red().bold().underline()
            ),
            Self::Missing { name, location } => format!(
                "{}{}{}{}",
                "Missing ".bright_red(),
                name.red().bold().underline(),
                " env var. Please add it in ".bright_red(),
                location.red().bold().underline()
            ),
        }
    }
}

impl Credentials {
    pub fn from_env<F>(lookup: F, location: &str) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.is_empty());
        let secret_key = read(SECRET_KEY_VAR);
        let rpc_url = read(RPC_URL_VAR);

        match (secret_key, rpc_url) {
            (Some(secret_key), Some(rpc_url)) => Ok(Self {
                secret_key,
                rpc_url,
            }),
            (None, None) => Err(ConfigError::BothMissing {
                location: location.to_string(),
            }),
            (None, Some(_)) => Err(ConfigError::Missing {
                name: SECRET_KEY_VAR,
                location: location.to_string(),
            }),
            (Some(_), None) => Err(ConfigError::Missing {
                name: RPC_URL_VAR,
                location: location.to_string(),
            }),
        }
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("secret_key", &"<redacted>")
            .field("rpc_url", &self.rpc_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const LOCATION: &str = "deploy/.env";

    fn load(vars: &[(&str, &str)]) -> Result<Credentials, ConfigError> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Credentials::from_env(|name| env.get(name).cloned(), LOCATION)
    }

    #[test]
    fn both_present() {
        let credentials = load(&[("PK", "edsk..."), ("RPC_URL", "https://node.example")]).unwrap();
        assert_eq!(credentials.secret_key(), "edsk...");
        assert_eq!(credentials.rpc_url(), "https://node.example");
    }

    #[test]
    fn both_missing_gives_one_combined_diagnostic() {
        let err = load(&[]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::BothMissing {
                location: LOCATION.to_string()
            }
        );
        let diagnostic = err.diagnostic();
        assert!(diagnostic.contains("Couldn't find env variables"));
        assert!(diagnostic.contains(LOCATION));
        assert!(!diagnostic.contains("Missing"));
    }

    #[test]
    fn secret_key_missing() {
        let err = load(&[("RPC_URL", "https://node.example")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Missing {
                name: "PK",
                location: LOCATION.to_string()
            }
        );
        assert!(err.diagnostic().contains("PK"));
        assert!(err.diagnostic().contains(LOCATION));
    }

    #[test]
    fn rpc_url_missing() {
        let err = load(&[("PK", "edsk...")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Missing {
                name: "RPC_URL",
                location: LOCATION.to_string()
            }
        );
        assert!(err.diagnostic().contains("RPC_URL"));
    }

    #[test]
    fn empty_values_are_missing() {
        assert!(matches!(
            load(&[("PK", ""), ("RPC_URL", "")]),
            Err(ConfigError::BothMissing { .. })
        ));
        assert!(matches!(
            load(&[("PK", ""), ("RPC_URL", "https://node.example")]),
            Err(ConfigError::Missing { name: "PK", .. })
        ));
    }

    #[test]
    fn values_are_not_trimmed() {
        let credentials = load(&[("PK", " edsk "), ("RPC_URL", "https://node.example/ ")]).unwrap();
        assert_eq!(credentials.secret_key(), " edsk ");
        assert_eq!(credentials.rpc_url(), "https://node.example/ ");
    }

    #[test]
    fn validation_is_idempotent() {
        for vars in [
            vec![],
            vec![("PK", "edsk...")],
            vec![("RPC_URL", "https://node.example")],
            vec![("PK", "edsk..."), ("RPC_URL", "https://node.example")],
        ] {
            let first = load(&vars);
            let second = load(&vars);
            assert_eq!(first, second);
            if let (Err(a), Err(b)) = (first, second) {
                assert_eq!(a.diagnostic(), b.diagnostic());
            }
        }
    }

    #[test]
    fn debug_redacts_secret_key() {
        let credentials = load(&[("PK", "edsksecret"), ("RPC_URL", "https://node.example")]).unwrap();
        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("edsksecret"));
        assert!(debug.contains("https://node.example"));
    }

    #[test]
    fn exit_code() {
        assert_eq!(ConfigError::EXIT_CODE, -1);
    }
}
