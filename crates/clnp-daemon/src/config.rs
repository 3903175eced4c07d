// Copyright (c) 2026 CLNP Contributors
// SPDX-License-Identifier: Apache-2.0

use rand::rngs::OsRng;
use rand::RngCore;
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_CHALLENGE_TTL_MS: u64 = 180_000;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub challenge_ttl_ms: u64,
    /// HMAC key for tokens, receipts, and IP hashing.
    pub secret: Vec<u8>,
    /// True when the secret was generated at startup; tokens then die with
    /// the process.
    pub ephemeral_secret: bool,
    pub admin_token: Option<String>,
    pub data_dir: PathBuf,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let (secret, ephemeral_secret) = match read_env("CLNP_SECRET") {
            Some(value) => (value.into_bytes(), false),
            None => {
                let mut key = vec![0u8; 32];
                OsRng.fill_bytes(&mut key);
                (key, true)
            }
        };
        Self {
            host: read_env("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: read_env_parsed("PORT", DEFAULT_PORT),
            challenge_ttl_ms: read_env_parsed("CHALLENGE_TTL_MS", DEFAULT_CHALLENGE_TTL_MS),
            secret,
            ephemeral_secret,
            admin_token: read_env("CLNP_ADMIN_TOKEN"),
            data_dir: PathBuf::from(read_env("CLNP_DATA_DIR").unwrap_or_else(|| "./data".into())),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ephemeral_secret_is_32_bytes() {
        // Runs without CLNP_SECRET in the test environment.
        std::env::remove_var("CLNP_SECRET");
        let cfg = ServiceConfig::from_env();
        if cfg.ephemeral_secret {
            assert_eq!(cfg.secret.len(), 32);
        }
    }

    #[test]
    fn defaults_are_sane() {
        std::env::remove_var("PORT");
        std::env::remove_var("CHALLENGE_TTL_MS");
        let cfg = ServiceConfig::from_env();
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.challenge_ttl_ms, DEFAULT_CHALLENGE_TTL_MS);
    }
}
