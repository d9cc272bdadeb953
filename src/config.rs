//! JSON configuration schema (spec §6).
//!
//! Grounded on the teacher's `archive::PackOptions` (a plain `serde`
//! struct passed through unmodified) for the shape, generalized into the
//! multi-section document spec.md §6 names.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingType {
    Fixed = 0,
    FastCdc = 1,
    FslTrace = 2,
    UbcTrace = 3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunking_type: ChunkingType,
    pub max_chunk_size: u32,
    pub avg_chunk_size: u32,
    pub min_chunk_size: u32,
    pub sliding_window_size: u32,
    pub read_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub recipe_root_path: String,
    pub container_root_path: String,
    pub fp2chunk_db_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreConfig {
    pub read_cache_size: usize,
}

fn default_send_chunk_batch_size() -> u32 {
    256
}

fn default_send_recipe_batch_size() -> u32 {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub storage_server_ip: String,
    pub storage_server_port: u16,
    pub client_id: u32,
    #[serde(default = "default_send_chunk_batch_size")]
    pub send_chunk_batch_size: u32,
    #[serde(default = "default_send_recipe_batch_size")]
    pub send_recipe_batch_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoConfig {
    pub local_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyOracleConfig {
    pub key_server_ip: String,
    pub key_server_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationConfig {
    pub spid: String,
    pub quote_type: String,
    pub ias_server_type: String,
    pub ias_primary_key: String,
    pub ias_sec_key: String,
    pub ias_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreqIndexConfig {
    /// In thousands, per spec.md §6.
    pub top_k_param: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub chunking: ChunkingConfig,
    pub storage: StorageConfig,
    pub restore: RestoreConfig,
    pub transport: TransportConfig,
    pub crypto: CryptoConfig,
    pub key_oracle: Option<KeyOracleConfig>,
    pub attestation: Option<AttestationConfig>,
    pub freq_index: FreqIndexConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Recipe batch size must be a multiple of the chunk batch size (spec
    /// §7 `ConfigError`).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let recipe = self.transport.send_recipe_batch_size;
        let chunk = self.transport.send_chunk_batch_size;
        if chunk == 0 || recipe % chunk != 0 {
            return Err(ConfigError::BatchSizeMismatch { recipe: recipe as usize, chunk: chunk as usize });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config(recipe_batch: u32, chunk_batch: u32) -> Config {
        Config {
            chunking: ChunkingConfig {
                chunking_type: ChunkingType::FastCdc,
                max_chunk_size: 16384,
                avg_chunk_size: 8192,
                min_chunk_size: 2048,
                sliding_window_size: 48,
                read_size: 1 << 20,
            },
            storage: StorageConfig {
                recipe_root_path: "/tmp/recipes".into(),
                container_root_path: "/tmp/containers".into(),
                fp2chunk_db_name: "fp2chunk".into(),
            },
            restore: RestoreConfig { read_cache_size: 64 },
            transport: TransportConfig {
                storage_server_ip: "127.0.0.1".into(),
                storage_server_port: 8888,
                client_id: 1,
                send_chunk_batch_size: chunk_batch,
                send_recipe_batch_size: recipe_batch,
            },
            crypto: CryptoConfig { local_secret: "s3cr3t".into() },
            key_oracle: None,
            attestation: None,
            freq_index: FreqIndexConfig { top_k_param: 64 },
        }
    }

    #[test]
    fn accepts_multiple_batch_sizes() {
        assert!(sample_config(512, 256).validate().is_ok());
    }

    #[test]
    fn rejects_non_multiple_batch_sizes() {
        assert!(sample_config(500, 256).validate().is_err());
    }

    #[test]
    fn json_round_trip() {
        let config = sample_config(1024, 256);
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.transport.client_id, config.transport.client_id);
    }
}
