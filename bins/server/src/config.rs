use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use radar_api::OverflowPolicy;
use radar_ingest::IngestConfig;
use storage_file::FileStorageConfig;
use storage_memory::MemoryStorageConfig;

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "radar-server", about = "Приём радарных треков по UDP, хранение и раздача по HTTP/WS")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Запустить сервер
    Serve(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Путь к TOML конфиг файлу. Без него — встроенные значения по умолчанию.
    #[arg(long, env = "RADAR_CONFIG")]
    pub config: Option<String>,
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_udp_bind")]
    pub udp_bind: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Размер буфера приёма; datagram, заполнивший его целиком, считается обрезанным.
    #[serde(default = "default_max_datagram")]
    pub max_datagram: usize,
    /// Максимум одновременно сохраняемых треков.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Что делать, когда все worker'ы заняты.
    #[serde(default = "default_ingest_overflow")]
    pub ingest_overflow: OverflowPolicy,
    #[serde(default = "default_persist_timeout_ms")]
    pub persist_timeout_ms: u64,
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_history_max_limit")]
    pub history_max_limit: usize,
    /// Размер буфера подписки одного WS клиента.
    #[serde(default = "default_ws_buffer")]
    pub ws_buffer: usize,
    /// Стратегия переполнения WS подписок.
    #[serde(default = "default_ws_overflow")]
    pub ws_overflow: OverflowPolicy,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    Memory(MemoryStorageConfig),
    File(FileStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory(MemoryStorageConfig::default())
    }
}

fn default_udp_bind() -> String {
    "0.0.0.0:5005".into()
}
fn default_api_port() -> u16 {
    3000
}
fn default_max_datagram() -> usize {
    65536
}
fn default_workers() -> usize {
    256
}
fn default_ingest_overflow() -> OverflowPolicy {
    OverflowPolicy::BackPressure
}
fn default_persist_timeout_ms() -> u64 {
    2000
}
fn default_drain_timeout_ms() -> u64 {
    5000
}
fn default_history_limit() -> usize {
    50
}
fn default_history_max_limit() -> usize {
    1000
}
fn default_ws_buffer() -> usize {
    4096
}
fn default_ws_overflow() -> OverflowPolicy {
    OverflowPolicy::Drop
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            udp_bind: default_udp_bind(),
            api_port: default_api_port(),
            max_datagram: default_max_datagram(),
            workers: default_workers(),
            ingest_overflow: default_ingest_overflow(),
            persist_timeout_ms: default_persist_timeout_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
            history_limit: default_history_limit(),
            history_max_limit: default_history_max_limit(),
            ws_buffer: default_ws_buffer(),
            ws_overflow: default_ws_overflow(),
            storage: StorageConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|e| ServerError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }

    pub fn ingest(&self) -> IngestConfig {
        IngestConfig {
            max_datagram: self.max_datagram,
            workers: self.workers,
            overflow: self.ingest_overflow,
            persist_timeout: self.persist_timeout(),
            drain_timeout: Duration::from_millis(self.drain_timeout_ms),
        }
    }
}
