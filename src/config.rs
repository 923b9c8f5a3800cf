//! Runtime settings, resolved once at startup and passed down explicitly.

use crate::error::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "STUDIOPAY";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub gateways: GatewaySettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| crate::error::PaymentError::ValidationError(format!("server address: {e}")))
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct StorageSettings {
    /// RocksDB directory. In-memory storage when unset.
    pub db_path: Option<PathBuf>,
}

/// Merchant credentials. A gateway without a section accepts no callbacks.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct GatewaySettings {
    pub alipay: Option<AlipaySettings>,
    pub wechat: Option<WechatSettings>,
    pub hupipay: Option<HupiPaySettings>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AlipaySettings {
    pub app_id: String,
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WechatSettings {
    pub app_id: String,
    pub mch_id: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HupiPaySettings {
    pub app_id: String,
    pub app_secret: String,
}

impl Settings {
    /// Defaults, then `file` if given, then `STUDIOPAY__SECTION__KEY` variables.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8000)?;
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
