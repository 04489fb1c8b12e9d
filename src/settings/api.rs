use serde::Deserialize;
use super::{parse_env_var, SettingsError};

/// 관리 API 설정
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_api_address")]
    pub address: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            address: default_api_address(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_api_address() -> String {
    "127.0.0.1:9090".to_string()
}

impl ApiSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Ok(Self {
            enabled: parse_env_var("RPROXY_API_ENABLED", default_enabled)?,
            address: parse_env_var("RPROXY_API_ADDRESS", default_api_address)?,
        })
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.enabled && self.address.parse::<std::net::SocketAddr>().is_err() {
            return Err(SettingsError::EnvVarInvalid {
                var_name: "RPROXY_API_ADDRESS".to_string(),
                value: self.address.clone(),
                reason: "ip:port 형식이어야 합니다".to_string(),
            });
        }
        Ok(())
    }
}
