use serde::Deserialize;
use std::env;
use std::time::Duration;

use super::SettingsError;
use crate::proxy::{DialProxy, DialTimeout};

/// 이름 붙은 리슨 주소와 그 주소에서 쓰는 다이얼 정책
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct EntryPointSettings {
    /// `host:port`
    pub address: String,

    /// PROXY protocol 버전 (0: 사용 안 함, 1: 텍스트 헤더)
    #[serde(default)]
    pub proxy_protocol: u8,

    /// 다이얼 타임아웃 (밀리초). 음수는 기한 없음, 0은 기본값
    #[serde(default)]
    pub dial_timeout_ms: i64,

    /// keep-alive 주기 (초). 없으면 기본값, 0이면 끔
    #[serde(default)]
    pub keep_alive_secs: Option<u64>,
}

fn default_entrypoint_address() -> String {
    "0.0.0.0:80".to_string()
}

pub fn parse_env_var<T: std::str::FromStr, F: FnOnce() -> T>(name: &str, default: F) -> Result<T, SettingsError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val.parse().map_err(|e: T::Err| SettingsError::EnvVarInvalid {
            var_name: name.to_string(),
            value: val,
            reason: e.to_string(),
        }),
        Err(env::VarError::NotPresent) => Ok(default()),
        Err(e) => Err(SettingsError::EnvVarInvalid {
            var_name: name.to_string(),
            value: "".to_string(),
            reason: e.to_string(),
        }),
    }
}

impl EntryPointSettings {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            proxy_protocol: 0,
            dial_timeout_ms: 0,
            keep_alive_secs: None,
        }
    }

    pub fn from_env() -> Result<Self, SettingsError> {
        let settings = Self {
            address: parse_env_var("RPROXY_ENTRYPOINT", default_entrypoint_address)?,
            proxy_protocol: parse_env_var("RPROXY_PROXY_PROTOCOL", || 0u8)?,
            dial_timeout_ms: parse_env_var("RPROXY_DIAL_TIMEOUT_MS", || 0i64)?,
            keep_alive_secs: match env::var("RPROXY_KEEP_ALIVE_SECS") {
                Ok(_) => Some(parse_env_var("RPROXY_KEEP_ALIVE_SECS", || 60u64)?),
                Err(_) => None,
            },
        };

        settings.validate("default")?;
        Ok(settings)
    }

    pub fn validate(&self, name: &str) -> Result<(), SettingsError> {
        if self.address.trim().is_empty() {
            return Err(SettingsError::InvalidConfig(format!(
                "엔트리포인트 {}의 주소가 비어 있습니다",
                name
            )));
        }

        if !self.address.contains(':') {
            return Err(SettingsError::InvalidConfig(format!(
                "엔트리포인트 {}의 주소 {}는 host:port 형식이어야 합니다",
                name, self.address
            )));
        }

        if self.proxy_protocol > 1 {
            return Err(SettingsError::InvalidConfig(format!(
                "엔트리포인트 {}: proxy protocol version {} not supported",
                name, self.proxy_protocol
            )));
        }

        Ok(())
    }

    /// 이 엔트리포인트의 정책을 적용한 다이얼 목적지를 만듭니다.
    pub fn dial_proxy(&self, backend: impl Into<String>) -> DialProxy {
        let proxy = DialProxy::to(backend)
            .with_dial_timeout(DialTimeout::from_millis(self.dial_timeout_ms))
            .with_proxy_protocol(self.proxy_protocol);

        match self.keep_alive_secs {
            Some(secs) => proxy.with_keep_alive(Duration::from_secs(secs)),
            None => proxy,
        }
    }
}
