use serde::Deserialize;
use super::{parse_env_var, SettingsError};
pub type Result<T> = std::result::Result<T, SettingsError>;

/// 컨테이너 목록 조회 재시도 설정
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetrySettings {
    /// 최대 시도 횟수
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// 재시도 간격 (초)
    #[serde(default = "default_retry_interval")]
    pub interval: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval: default_retry_interval(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_interval() -> u64 {
    2
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DockerSettings {
    /// Docker 엔드포인트. 없으면 로컬 기본값(유닉스 소켓)을 씁니다.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// 컨테이너 주소를 가져올 네트워크. 없으면 컨테이너의 네트워크 모드를 따릅니다.
    #[serde(default)]
    pub network: Option<String>,

    /// 라벨 접두사
    #[serde(default = "default_label_prefix")]
    pub label_prefix: String,

    /// 컨테이너 이벤트를 구독해서 변경 시 다시 조회할지 여부
    #[serde(default = "default_watch")]
    pub watch: bool,

    #[serde(default)]
    pub retry: RetrySettings,
}

impl DockerSettings {
    pub fn from_env() -> Result<Self> {
        let network: String = parse_env_var("RPROXY_DOCKER_NETWORK", String::new)?;
        let settings = Self {
            endpoint: std::env::var("RPROXY_DOCKER_ENDPOINT").ok(),
            network: (!network.is_empty()).then_some(network),
            label_prefix: parse_env_var("RPROXY_LABEL_PREFIX", default_label_prefix)?,
            watch: parse_env_var("RPROXY_DOCKER_WATCH", default_watch)?,
            retry: RetrySettings::default(),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(network) = &self.network {
            if network.is_empty()
                || !network.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            {
                return Err(SettingsError::EnvVarInvalid {
                    var_name: "RPROXY_DOCKER_NETWORK".to_string(),
                    value: network.clone(),
                    reason: "Docker 네트워크 이름은 영숫자와 -_. 만 포함할 수 있습니다".to_string(),
                });
            }
        }

        // 라벨 접두사 길이 제한
        if self.label_prefix.len() > 100 {
            return Err(SettingsError::EnvVarInvalid {
                var_name: "RPROXY_LABEL_PREFIX".to_string(),
                value: self.label_prefix.clone(),
                reason: "라벨 접두사가 너무 깁니다 (최대 100자)".to_string(),
            });
        }

        if !self.label_prefix.is_empty() && !self.label_prefix.ends_with('.') {
            return Err(SettingsError::EnvVarInvalid {
                var_name: "RPROXY_LABEL_PREFIX".to_string(),
                value: self.label_prefix.clone(),
                reason: "라벨 접두사는 '.'으로 끝나야 합니다".to_string(),
            });
        }

        if self.retry.max_attempts == 0 {
            return Err(SettingsError::InvalidConfig(
                "retry.max_attempts는 1 이상이어야 합니다".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            network: None,
            label_prefix: default_label_prefix(),
            watch: default_watch(),
            retry: RetrySettings::default(),
        }
    }
}

fn default_label_prefix() -> String {
    "rpoxy.".to_string()
}

fn default_watch() -> bool {
    true
}
