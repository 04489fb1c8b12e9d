use std::{collections::BTreeMap, env, path::Path};
use serde::Deserialize;
use tracing::{debug, info};

mod api;
pub mod docker;
mod entrypoint;
mod error;
pub mod logging;
mod providers;
mod watcher;

pub use api::ApiSettings;
pub use docker::{DockerSettings, RetrySettings};
pub use entrypoint::{parse_env_var, EntryPointSettings};
pub use error::SettingsError;
pub use logging::LogSettings;
pub use providers::{FileSettings, ProvidersSettings};
pub use watcher::{ConfigEvent, ConfigWatcher};

pub type Result<T> = std::result::Result<T, SettingsError>;

/// 설정 파일을 찾지 못했을 때 살펴보는 기본 경로
pub const DEFAULT_CONFIG_FILE: &str = "rproxy.toml";

/// 정적 설정
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    // 로깅 설정
    #[serde(default)]
    pub logging: LogSettings,

    // 관리 API 설정
    #[serde(default)]
    pub api: ApiSettings,

    /// 이름별 엔트리포인트
    #[serde(default)]
    pub entrypoints: BTreeMap<String, EntryPointSettings>,

    #[serde(default)]
    pub providers: ProvidersSettings,
}

impl Settings {
    /// `RPROXY_CONFIG_FILE`, 현재 디렉토리의 `rproxy.toml`, 환경 변수 순으로 설정을 읽습니다.
    pub async fn load() -> Result<Self> {
        if let Ok(config_path) = env::var("RPROXY_CONFIG_FILE") {
            return Self::from_toml_file(&config_path).await;
        }

        if Path::new(DEFAULT_CONFIG_FILE).is_file() {
            return Self::from_toml_file(DEFAULT_CONFIG_FILE).await;
        }

        Self::from_env().await
    }

    pub async fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "설정 파일 로드");

        let content = tokio::fs::read_to_string(path).await.map_err(|e| SettingsError::FileError {
            path: path.to_string_lossy().to_string(),
            error: e,
        })?;

        let settings = Self::from_toml_str(&content)?;
        info!(
            path = %path.display(),
            entrypoints = settings.entrypoints.len(),
            providers = ?settings.providers.names(),
            "설정 파일 로드 완료"
        );
        Ok(settings)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)
            .map_err(|e| SettingsError::ParseError { source: e })?;

        settings.validate()?;
        Ok(settings)
    }

    /// 환경 변수만으로 설정을 구성합니다. 엔트리포인트 하나(`web`)와 Docker 프로바이더를 씁니다.
    pub async fn from_env() -> Result<Self> {
        let mut entrypoints = BTreeMap::new();
        entrypoints.insert("web".to_string(), EntryPointSettings::from_env()?);

        let docker_enabled: bool = parse_env_var("RPROXY_DOCKER_ENABLED", || true)?;
        let providers = ProvidersSettings {
            docker: if docker_enabled { Some(DockerSettings::from_env()?) } else { None },
            file: env::var("RPROXY_FILE_PROVIDER").ok().map(|path| FileSettings {
                path: path.into(),
                watch: true,
            }),
            other: BTreeMap::new(),
        };

        let settings = Self {
            logging: LogSettings::from_env()?,
            api: ApiSettings::from_env()?,
            entrypoints,
            providers,
        };

        // 설정 생성 시점에 바로 검증
        settings.validate()?;
        Ok(settings)
    }

    /// 설정 유효성 검증
    pub fn validate(&self) -> Result<()> {
        if self.entrypoints.is_empty() {
            return Err(SettingsError::InvalidConfig(
                "엔트리포인트가 하나 이상 필요합니다".to_string(),
            ));
        }

        for (name, entrypoint) in &self.entrypoints {
            entrypoint.validate(name)?;
        }

        self.api.validate()?;
        self.providers.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn test_settings_from_toml() {
        let toml_content = r#"
            [logging]
            format = "json"
            level = "debug"
            output = "stdout"

            [api]
            address = "127.0.0.1:9191"

            [entrypoints.web]
            address = "0.0.0.0:8080"
            proxy_protocol = 1
            dial_timeout_ms = -1

            [providers.docker]
            network = "bridge"

            [providers.docker.retry]
            max_attempts = 5

            [providers.file]
            path = "dynamic.toml"
            watch = true
        "#;

        let settings = Settings::from_toml_str(toml_content).unwrap();
        assert_eq!(settings.logging.format, logging::LogFormat::Json);
        assert_eq!(settings.logging.level, Level::DEBUG);
        assert_eq!(settings.api.address, "127.0.0.1:9191");

        let web = &settings.entrypoints["web"];
        assert_eq!(web.address, "0.0.0.0:8080");
        assert_eq!(web.proxy_protocol, 1);
        assert_eq!(web.dial_timeout_ms, -1);

        let docker = settings.providers.docker.as_ref().unwrap();
        assert_eq!(docker.network.as_deref(), Some("bridge"));
        assert_eq!(docker.label_prefix, "rpoxy.");
        assert_eq!(docker.retry.max_attempts, 5);
        assert_eq!(docker.retry.interval, 2);

        let file = settings.providers.file.as_ref().unwrap();
        assert!(file.watch);
        assert_eq!(settings.providers.names(), vec!["docker", "file"]);
    }

    #[test]
    fn test_unknown_provider_is_kept_aside() {
        let toml_content = r#"
            [entrypoints.web]
            address = "0.0.0.0:80"

            [providers.consul]
            endpoint = "127.0.0.1:8500"
        "#;

        let settings = Settings::from_toml_str(toml_content).unwrap();
        assert!(settings.providers.docker.is_none());
        assert!(settings.providers.other.contains_key("consul"));
        assert_eq!(settings.providers.names(), vec!["consul"]);
    }

    #[test]
    fn test_unsupported_proxy_protocol_rejected() {
        let toml_content = r#"
            [entrypoints.web]
            address = "0.0.0.0:80"
            proxy_protocol = 2
        "#;

        let err = Settings::from_toml_str(toml_content).unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn test_entrypoints_required() {
        let err = Settings::from_toml_str("[api]\nenabled = false\n").unwrap_err();
        assert!(matches!(err, SettingsError::InvalidConfig(_)));
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let toml_content = r#"
            [logging]
            level = "loud"

            [entrypoints.web]
            address = "0.0.0.0:80"
        "#;

        assert!(matches!(
            Settings::from_toml_str(toml_content),
            Err(SettingsError::ParseError { .. })
        ));
    }
}
