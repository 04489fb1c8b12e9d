use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{DockerSettings, SettingsError};

/// 파일 프로바이더 설정
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileSettings {
    /// TOML 또는 JSON 동적 설정 파일
    pub path: PathBuf,

    /// 파일 변경 시 다시 읽을지 여부
    #[serde(default)]
    pub watch: bool,
}

/// 프로바이더 종류별 설정 슬롯
///
/// 알 수 없는 이름의 프로바이더 설정은 `other`에 그대로 보관되고 시작 시 건너뜁니다.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProvidersSettings {
    #[serde(default)]
    pub docker: Option<DockerSettings>,

    #[serde(default)]
    pub file: Option<FileSettings>,

    #[serde(flatten)]
    pub other: BTreeMap<String, toml::Value>,
}

impl ProvidersSettings {
    /// 설정된 프로바이더 이름 목록 (알 수 없는 이름 포함)
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if self.docker.is_some() {
            names.push("docker".to_string());
        }
        if self.file.is_some() {
            names.push("file".to_string());
        }
        names.extend(self.other.keys().cloned());
        names
    }

    pub fn is_empty(&self) -> bool {
        self.docker.is_none() && self.file.is_none() && self.other.is_empty()
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if let Some(docker) = &self.docker {
            docker.validate()?;
        }
        if let Some(file) = &self.file {
            if file.path.as_os_str().is_empty() {
                return Err(SettingsError::InvalidConfig(
                    "providers.file.path가 비어 있습니다".to_string(),
                ));
            }
        }
        Ok(())
    }
}
