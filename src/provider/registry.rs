use std::collections::BTreeMap;
use tracing::{error, info};

use super::{AnyProvider, DockerProvider, FileProvider, ProviderError};
use crate::settings::ProvidersSettings;

/// 프로바이더 설정에서 프로바이더를 만드는 함수
pub type ProviderFactory = fn(&ProvidersSettings) -> Result<AnyProvider, ProviderError>;

/// 프로바이더 이름과 생성 함수의 목록
///
/// 시작 시 한 번 만들어서 파이프라인 구성에 넘깁니다.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `docker`, `file` 프로바이더가 등록된 레지스트리
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("docker", create_docker);
        registry.register("file", create_file);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: ProviderFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn create(&self, name: &str, settings: &ProvidersSettings) -> Result<AnyProvider, ProviderError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ProviderError::UnknownProvider { name: name.to_string() })?;
        factory(settings)
    }

    /// 설정된 프로바이더를 모두 만듭니다. 실패한 프로바이더는 로그를 남기고 건너뜁니다.
    pub fn build(&self, settings: &ProvidersSettings) -> Vec<AnyProvider> {
        settings
            .names()
            .into_iter()
            .filter_map(|name| match self.create(&name, settings) {
                Ok(provider) => {
                    info!(provider = %name, "프로바이더 생성");
                    Some(provider)
                }
                Err(e) => {
                    error!(provider = %name, error = %e, "프로바이더 생성 실패, 건너뜀");
                    None
                }
            })
            .collect()
    }
}

fn create_docker(settings: &ProvidersSettings) -> Result<AnyProvider, ProviderError> {
    let docker = settings
        .docker
        .clone()
        .ok_or_else(|| ProviderError::MissingSettings { name: "docker".to_string() })?;
    Ok(AnyProvider::Docker(DockerProvider::connect(docker)?))
}

fn create_file(settings: &ProvidersSettings) -> Result<AnyProvider, ProviderError> {
    let file = settings
        .file
        .clone()
        .ok_or_else(|| ProviderError::MissingSettings { name: "file".to_string() })?;
    Ok(AnyProvider::File(FileProvider::new(file)))
}
