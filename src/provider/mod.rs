//! 동적 설정 프로바이더
//!
//! 프로바이더는 인프라 상태를 조회해서 완전한 [`Configuration`] 스냅샷을 채널로 보냅니다.
//! 여러 프로바이더가 각자의 태스크에서 동시에 실행되고, 소비자는 어느 프로바이더가
//! 언제 보낼지 가정하지 않습니다.

pub mod docker;
mod error;
pub mod file;
pub mod registry;

pub use docker::DockerProvider;
pub use error::ProviderError;
pub use file::FileProvider;
pub use registry::{ProviderFactory, ProviderRegistry};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::dynamic::Configuration;
use docker::BollardDockerClient;

/// 프로바이더 하나가 보낸 스냅샷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMessage {
    pub provider: String,
    pub configuration: Configuration,
}

impl ProviderMessage {
    pub fn new(provider: impl Into<String>, configuration: Configuration) -> Self {
        Self {
            provider: provider.into(),
            configuration,
        }
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// 스냅샷에 붙는 프로바이더 이름
    fn name(&self) -> &str;

    /// 발견 작업을 수행하고 스냅샷을 `tx`로 보냅니다.
    ///
    /// 감시 모드라면 변경이 생길 때마다 새 스냅샷을 보내며 반환하지 않을 수 있습니다.
    async fn provide(&self, tx: mpsc::Sender<ProviderMessage>) -> Result<(), ProviderError>;
}

/// 레지스트리가 만드는 기본 프로바이더들
pub enum AnyProvider {
    Docker(DockerProvider<BollardDockerClient>),
    File(FileProvider),
}

#[async_trait]
impl Provider for AnyProvider {
    fn name(&self) -> &str {
        match self {
            AnyProvider::Docker(p) => p.name(),
            AnyProvider::File(p) => p.name(),
        }
    }

    async fn provide(&self, tx: mpsc::Sender<ProviderMessage>) -> Result<(), ProviderError> {
        match self {
            AnyProvider::Docker(p) => p.provide(tx).await,
            AnyProvider::File(p) => p.provide(tx).await,
        }
    }
}
