use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::{ContainerSummary, EventMessage};
use bollard::system::EventsOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::{Stream, StreamExt};
use std::pin::Pin;

use super::DockerError;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventMessage, DockerError>> + Send>>;

/// Docker Engine API 중 프로바이더가 쓰는 부분
#[async_trait]
pub trait DockerClient: Send + Sync {
    async fn list_containers(
        &self,
        options: Option<ListContainersOptions<String>>,
    ) -> Result<Vec<ContainerSummary>, DockerError>;

    fn events(&self, options: Option<EventsOptions<String>>) -> EventStream;
}

/// 실제 Docker 클라이언트 구현
#[derive(Clone)]
pub struct BollardDockerClient(Docker);

const CONNECT_TIMEOUT_SECS: u64 = 120;

impl BollardDockerClient {
    /// 엔드포인트가 없으면 로컬 기본값으로 연결합니다.
    ///
    /// `unix://`, `tcp://`, `http://` 형식을 지원합니다.
    pub fn connect(endpoint: Option<&str>) -> Result<Self, DockerError> {
        let docker = match endpoint {
            None => Docker::connect_with_local_defaults()?,
            Some(endpoint) if endpoint.starts_with("unix://") => {
                Self::connect_unix(endpoint)?
            }
            Some(endpoint) if endpoint.starts_with("tcp://") || endpoint.starts_with("http://") => {
                let addr = endpoint.replacen("tcp://", "http://", 1);
                Docker::connect_with_http(&addr, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)?
            }
            Some(endpoint) => {
                return Err(DockerError::EndpointError {
                    endpoint: endpoint.to_string(),
                    reason: "지원하지 않는 스킴".to_string(),
                })
            }
        };
        Ok(Self(docker))
    }

    #[cfg(unix)]
    fn connect_unix(endpoint: &str) -> Result<Docker, DockerError> {
        Ok(Docker::connect_with_unix(endpoint, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)?)
    }

    #[cfg(not(unix))]
    fn connect_unix(endpoint: &str) -> Result<Docker, DockerError> {
        Err(DockerError::EndpointError {
            endpoint: endpoint.to_string(),
            reason: "유닉스 소켓은 이 플랫폼에서 지원되지 않음".to_string(),
        })
    }
}

#[async_trait]
impl DockerClient for BollardDockerClient {
    async fn list_containers(
        &self,
        options: Option<ListContainersOptions<String>>,
    ) -> Result<Vec<ContainerSummary>, DockerError> {
        self.0
            .list_containers(options)
            .await
            .map_err(|e| DockerError::ListContainersError {
                source: e,
                context: "라우팅 가능한 컨테이너 조회 중 오류".to_string(),
            })
    }

    fn events(&self, options: Option<EventsOptions<String>>) -> EventStream {
        Box::pin(
            self.0
                .events(options)
                .map(|event| event.map_err(|source| DockerError::EventStreamError { source })),
        )
    }
}
