//! Docker 라벨 기반 서비스 발견

mod client;
pub mod container;
mod error;
mod retry;

pub use client::{BollardDockerClient, DockerClient, EventStream};
pub use container::{build_configuration, ContainerInfo};
pub use error::DockerError;
pub use retry::{with_retry, RetryPolicy, RetryableOperation};

use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::{EventMessage, EventMessageTypeEnum};
use bollard::system::EventsOptions;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use super::{Provider, ProviderError, ProviderMessage};
use crate::dynamic::Configuration;
use crate::settings::DockerSettings;

pub const PROVIDER_NAME: &str = "docker";

/// 라우팅 테이블에 영향을 주는 컨테이너 이벤트
const WATCHED_ACTIONS: &[&str] = &["start", "stop", "die", "destroy", "update", "pause", "unpause"];

pub struct DockerProvider<C: DockerClient> {
    client: C,
    settings: DockerSettings,
    policy: RetryPolicy,
}

struct ListContainersRetry<'a, C: DockerClient> {
    client: &'a C,
}

#[async_trait]
impl<'a, C: DockerClient> RetryableOperation for ListContainersRetry<'a, C> {
    type Output = Vec<bollard::models::ContainerSummary>;

    async fn execute(&self) -> Result<Self::Output, DockerError> {
        let options = Some(ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        });
        self.client.list_containers(options).await
    }
}

impl DockerProvider<BollardDockerClient> {
    /// 설정된 엔드포인트로 Docker에 연결합니다.
    pub fn connect(settings: DockerSettings) -> Result<Self, DockerError> {
        let client = BollardDockerClient::connect(settings.endpoint.as_deref())?;
        Ok(Self::new(client, settings))
    }
}

impl<C: DockerClient> DockerProvider<C> {
    pub fn new(client: C, settings: DockerSettings) -> Self {
        let policy = RetryPolicy::from(&settings.retry);
        Self {
            client,
            settings,
            policy,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 컨테이너 목록을 새로 조회해서 스냅샷을 만듭니다. 이전 결과는 캐시하지 않습니다.
    #[instrument(skip(self), level = "debug", err)]
    pub async fn discover(&self) -> Result<Configuration, DockerError> {
        info!("컨테이너 라우트 조회 시작");
        let containers = with_retry(&ListContainersRetry { client: &self.client }, &self.policy).await?;
        info!(count = containers.len(), "컨테이너 목록 조회 성공");

        let config = build_configuration(&containers, &self.settings);
        if config.routers.is_empty() {
            warn!("사용 가능한 라우트가 없음");
        } else {
            info!(
                router_count = config.routers.len(),
                service_count = config.services.len(),
                "Docker 설정 구성 완료"
            );
        }
        Ok(config)
    }

    async fn publish(&self, tx: &mpsc::Sender<ProviderMessage>) -> Result<(), ProviderError> {
        match self.discover().await {
            Ok(configuration) => tx
                .send(ProviderMessage::new(PROVIDER_NAME, configuration))
                .await
                .map_err(|_| ProviderError::ChannelClosed),
            Err(e) => {
                // 이번 주기에는 아무것도 보내지 않습니다.
                error!(error = %e, "컨테이너 조회 실패");
                Ok(())
            }
        }
    }

    fn event_filters() -> HashMap<String, Vec<String>> {
        let mut filters = HashMap::new();
        filters.insert("type".to_string(), vec!["container".to_string()]);
        filters.insert(
            "event".to_string(),
            WATCHED_ACTIONS.iter().map(|a| a.to_string()).collect(),
        );
        filters
    }

    /// 이벤트 스트림이 끝나거나 오류가 날 때까지 이벤트마다 스냅샷을 다시 보냅니다.
    async fn watch_events(&self, tx: &mpsc::Sender<ProviderMessage>) -> Result<(), ProviderError> {
        let options = EventsOptions::<String> {
            filters: Self::event_filters(),
            ..Default::default()
        };
        let mut events = self.client.events(Some(options));

        while let Some(event) = events.next().await {
            match event {
                Ok(event) if is_relevant(&event) => {
                    info!(
                        container_id = ?event.actor.as_ref().and_then(|a| a.id.as_deref()),
                        action = ?event.action,
                        "컨테이너 이벤트 수신, 설정 재구성"
                    );
                    self.publish(tx).await?;
                }
                Ok(event) => {
                    debug!(action = ?event.action, "처리되지 않는 이벤트");
                }
                Err(e) => {
                    warn!(error = %e, "Docker 이벤트 스트림 오류");
                    return Ok(());
                }
            }
        }

        warn!("Docker 이벤트 스트림 종료");
        Ok(())
    }
}

fn is_relevant(event: &EventMessage) -> bool {
    event.typ == Some(EventMessageTypeEnum::CONTAINER)
        && event
            .action
            .as_deref()
            .map_or(false, |action| WATCHED_ACTIONS.contains(&action))
}

#[async_trait]
impl<C: DockerClient> Provider for DockerProvider<C> {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn provide(&self, tx: mpsc::Sender<ProviderMessage>) -> Result<(), ProviderError> {
        self.publish(&tx).await?;

        if !self.settings.watch {
            return Ok(());
        }

        loop {
            self.watch_events(&tx).await?;
            if tx.is_closed() {
                return Err(ProviderError::ChannelClosed);
            }
            tokio::time::sleep(self.policy.interval.max(Duration::from_secs(1))).await;
            info!("Docker 이벤트 재구독");
            // 재구독 직후에는 전체를 다시 조회합니다.
            self.publish(&tx).await?;
        }
    }
}
