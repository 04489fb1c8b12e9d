//! 설정 파이프라인
//!
//! 모든 프로바이더의 스냅샷을 하나의 채널로 모으고, 프로바이더별 최신 스냅샷을 합쳐
//! 검증한 뒤 새 라우트 테이블을 만들어 프록시에 교체해 넣습니다.

mod builder;

pub use builder::build_route_table;

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::dynamic::Configuration;
use crate::provider::{Provider, ProviderMessage};
use crate::proxy::Proxy;
use crate::settings::EntryPointSettings;

/// 프로바이더 → 파이프라인 채널 크기
pub const CHANNEL_CAPACITY: usize = 100;

/// 프로바이더마다 태스크를 하나씩 띄우고 결과 채널을 돌려줍니다.
pub fn spawn_providers<P>(providers: Vec<P>) -> (mpsc::Receiver<ProviderMessage>, Vec<JoinHandle<()>>)
where
    P: Provider + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let handles = providers
        .into_iter()
        .map(|provider| {
            let tx = tx.clone();
            let span = info_span!("provider", name = %provider.name());
            tokio::spawn(
                async move {
                    info!("프로바이더 시작");
                    match provider.provide(tx).await {
                        Ok(()) => info!("프로바이더 종료"),
                        Err(e) => error!(error = %e, "프로바이더 실패"),
                    }
                }
                .instrument(span),
            )
        })
        .collect();
    (rx, handles)
}

/// 여러 스냅샷을 하나로 합칩니다.
///
/// 프로바이더 이름 순으로 합치며, 같은 이름의 라우터나 서비스가 있으면 먼저 합쳐진 쪽이 남습니다.
pub fn merge(snapshots: &BTreeMap<String, Configuration>) -> Configuration {
    let mut merged = Configuration::default();

    for (provider, config) in snapshots {
        for (name, router) in &config.routers {
            if merged.routers.contains_key(name) {
                warn!(provider = %provider, router = %name, "라우터 이름 충돌, 먼저 등록된 설정 유지");
                continue;
            }
            merged.routers.insert(name.clone(), router.clone());
        }
        for (name, service) in &config.services {
            if merged.services.contains_key(name) {
                warn!(provider = %provider, service = %name, "서비스 이름 충돌, 먼저 등록된 설정 유지");
                continue;
            }
            merged.services.insert(name.clone(), service.clone());
        }
    }

    merged
}

pub struct ConfigurationPipeline {
    entrypoints: BTreeMap<String, EntryPointSettings>,
    proxy: Arc<Proxy>,
    snapshots: BTreeMap<String, Configuration>,
    current: Arc<RwLock<Configuration>>,
}

impl ConfigurationPipeline {
    pub fn new(entrypoints: BTreeMap<String, EntryPointSettings>, proxy: Arc<Proxy>) -> Self {
        Self {
            entrypoints,
            proxy,
            snapshots: BTreeMap::new(),
            current: Arc::new(RwLock::new(Configuration::default())),
        }
    }

    /// 현재 적용된 (병합, 검증된) 설정
    pub fn current(&self) -> Arc<RwLock<Configuration>> {
        self.current.clone()
    }

    /// 스냅샷 하나를 반영합니다. 해당 프로바이더의 이전 스냅샷은 완전히 대체됩니다.
    pub async fn apply(&mut self, message: ProviderMessage) {
        info!(
            provider = %message.provider,
            routers = message.configuration.routers.len(),
            services = message.configuration.services.len(),
            "새 설정 수신"
        );
        self.snapshots.insert(message.provider, message.configuration);

        let config = merge(&self.snapshots).validated();
        let table = build_route_table(&config, &self.entrypoints);
        self.proxy.replace_routes(table);
        *self.current.write().await = config;
    }

    /// 채널이 닫힐 때까지 스냅샷을 계속 반영합니다.
    pub async fn run(mut self, mut rx: mpsc::Receiver<ProviderMessage>) {
        while let Some(message) = rx.recv().await {
            self.apply(message).await;
        }
        info!("모든 프로바이더가 종료됨, 마지막 설정 유지");
    }
}
