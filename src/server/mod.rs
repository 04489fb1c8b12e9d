//! 프로세스 수명 관리
//!
//! 정적 설정으로 프록시 리스너를 열고, 프로바이더와 설정 파이프라인, 관리 API를 띄운 뒤
//! 종료 신호나 리스너 에러가 올 때까지 기다립니다.

mod api;
mod error;

pub use api::ApiServer;
pub use error::Error;

pub type Result<T> = std::result::Result<T, Error>;

use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::dynamic::Configuration;
use crate::pipeline::{build_route_table, spawn_providers, ConfigurationPipeline};
use crate::provider::ProviderRegistry;
use crate::proxy::Proxy;
use crate::settings::Settings;

pub struct Server {
    settings: Settings,
    registry: ProviderRegistry,
    proxy: Arc<Proxy>,
}

impl Server {
    pub fn new(settings: Settings, registry: ProviderRegistry) -> Self {
        Self::with_proxy(settings, registry, Proxy::new())
    }

    /// 리슨 함수 등을 미리 구성한 프록시로 서버를 만듭니다.
    pub fn with_proxy(settings: Settings, registry: ProviderRegistry, proxy: Proxy) -> Self {
        Self {
            settings,
            registry,
            proxy: Arc::new(proxy),
        }
    }

    pub fn proxy(&self) -> Arc<Proxy> {
        self.proxy.clone()
    }

    /// SIGINT 또는 SIGTERM을 받을 때까지 실행합니다.
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    #[instrument(skip_all, level = "info", err)]
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let entrypoints = self.settings.entrypoints.clone();

        // 프로바이더가 아무것도 보내지 않아도 엔트리포인트는 모두 열어 둡니다.
        self.proxy
            .replace_routes(build_route_table(&Configuration::default(), &entrypoints));
        self.proxy.start().await?;
        for (name, entrypoint) in &entrypoints {
            info!(
                entrypoint = %name,
                address = %entrypoint.address,
                local_addr = ?self.proxy.local_addr(&entrypoint.address),
                "엔트리포인트 준비 완료"
            );
        }

        let pipeline = ConfigurationPipeline::new(entrypoints, self.proxy.clone());
        let current = pipeline.current();

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        if self.settings.api.enabled {
            match ApiServer::bind(&self.settings.api.address, current).await {
                Ok(api) => tasks.push(tokio::spawn(api.serve())),
                Err(e) => {
                    self.proxy.close();
                    return Err(e);
                }
            }
        }

        let providers = self.registry.build(&self.settings.providers);
        if providers.is_empty() {
            warn!("활성화된 프로바이더가 없음, 라우트 없이 실행");
        }
        let (rx, provider_tasks) = spawn_providers(providers);
        tasks.extend(provider_tasks);
        tasks.push(tokio::spawn(pipeline.run(rx)));

        let result = tokio::select! {
            result = self.proxy.wait() => {
                if let Err(e) = &result {
                    error!(error = %e, "리스너 에러로 서버 종료");
                }
                result.map_err(Error::from)
            }
            _ = shutdown => {
                info!("종료 신호 수신");
                Ok(())
            }
        };

        self.proxy.close();
        for task in tasks {
            task.abort();
        }
        info!("서버 종료");
        result
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "SIGINT 핸들러 등록 실패");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "SIGTERM 핸들러 등록 실패");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
