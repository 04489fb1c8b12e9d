//! 동적 설정 모델
//!
//! 프로바이더가 만들어 내는 라우팅 그래프(라우터 → 서비스 → 서버)의 스냅샷입니다.
//! 스냅샷은 항상 통째로 전달되며 이전 스냅샷을 완전히 대체합니다.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;
use url::Url;

/// 하나의 완전한 라우팅 스냅샷
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub routers: BTreeMap<String, Router>,
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
}

/// 매칭 규칙과 서비스 하나를 묶는 라우터
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Router {
    pub service: String,
    /// 정확히 일치해야 하는 Host 값. 없으면 모든 연결에 매칭됩니다.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// 비어 있으면 모든 엔트리포인트에 적용됩니다.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry_points: Vec<String>,
}

impl Router {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            host: None,
            entry_points: Vec::new(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_entry_points(mut self, entry_points: Vec<String>) -> Self {
        self.entry_points = entry_points;
        self
    }

    pub fn applies_to(&self, entry_point: &str) -> bool {
        self.entry_points.is_empty() || self.entry_points.iter().any(|ep| ep == entry_point)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub load_balancer: LoadBalancer,
}

impl Service {
    pub fn with_servers<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            load_balancer: LoadBalancer {
                servers: urls.into_iter().map(|url| Server { url: url.into() }).collect(),
            },
        }
    }

    pub fn servers(&self) -> &[Server] {
        &self.load_balancer.servers
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    #[serde(default)]
    pub servers: Vec<Server>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub url: String,
}

impl Server {
    /// URL에서 `host:port` 다이얼 주소를 뽑아냅니다.
    ///
    /// 포트가 없으면 스킴의 기본 포트를 씁니다.
    pub fn dial_address(&self) -> Option<String> {
        let url = Url::parse(&self.url).ok()?;
        let host = url.host_str()?;
        let port = url.port_or_known_default()?;
        if host.contains(':') && !host.starts_with('[') {
            Some(format!("[{}]:{}", host, port))
        } else {
            Some(format!("{}:{}", host, port))
        }
    }
}

impl Configuration {
    pub fn is_empty(&self) -> bool {
        self.routers.is_empty() && self.services.is_empty()
    }

    /// 라우팅에 쓸 수 없는 항목을 걸러낸 스냅샷을 돌려줍니다.
    ///
    /// - 주소를 얻을 수 없는 서버 URL은 버립니다.
    /// - 없는 서비스를 가리키는 라우터는 버립니다.
    /// - 서버가 하나도 없는 서비스는 남겨 두지만 그 서비스를 가리키는 라우터는 버립니다.
    pub fn validated(mut self) -> Self {
        for (name, service) in self.services.iter_mut() {
            service.load_balancer.servers.retain(|server| {
                let ok = server.dial_address().is_some();
                if !ok {
                    warn!(service = %name, url = %server.url, "서버 URL 해석 실패, 서버 제외");
                }
                ok
            });
        }

        let services = &self.services;
        self.routers.retain(|name, router| match services.get(&router.service) {
            None => {
                warn!(router = %name, service = %router.service, "존재하지 않는 서비스를 가리키는 라우터 제외");
                false
            }
            Some(service) if service.servers().is_empty() => {
                warn!(router = %name, service = %router.service, "서버가 없는 서비스, 라우터 제외");
                false
            }
            Some(_) => true,
        });

        self
    }
}
