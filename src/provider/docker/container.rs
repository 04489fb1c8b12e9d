//! 컨테이너 메타데이터를 동적 설정으로 바꾸는 순수 함수들

use bollard::models::{ContainerSummary, PortTypeEnum};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::dynamic::{Configuration, Router, Server, Service};
use crate::settings::DockerSettings;

/// docker compose가 붙이는 서비스 이름 라벨
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

/// 포트 정보가 전혀 없을 때 쓰는 포트
pub const DEFAULT_PORT: u16 = 80;

/// 컨테이너의 라우터 라벨 하나에서 뽑은 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub container_id: String,
    pub router_name: String,
    pub service_name: String,
    pub host: String,
    /// 선택된 네트워크의 IP. 찾지 못하면 `None`
    pub address: Option<String>,
    pub port: u16,
    pub entry_points: Vec<String>,
}

impl ContainerInfo {
    pub fn server_url(&self) -> Option<String> {
        self.address
            .as_ref()
            .map(|address| format!("http://{}:{}", address, self.port))
    }
}

/// 실행 중인 컨테이너에서 라우터 라벨마다 [`ContainerInfo`]를 만듭니다.
pub fn extract_info(container: &ContainerSummary, settings: &DockerSettings) -> Vec<ContainerInfo> {
    let container_id = container.id.as_deref().unwrap_or("unknown");

    let running = container
        .state
        .as_deref()
        .map_or(false, |state| state.eq_ignore_ascii_case("running"));
    if !running {
        debug!(container_id = %container_id, state = ?container.state, "실행 중이 아닌 컨테이너 제외");
        return Vec::new();
    }

    let Some(labels) = container.labels.as_ref() else {
        return Vec::new();
    };

    let router_prefix = format!("{}routers.", settings.label_prefix);
    let mut router_names: Vec<&str> = labels
        .keys()
        .filter_map(|key| key.strip_prefix(&router_prefix)?.strip_suffix(".host"))
        .filter(|name| !name.is_empty() && !name.contains('.'))
        .collect();
    router_names.sort_unstable();

    let address = container_address(container, settings.network.as_deref());
    if address.is_none() && !router_names.is_empty() {
        warn!(container_id = %container_id, "컨테이너 네트워크 주소를 찾을 수 없음");
    }

    router_names
        .into_iter()
        .filter_map(|router_name| {
            let label = |suffix: &str| labels.get(&format!("{}{}.{}", router_prefix, router_name, suffix));

            let value = label("host").map(|v| v.trim()).unwrap_or_default();
            let service_name = if value.is_empty() {
                labels.get(COMPOSE_SERVICE_LABEL).map(|v| v.trim()).unwrap_or_default()
            } else {
                value
            };
            if service_name.is_empty() {
                warn!(
                    container_id = %container_id,
                    router = %router_name,
                    "라우터 라벨 값과 compose 서비스 라벨이 모두 비어 있음"
                );
                return None;
            }

            let port = label("port")
                .and_then(|p| p.trim().parse::<u16>().ok())
                .or_else(|| lowest_private_port(container))
                .unwrap_or(DEFAULT_PORT);

            let entry_points = label("entrypoints")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();

            Some(ContainerInfo {
                container_id: container_id.to_string(),
                router_name: router_name.to_string(),
                service_name: service_name.to_string(),
                host: service_name.to_string(),
                address: address.clone(),
                port,
                entry_points,
            })
        })
        .collect()
}

/// 컨테이너가 사용하는 네트워크의 IP를 고릅니다.
///
/// 설정된 네트워크, 컨테이너의 네트워크 모드, 유일하게 붙은 네트워크 순으로 찾습니다.
pub fn container_address(container: &ContainerSummary, network: Option<&str>) -> Option<String> {
    let networks = container
        .network_settings
        .as_ref()
        .and_then(|s| s.networks.as_ref())?;

    let network_mode = container
        .host_config
        .as_ref()
        .and_then(|h| h.network_mode.as_deref())
        .map(|mode| if mode == "default" { "bridge" } else { mode });

    let endpoint = network
        .and_then(|name| networks.get(name))
        .or_else(|| network_mode.and_then(|mode| networks.get(mode)))
        .or_else(|| single_value(networks))?;

    let ip = endpoint.ip_address.as_deref().filter(|ip| !ip.is_empty())?;
    if ip.contains(':') {
        Some(format!("[{}]", ip))
    } else {
        Some(ip.to_string())
    }
}

fn single_value<V>(map: &HashMap<String, V>) -> Option<&V> {
    if map.len() == 1 {
        map.values().next()
    } else {
        None
    }
}

fn lowest_private_port(container: &ContainerSummary) -> Option<u16> {
    container
        .ports
        .as_ref()?
        .iter()
        .filter(|p| matches!(p.typ, None | Some(PortTypeEnum::TCP) | Some(PortTypeEnum::EMPTY)))
        .map(|p| p.private_port)
        .filter(|&port| port != 0)
        .min()
}

/// 컨테이너 목록 전체로 스냅샷 하나를 만듭니다.
///
/// 같은 서비스 이름을 가진 컨테이너들은 서버 목록으로 합쳐지고, 라우터는 처음 나온 것만 남습니다.
pub fn build_configuration(containers: &[ContainerSummary], settings: &DockerSettings) -> Configuration {
    let mut config = Configuration::default();

    for info in containers.iter().flat_map(|c| extract_info(c, settings)) {
        let service = config
            .services
            .entry(info.service_name.clone())
            .or_insert_with(Service::default);

        match info.server_url() {
            Some(url) => {
                let servers = &mut service.load_balancer.servers;
                if !servers.iter().any(|server| server.url == url) {
                    servers.push(Server { url });
                }
            }
            None => debug!(
                container_id = %info.container_id,
                service = %info.service_name,
                "주소가 없는 컨테이너, 서버 추가 생략"
            ),
        }

        config
            .routers
            .entry(info.service_name.clone())
            .or_insert_with(|| {
                debug!(
                    container_id = %info.container_id,
                    router = %info.router_name,
                    service = %info.service_name,
                    "새 라우터 생성"
                );
                Router::new(info.service_name.clone())
                    .with_host(info.host.clone())
                    .with_entry_points(info.entry_points.clone())
            });
    }

    config
}
