use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::dynamic::Configuration;
use crate::proxy::{DialProxy, RouteTable, ServiceTarget, Target};
use crate::settings::EntryPointSettings;

/// 검증된 스냅샷과 엔트리포인트로 라우트 테이블을 만듭니다.
///
/// 엔트리포인트마다 Host 규칙을 라우터 이름 순으로 먼저 두고, Host가 없는 라우터는
/// 그 뒤에 항상 매칭 규칙으로 붙입니다. 라우터가 하나도 없는 엔트리포인트도 주소는 등록됩니다.
pub fn build_route_table(
    config: &Configuration,
    entrypoints: &BTreeMap<String, EntryPointSettings>,
) -> RouteTable {
    let mut table = RouteTable::new();

    for (ep_name, entrypoint) in entrypoints {
        table.ensure_address(&entrypoint.address);
        let mut catch_all: Vec<Arc<dyn Target>> = Vec::new();

        for (router_name, router) in config.routers.iter().filter(|(_, r)| r.applies_to(ep_name)) {
            let Some(service) = config.services.get(&router.service) else {
                warn!(router = %router_name, service = %router.service, "서비스 없음, 라우터 건너뜀");
                continue;
            };

            let servers: Vec<DialProxy> = service
                .servers()
                .iter()
                .filter_map(|server| server.dial_address())
                .map(|address| entrypoint.dial_proxy(address))
                .collect();
            if servers.is_empty() {
                continue;
            }

            debug!(
                entrypoint = %ep_name,
                router = %router_name,
                host = ?router.host,
                servers = servers.len(),
                "라우트 추가"
            );
            let target: Arc<dyn Target> = Arc::new(ServiceTarget::new(&router.service, servers));
            match &router.host {
                Some(host) => table.add_http_host_route(&entrypoint.address, host.clone(), target),
                None => catch_all.push(target),
            }
        }

        for target in catch_all {
            table.add_route(&entrypoint.address, target);
        }
    }

    table
}
