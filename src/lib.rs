//! rproxy는 Host 헤더를 엿보고 연결을 백엔드로 그대로 중계하는 TCP 리버스 프록시입니다.
//!
//! # 주요 기능
//!
//! - 엔트리포인트별 리스너와 순서 있는 라우트 규칙 (Host 정확히 일치, 항상 매칭)
//! - 엿본 바이트를 백엔드에 그대로 재생하는 양방향 중계, PROXY protocol v1
//! - Docker 라벨과 설정 파일에서 동적 설정을 받아 실행 중에 라우트 교체
//!
//! # 예제
//!
//! ```
//! use rproxy::dynamic::{Configuration, Router, Service};
//! use rproxy::pipeline::build_route_table;
//! use rproxy::settings::EntryPointSettings;
//! use std::collections::BTreeMap;
//!
//! let mut config = Configuration::default();
//! config.routers.insert("web".into(), Router::new("web").with_host("web.local"));
//! config.services.insert("web".into(), Service::with_servers(["http://10.0.0.5:8080"]));
//!
//! let mut entrypoints = BTreeMap::new();
//! entrypoints.insert("web".to_string(), EntryPointSettings::new("0.0.0.0:80"));
//!
//! let table = build_route_table(&config.validated(), &entrypoints);
//! assert_eq!(table.routes_for("0.0.0.0:80").len(), 1);
//! ```

pub mod dynamic;
pub mod logging;
pub mod pipeline;
pub mod provider;
pub mod proxy;
pub mod server;
pub mod settings;
