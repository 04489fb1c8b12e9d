use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::io::AsyncRead;

use super::conn::Conn;
use super::sniff::{http_host_header, PeekReader};

/// 매칭된 연결을 넘겨받는 목적지
#[async_trait]
pub trait Target: Send + Sync {
    async fn handle_conn(&self, conn: Conn);
}

/// 스니핑한 Host 값에 대한 조건. Host를 찾지 못하면 빈 문자열이 전달됩니다.
pub type Matcher = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// 정확히 같은 Host에만 매칭되는 조건
pub fn equals(want: impl Into<String>) -> Matcher {
    let want = want.into();
    Arc::new(move |got: &str| got == want)
}

#[derive(Clone)]
pub enum Route {
    /// 항상 매칭
    Fixed { target: Arc<dyn Target> },
    /// Host 값이 조건을 만족할 때 매칭
    HttpHost { matcher: Matcher, target: Arc<dyn Target> },
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Fixed { .. } => f.write_str("Route::Fixed"),
            Route::HttpHost { .. } => f.write_str("Route::HttpHost"),
        }
    }
}

/// 리슨 주소별 규칙 목록. 한 번 게시된 테이블은 바뀌지 않고 통째로 교체됩니다.
#[derive(Clone, Default, Debug)]
pub struct RouteTable {
    routes: BTreeMap<String, Vec<Route>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_route(&mut self, address: impl Into<String>, target: Arc<dyn Target>) {
        self.push(address.into(), Route::Fixed { target });
    }

    pub fn add_http_host_route(
        &mut self,
        address: impl Into<String>,
        host: impl Into<String>,
        target: Arc<dyn Target>,
    ) {
        self.add_http_host_match_route(address, equals(host), target);
    }

    pub fn add_http_host_match_route(
        &mut self,
        address: impl Into<String>,
        matcher: Matcher,
        target: Arc<dyn Target>,
    ) {
        self.push(address.into(), Route::HttpHost { matcher, target });
    }

    /// 주소에 대한 빈 규칙 목록을 만들어 둡니다. 매칭되는 규칙이 없으면 연결은 닫힙니다.
    pub fn ensure_address(&mut self, address: impl Into<String>) {
        self.routes.entry(address.into()).or_default();
    }

    fn push(&mut self, address: String, route: Route) {
        self.routes.entry(address).or_default().push(route);
    }

    pub fn routes_for(&self, address: &str) -> &[Route] {
        self.routes.get(address).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// 전체 규칙 개수
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 규칙을 순서대로 평가해서 첫 번째로 매칭된 목적지를 고릅니다.
///
/// Host 스니핑은 처음 필요한 순간에 한 번만 수행되고 결과는 이후 규칙들이 공유합니다.
pub async fn select<R: AsyncRead + Unpin>(
    routes: &[Route],
    reader: &mut PeekReader<R>,
) -> Option<(Arc<dyn Target>, Option<String>)> {
    let mut sniffed: Option<Option<String>> = None;

    for route in routes {
        match route {
            Route::Fixed { target } => {
                return Some((target.clone(), sniffed.flatten()));
            }
            Route::HttpHost { matcher, target } => {
                if sniffed.is_none() {
                    sniffed = Some(http_host_header(reader).await);
                }
                let host = sniffed.clone().flatten();
                if matcher(host.as_deref().unwrap_or("")) {
                    return Some((target.clone(), host));
                }
            }
        }
    }

    None
}
