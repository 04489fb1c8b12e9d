//! 프로토콜을 인식하는 TCP 연결 라우터
//!
//! 리슨 주소마다 규칙 목록을 두고, 연결이 들어오면 규칙을 순서대로 평가해서
//! 첫 번째로 매칭된 [`Target`]에 연결을 넘깁니다. 매칭되는 규칙이 없으면 연결을 닫습니다.
//!
//! ```no_run
//! use rproxy::proxy::{DialProxy, Proxy};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), rproxy::proxy::ProxyError> {
//! let mut proxy = Proxy::new();
//! proxy.add_http_host_route("0.0.0.0:80", "foo.com", Arc::new(DialProxy::to("10.0.0.5:8080")));
//! proxy.add_route("0.0.0.0:80", Arc::new(DialProxy::to("10.0.0.9:8080")));
//! proxy.start().await?;
//! proxy.wait().await
//! # }
//! ```

mod balancer;
mod conn;
mod dial;
mod error;
pub mod proxy_protocol;
mod route;
pub mod sniff;

pub use balancer::ServiceTarget;
pub use conn::Conn;
pub use dial::{DialErrorFn, DialFn, DialProxy, DialTimeout, DEFAULT_DIAL_TIMEOUT, DEFAULT_KEEP_ALIVE};
pub use error::{DialError, ProxyError, Result};
pub use route::{equals, select, Matcher, Route, RouteTable, Target};

use futures_util::future::BoxFuture;
use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockWriteGuard};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, info_span, warn, Instrument};

use sniff::PeekReader;

/// 리스너를 여는 함수. 인자는 `(network, address)`입니다.
pub type ListenFn =
    Arc<dyn Fn(String, String) -> BoxFuture<'static, io::Result<TcpListener>> + Send + Sync>;

/// `tcp` 네트워크만 허용하는 기본 리슨 함수
pub fn default_listen_fn() -> ListenFn {
    Arc::new(|network: String, address: String| -> BoxFuture<'static, io::Result<TcpListener>> {
        Box::pin(async move {
            if network != "tcp" {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    ProxyError::InvalidNetwork { network },
                ));
            }
            TcpListener::bind(address).await
        })
    })
}

#[derive(Default)]
struct RunState {
    started: bool,
    accept_tasks: Vec<JoinHandle<()>>,
    local_addrs: BTreeMap<String, SocketAddr>,
    errors: Option<mpsc::Receiver<ProxyError>>,
}

pub struct Proxy {
    table: Arc<RwLock<Arc<RouteTable>>>,
    listen: ListenFn,
    state: Mutex<RunState>,
}

impl Default for Proxy {
    fn default() -> Self {
        Self::new()
    }
}

impl Proxy {
    pub fn new() -> Self {
        Self {
            table: Arc::new(RwLock::new(Arc::new(RouteTable::new()))),
            listen: default_listen_fn(),
            state: Mutex::new(RunState::default()),
        }
    }

    pub fn with_listen_fn(mut self, listen: ListenFn) -> Self {
        self.listen = listen;
        self
    }

    /// 항상 매칭되는 규칙을 추가합니다.
    pub fn add_route(&mut self, address: impl Into<String>, target: Arc<dyn Target>) {
        Arc::make_mut(&mut self.table_mut()).add_route(address, target);
    }

    /// Host 값이 정확히 `host`일 때 매칭되는 규칙을 추가합니다.
    pub fn add_http_host_route(
        &mut self,
        address: impl Into<String>,
        host: impl Into<String>,
        target: Arc<dyn Target>,
    ) {
        Arc::make_mut(&mut self.table_mut()).add_http_host_route(address, host, target);
    }

    pub fn add_http_host_match_route(
        &mut self,
        address: impl Into<String>,
        matcher: Matcher,
        target: Arc<dyn Target>,
    ) {
        Arc::make_mut(&mut self.table_mut()).add_http_host_match_route(address, matcher, target);
    }

    fn table_mut(&mut self) -> RwLockWriteGuard<'_, Arc<RouteTable>> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 현재 게시된 라우트 테이블
    pub fn routes(&self) -> Arc<RouteTable> {
        current_table(&self.table)
    }

    /// 라우트 테이블을 통째로 교체합니다. 진행 중인 연결에는 영향이 없습니다.
    pub fn replace_routes(&self, table: RouteTable) {
        {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.started {
                for address in table.addresses() {
                    if !state.local_addrs.contains_key(address) {
                        warn!(address = %address, "리스너가 없는 주소의 라우트는 사용되지 않음");
                    }
                }
            }
        }

        let count = table.len();
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(table);
        info!(route_count = count, "라우트 테이블 교체 완료");
    }

    /// 등록된 모든 주소에 리스너를 열고 연결 수락을 시작합니다.
    ///
    /// 하나라도 바인딩에 실패하면 이번 호출에서 연 리스너를 모두 닫고 에러를 돌려줍니다.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.started {
                return Err(ProxyError::AlreadyStarted);
            }
            state.started = true;
        }

        let addresses: Vec<String> = self.routes().addresses().map(String::from).collect();
        let mut bound = Vec::with_capacity(addresses.len());
        for address in addresses {
            match (self.listen)("tcp".to_string(), address.clone()).await {
                Ok(listener) => bound.push((address, listener)),
                Err(source) => {
                    error!(address = %address, error = %source, "리스너 바인딩 실패, 열린 리스너 정리");
                    return Err(ProxyError::Bind { address, source });
                }
            }
        }

        let (err_tx, err_rx) = mpsc::channel(bound.len().max(1));
        let mut tasks = Vec::with_capacity(bound.len());
        let mut local_addrs = BTreeMap::new();
        for (address, listener) in bound {
            if let Ok(local) = listener.local_addr() {
                local_addrs.insert(address.clone(), local);
            }
            info!(address = %address, "리스너 시작");
            tasks.push(tokio::spawn(serve_listener(
                address,
                listener,
                self.table.clone(),
                err_tx.clone(),
            )));
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.accept_tasks = tasks;
        state.local_addrs = local_addrs;
        state.errors = Some(err_rx);
        Ok(())
    }

    /// 주소별로 실제 바인딩된 소켓 주소
    pub fn local_addrs(&self) -> BTreeMap<String, SocketAddr> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .local_addrs
            .clone()
    }

    pub fn local_addr(&self, address: &str) -> Option<SocketAddr> {
        self.local_addrs().get(address).copied()
    }

    /// 리스너를 모두 닫습니다. 진행 중인 중계는 스스로 끝날 때까지 유지됩니다.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for task in state.accept_tasks.drain(..) {
            task.abort();
        }
        info!("모든 리스너 종료");
    }

    /// 첫 번째 리스너 에러가 날 때까지 기다립니다.
    ///
    /// [`close`](Self::close)로 모든 리스너가 닫히면 `Ok(())`입니다.
    pub async fn wait(&self) -> Result<()> {
        let errors = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .errors
            .take();

        match errors {
            Some(mut rx) => match rx.recv().await {
                Some(e) => Err(e),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for task in state.accept_tasks.drain(..) {
            task.abort();
        }
    }
}

fn current_table(table: &RwLock<Arc<RouteTable>>) -> Arc<RouteTable> {
    table.read().unwrap_or_else(PoisonError::into_inner).clone()
}

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// 연결 하나에만 해당하거나 곧 풀리는 accept 에러인지 판단합니다.
/// 이런 에러로는 리스너를 닫지 않습니다.
fn is_transient_accept_error(error: &io::Error) -> bool {
    // EMFILE, ENFILE, ENOMEM (리눅스와 BSD 계열 공통 값)
    #[cfg(unix)]
    const RESOURCE_EXHAUSTED: [i32; 3] = [24, 23, 12];
    #[cfg(not(unix))]
    const RESOURCE_EXHAUSTED: [i32; 0] = [];

    match error.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut => true,
        _ => error
            .raw_os_error()
            .is_some_and(|code| RESOURCE_EXHAUSTED.contains(&code)),
    }
}

async fn serve_listener(
    address: String,
    listener: TcpListener,
    table: Arc<RwLock<Arc<RouteTable>>>,
    errors: mpsc::Sender<ProxyError>,
) {
    let mut backoff = ACCEPT_BACKOFF_MIN;
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                backoff = ACCEPT_BACKOFF_MIN;
                let routes = current_table(&table);
                let span = info_span!("connection", peer = %peer, address = %address);
                tokio::spawn(serve_conn(stream, address.clone(), routes).instrument(span));
            }
            Err(source) if is_transient_accept_error(&source) => {
                warn!(address = %address, error = %source, delay_ms = backoff.as_millis() as u64, "일시적인 연결 수락 실패, 재시도");
                sleep(backoff).await;
                backoff = (backoff * 2).min(ACCEPT_BACKOFF_MAX);
            }
            Err(source) => {
                error!(address = %address, error = %source, "연결 수락 실패, 리스너 종료");
                let _ = errors.send(ProxyError::Accept { address, source }).await;
                return;
            }
        }
    }
}

async fn serve_conn(stream: TcpStream, address: String, table: Arc<RouteTable>) {
    let mut reader = PeekReader::new(stream);
    match select(table.routes_for(&address), &mut reader).await {
        Some((target, host)) => {
            let (stream, peeked) = reader.into_parts();
            let conn = Conn::new(stream).with_peeked(peeked, host);
            debug!(conn_id = %conn.id, host = ?conn.host_name, peeked = conn.peeked.len(), "라우트 매칭");
            target.handle_conn(conn).await;
        }
        None => {
            debug!("매칭되는 라우트 없음, 연결 종료");
        }
    }
}
