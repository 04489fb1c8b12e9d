//! 백엔드로 직접 연결해서 바이트를 중계하는 목적지

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use super::conn::Conn;
use super::error::DialError;
use super::proxy_protocol;
use super::route::Target;
use crate::logging::{log_connection, ConnectionLog};

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// 백엔드 연결 함수. 테스트나 사용자 정의 다이얼에 씁니다.
pub type DialFn = Arc<dyn Fn(String) -> BoxFuture<'static, io::Result<TcpStream>> + Send + Sync>;

/// 다이얼 실패 처리 함수. 클라이언트 연결의 소유권을 넘겨받습니다.
pub type DialErrorFn = Arc<dyn Fn(Conn, &DialError) + Send + Sync>;

/// 다이얼 타임아웃 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialTimeout {
    /// 기본값 (10초)
    #[default]
    Default,
    /// 기한 없음
    Unbounded,
    Fixed(Duration),
}

impl DialTimeout {
    /// 밀리초 값으로 정책을 만듭니다. 음수는 기한 없음, 0은 기본값입니다.
    pub fn from_millis(ms: i64) -> Self {
        match ms {
            ms if ms < 0 => DialTimeout::Unbounded,
            0 => DialTimeout::Default,
            ms => DialTimeout::Fixed(Duration::from_millis(ms as u64)),
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        match self {
            DialTimeout::Default => Some(DEFAULT_DIAL_TIMEOUT),
            DialTimeout::Unbounded => None,
            DialTimeout::Fixed(d) if d.is_zero() => Some(DEFAULT_DIAL_TIMEOUT),
            DialTimeout::Fixed(d) => Some(*d),
        }
    }
}

#[derive(Clone)]
pub struct DialProxy {
    addr: String,
    dial_timeout: DialTimeout,
    /// `None`이면 기본값, 0이면 keep-alive를 끕니다.
    keep_alive: Option<Duration>,
    dialer: Option<DialFn>,
    on_dial_error: Option<DialErrorFn>,
    proxy_protocol_version: u8,
}

impl fmt::Debug for DialProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialProxy")
            .field("addr", &self.addr)
            .field("dial_timeout", &self.dial_timeout)
            .field("keep_alive", &self.keep_alive)
            .field("proxy_protocol_version", &self.proxy_protocol_version)
            .finish()
    }
}

impl DialProxy {
    /// 기본 설정으로 `addr`에 연결하는 목적지를 만듭니다.
    pub fn to(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            dial_timeout: DialTimeout::Default,
            keep_alive: None,
            dialer: None,
            on_dial_error: None,
            proxy_protocol_version: 0,
        }
    }

    pub fn with_dial_timeout(mut self, timeout: DialTimeout) -> Self {
        self.dial_timeout = timeout;
        self
    }

    pub fn with_keep_alive(mut self, period: Duration) -> Self {
        self.keep_alive = Some(period);
        self
    }

    pub fn with_dialer(mut self, dialer: DialFn) -> Self {
        self.dialer = Some(dialer);
        self
    }

    pub fn on_dial_error(mut self, handler: DialErrorFn) -> Self {
        self.on_dial_error = Some(handler);
        self
    }

    pub fn with_proxy_protocol(mut self, version: u8) -> Self {
        self.proxy_protocol_version = version;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn keep_alive_period(&self) -> Option<Duration> {
        match self.keep_alive {
            None => Some(DEFAULT_KEEP_ALIVE),
            Some(d) if d.is_zero() => None,
            Some(d) => Some(d),
        }
    }

    async fn dial(&self) -> Result<TcpStream, DialError> {
        let connect: BoxFuture<'static, io::Result<TcpStream>> = match &self.dialer {
            Some(dialer) => dialer(self.addr.clone()),
            None => {
                let addr = self.addr.clone();
                Box::pin(async move { TcpStream::connect(addr).await })
            }
        };

        let result = match self.dial_timeout.deadline() {
            Some(timeout) => tokio::time::timeout(timeout, connect)
                .await
                .map_err(|_| DialError::Timeout {
                    address: self.addr.clone(),
                    timeout,
                })?,
            None => connect.await,
        };

        result.map_err(|source| DialError::Connect {
            address: self.addr.clone(),
            source,
        })
    }

    fn dial_failed(&self, conn: Conn, error: DialError) {
        match &self.on_dial_error {
            Some(handler) => handler(conn, &error),
            None => {
                warn!(
                    conn_id = %conn.id,
                    client = ?conn.peer_addr(),
                    backend = %self.addr,
                    error = %error,
                    "백엔드 연결 실패, 클라이언트 연결 종료"
                );
            }
        }
    }

    fn apply_keep_alive(&self, stream: &TcpStream) {
        let Some(period) = self.keep_alive_period() else {
            return;
        };
        let keepalive = socket2::TcpKeepalive::new().with_time(period);
        if let Err(e) = socket2::SockRef::from(stream).set_tcp_keepalive(&keepalive) {
            debug!(error = %e, "keep-alive 설정 실패");
        }
    }
}

#[async_trait]
impl Target for DialProxy {
    async fn handle_conn(&self, mut conn: Conn) {
        let mut dst = match self.dial().await {
            Ok(dst) => dst,
            Err(e) => return self.dial_failed(conn, e),
        };

        self.apply_keep_alive(&conn.stream);
        self.apply_keep_alive(&dst);

        let header = match proxy_protocol::encode(
            self.proxy_protocol_version,
            conn.peer_addr(),
            conn.local_addr(),
        ) {
            Ok(header) => header,
            Err(e) => return self.dial_failed(conn, e),
        };
        if !header.is_empty() {
            if let Err(e) = dst.write_all(&header).await {
                return self.dial_failed(conn, DialError::Preamble(e));
            }
        }

        let mut log = ConnectionLog::new(&conn, &self.addr);
        let peeked = conn.take_peeked();
        let (mut src_read, mut src_write) = conn.stream.into_split();
        let (mut dst_read, mut dst_write) = dst.into_split();

        let mut upstream = tokio::spawn(async move {
            dst_write.write_all(&peeked).await?;
            let copied = tokio::io::copy(&mut src_read, &mut dst_write).await?;
            Ok::<u64, io::Error>(copied + peeked.len() as u64)
        });
        let mut downstream =
            tokio::spawn(async move { tokio::io::copy(&mut dst_read, &mut src_write).await });

        // 먼저 끝나는 방향이 세션을 끝냅니다.
        let outcome = tokio::select! {
            res = &mut upstream => {
                downstream.abort();
                let _ = downstream.await;
                res.map(|r| r.map(|n| (Some(n), None)))
            }
            res = &mut downstream => {
                upstream.abort();
                let _ = upstream.await;
                res.map(|r| r.map(|n| (None, Some(n))))
            }
        };

        match outcome {
            Ok(Ok((to_backend, to_client))) => {
                log.bytes_to_backend = to_backend;
                log.bytes_to_client = to_client;
            }
            Ok(Err(e)) => log.with_error(e),
            Err(e) => log.with_error(e),
        }
        log_connection(&log);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dial_timeout_from_millis() {
        assert_eq!(DialTimeout::from_millis(-1).deadline(), None);
        assert_eq!(DialTimeout::from_millis(0).deadline(), Some(DEFAULT_DIAL_TIMEOUT));
        assert_eq!(
            DialTimeout::from_millis(250).deadline(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(
            DialTimeout::Fixed(Duration::ZERO).deadline(),
            Some(DEFAULT_DIAL_TIMEOUT)
        );
    }

    #[test]
    fn test_keep_alive_period() {
        let proxy = DialProxy::to("127.0.0.1:1");
        assert_eq!(proxy.keep_alive_period(), Some(DEFAULT_KEEP_ALIVE));

        let proxy = proxy.with_keep_alive(Duration::ZERO);
        assert_eq!(proxy.keep_alive_period(), None);

        let proxy = proxy.with_keep_alive(Duration::from_secs(5));
        assert_eq!(proxy.keep_alive_period(), Some(Duration::from_secs(5)));
    }
}
