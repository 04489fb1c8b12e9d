use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::conn::Conn;
use super::dial::DialProxy;
use super::route::Target;

/// 서비스의 서버들에게 연결을 라운드 로빈으로 나눠 주는 목적지
#[derive(Debug)]
pub struct ServiceTarget {
    name: String,
    servers: Vec<DialProxy>,
    current_index: AtomicUsize,
}

impl ServiceTarget {
    pub fn new(name: impl Into<String>, servers: Vec<DialProxy>) -> Self {
        Self {
            name: name.into(),
            servers,
            current_index: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn servers(&self) -> &[DialProxy] {
        &self.servers
    }

    /// 다음 서버를 고릅니다. 서버가 없으면 `None`입니다.
    pub fn next_server(&self) -> Option<&DialProxy> {
        let len = self.servers.len();
        if len == 0 {
            return None;
        }
        let index = self.current_index.fetch_add(1, Ordering::Relaxed) % len;
        self.servers.get(index)
    }
}

#[async_trait]
impl Target for ServiceTarget {
    async fn handle_conn(&self, conn: Conn) {
        match self.next_server() {
            Some(server) => server.handle_conn(conn).await,
            None => {
                tracing::warn!(service = %self.name, conn_id = %conn.id, "서버가 없는 서비스, 연결 종료");
            }
        }
    }
}
