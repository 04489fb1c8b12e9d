use std::net::SocketAddr;
use tokio::net::TcpStream;
use uuid::Uuid;

/// 라우팅이 끝난 클라이언트 연결
///
/// 스니핑 중 이미 읽은 바이트(`peeked`)는 백엔드로 가장 먼저, 정확히 한 번 전달되어야 합니다.
#[derive(Debug)]
pub struct Conn {
    pub id: Uuid,
    pub stream: TcpStream,
    pub peeked: Vec<u8>,
    /// 매칭에 쓰인 Host 값 (진단용)
    pub host_name: Option<String>,
}

impl Conn {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            id: Uuid::new_v4(),
            stream,
            peeked: Vec::new(),
            host_name: None,
        }
    }

    pub fn with_peeked(mut self, peeked: Vec<u8>, host_name: Option<String>) -> Self {
        self.peeked = peeked;
        self.host_name = host_name;
        self
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.peer_addr().ok()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.stream.local_addr().ok()
    }

    /// 재전송할 바이트를 꺼냅니다. 두 번째 호출부터는 빈 벡터입니다.
    pub fn take_peeked(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.peeked)
    }
}
