use std::time::Duration;

/// 연결 라우터 수준의 에러
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("already started")]
    AlreadyStarted,

    #[error("invalid network: {network}")]
    InvalidNetwork { network: String },

    #[error("리스너 바인딩 실패 ({address}): {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("연결 수락 실패 ({address}): {source}")]
    Accept {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// 백엔드 다이얼 단계의 에러
#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error("백엔드 {address} 연결 타임아웃 ({timeout:?})")]
    Timeout { address: String, timeout: Duration },

    #[error("백엔드 {address} 연결 실패: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("proxy protocol version {version} not supported")]
    UnsupportedProxyProtocol { version: u8 },

    #[error("PROXY 헤더 전송 실패: {0}")]
    Preamble(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProxyError>;
