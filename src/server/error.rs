use thiserror::Error;

use crate::proxy::ProxyError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("프록시 에러: {0}")]
    Proxy(#[from] ProxyError),

    #[error("API 서버 바인딩 실패 ({address}): {source}")]
    ApiBind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}
