//! 관리 API
//!
//! - `GET /ping` → `OK`
//! - `GET /api/rawdata` → 현재 적용된 동적 설정 (JSON)

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

use super::{Error, Result};
use crate::dynamic::Configuration;

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

pub struct ApiServer {
    listener: TcpListener,
    config: Arc<RwLock<Configuration>>,
}

impl ApiServer {
    pub async fn bind(address: &str, config: Arc<RwLock<Configuration>>) -> Result<Self> {
        let listener = TcpListener::bind(address).await.map_err(|source| {
            error!(error = %source, address = %address, "API 포트 바인딩 실패");
            Error::ApiBind {
                address: address.to_string(),
                source,
            }
        })?;
        info!(address = %address, "API 리스너 시작");
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn serve(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let config = self.config.clone();
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| handle_request(config.clone(), req));
                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                            debug!(error = %err, peer = %peer, "API 연결 처리 실패");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "API 연결 수락 실패");
                    sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }
}

async fn handle_request(
    config: Arc<RwLock<Configuration>>,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/ping") => text_response(StatusCode::OK, "OK"),
        (&Method::GET, "/api/rawdata") => {
            let config = config.read().await;
            match serde_json::to_vec(&*config) {
                Ok(body) => {
                    let mut response = Response::new(Full::new(Bytes::from(body)));
                    response
                        .headers_mut()
                        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                    response
                }
                Err(e) => {
                    error!(error = %e, "설정 직렬화 실패");
                    text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                }
            }
        }
        (_, "/ping") | (_, "/api/rawdata") => text_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };
    Ok(response)
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_failure_backs_off() {
        assert!(ACCEPT_RETRY_DELAY >= Duration::from_millis(10));
        assert!(ACCEPT_RETRY_DELAY <= Duration::from_secs(1));
    }
}
