//! PROXY protocol 헤더 생성
//!
//! 버전 1(텍스트)만 지원합니다. 형식:
//! `PROXY TCP4|TCP6 <src ip> <src port> <dst ip> <dst port>\r\n`

use std::net::{IpAddr, SocketAddr};
use super::error::DialError;

/// 주소를 알 수 없을 때 보내는 헤더
pub const PROXY_V1_UNKNOWN: &str = "PROXY UNKNOWN\r\n";

/// 설정된 버전에 맞는 헤더 바이트를 만듭니다.
///
/// 버전 0이면 빈 벡터를 돌려주고, 지원하지 않는 버전이면 에러입니다.
pub fn encode(
    version: u8,
    src: Option<SocketAddr>,
    dst: Option<SocketAddr>,
) -> Result<Vec<u8>, DialError> {
    match version {
        0 => Ok(Vec::new()),
        1 => Ok(encode_v1(src, dst).into_bytes()),
        other => Err(DialError::UnsupportedProxyProtocol { version: other }),
    }
}

fn encode_v1(src: Option<SocketAddr>, dst: Option<SocketAddr>) -> String {
    let (Some(src), Some(dst)) = (src, dst) else {
        return PROXY_V1_UNKNOWN.to_string();
    };

    let src_ip = src.ip().to_canonical();
    let dst_ip = dst.ip().to_canonical();
    let family = match src_ip {
        IpAddr::V4(_) => "TCP4",
        IpAddr::V6(_) => "TCP6",
    };

    format!(
        "PROXY {} {} {} {} {}\r\n",
        family,
        src_ip,
        src.port(),
        dst_ip,
        dst.port()
    )
}
