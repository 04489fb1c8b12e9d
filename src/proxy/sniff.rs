//! HTTP Host 헤더 스니핑
//!
//! 연결의 앞부분을 최대 [`MAX_PEEK`] 바이트까지만 읽어 Host 값을 찾습니다.
//! 읽은 바이트는 [`PeekReader::into_parts`]로 돌려받아 백엔드에 그대로 재전송합니다.

use tokio::io::{AsyncRead, AsyncReadExt};

/// 스니핑에 사용하는 최대 버퍼 크기
pub const MAX_PEEK: usize = 4 << 10;

const CRLF_CRLF: &[u8] = b"\r\n\r\n";
const LF_LF: &[u8] = b"\n\n";
const LF_HOST_COLON: &[u8] = b"\nhost:";

/// 스트림 앞부분을 버퍼에 쌓아 두는 리더
///
/// 버퍼에 들어간 바이트는 호출자 입장에서 소비되지 않은 것으로 취급합니다.
pub struct PeekReader<R> {
    inner: R,
    buf: Vec<u8>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> PeekReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            eof: false,
        }
    }

    /// 지금까지 버퍼에 쌓인 바이트
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// 버퍼를 최소 `n` 바이트까지 채우려 시도합니다.
    ///
    /// 스트림에서 이미 도착한 만큼은 한 번에 가져오므로 결과가 `n`보다 길 수 있습니다.
    /// EOF이면 더 짧은 결과가 나옵니다. 버퍼는 [`MAX_PEEK`]를 넘지 않습니다.
    pub async fn peek(&mut self, n: usize) -> std::io::Result<&[u8]> {
        let n = n.min(MAX_PEEK);
        let mut chunk = [0u8; 1024];
        while self.buf.len() < n && !self.eof {
            let room = (MAX_PEEK - self.buf.len()).min(chunk.len());
            let read = self.inner.read(&mut chunk[..room]).await?;
            if read == 0 {
                self.eof = true;
            } else {
                self.buf.extend_from_slice(&chunk[..read]);
            }
        }
        Ok(&self.buf)
    }

    pub fn into_parts(self) -> (R, Vec<u8>) {
        (self.inner, self.buf)
    }
}

/// 버퍼링된 요청에서 Host 값을 찾습니다. 찾지 못하면 `None`입니다.
///
/// 첫 바이트가 대문자 ASCII가 아니면 HTTP 요청 라인이 아니므로 바로 포기합니다.
pub async fn http_host_header<R: AsyncRead + Unpin>(reader: &mut PeekReader<R>) -> Option<String> {
    let mut want = 1;
    loop {
        let result = reader.peek(want).await.map(|_| ());
        let b = reader.buffered();

        if let Some(&first) = b.first() {
            if !first.is_ascii_uppercase() {
                return None;
            }
            if contains(b, CRLF_CRLF) || contains(b, LF_LF) {
                return parse_request_host(b);
            }
        }

        if result.is_err() || reader.eof || b.len() >= MAX_PEEK {
            return host_header_from_bytes(b);
        }
        want = b.len() + 1;
    }
}

/// 요청 라인과 헤더 전체를 파싱해서 Host를 얻습니다.
///
/// Host 헤더가 두 번 이상 나오면 모호하므로 `None`입니다.
/// 요청 대상이 절대 URI이면 그 authority를 우선합니다.
fn parse_request_host(b: &[u8]) -> Option<String> {
    let mut capacity = 64;
    loop {
        let mut headers = vec![httparse::EMPTY_HEADER; capacity];
        let mut req = httparse::Request::new(&mut headers);
        match req.parse(b) {
            Ok(httparse::Status::Complete(_)) => {
                let mut hosts = req
                    .headers
                    .iter()
                    .filter(|h| h.name.eq_ignore_ascii_case("host"));
                let header = hosts.next();
                if hosts.next().is_some() {
                    return None;
                }

                if let Some(authority) = req.path.and_then(absolute_uri_authority) {
                    return Some(authority.to_string());
                }

                return header.map(|h| String::from_utf8_lossy(h.value).trim().to_string());
            }
            Ok(httparse::Status::Partial) => return host_header_from_bytes(b),
            Err(httparse::Error::TooManyHeaders) if capacity < MAX_PEEK / 2 => {
                capacity = MAX_PEEK / 2;
            }
            Err(_) => return None,
        }
    }
}

fn absolute_uri_authority(path: &str) -> Option<&str> {
    let (_, rest) = path.split_once("://")?;
    let end = rest.find(['/', '?']).unwrap_or(rest.len());
    let authority = &rest[..end];
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    (!authority.is_empty()).then_some(authority)
}

/// 완전한 파싱이 불가능할 때 `Host:` 줄을 직접 찾아 값을 잘라냅니다.
pub fn host_header_from_bytes(b: &[u8]) -> Option<String> {
    let lower = b.to_ascii_lowercase();
    let start = find(&lower, LF_HOST_COLON)? + LF_HOST_COLON.len();
    let rest = &b[start..];
    let line = match rest.iter().position(|&c| c == b'\n') {
        Some(end) => &rest[..end],
        None => rest,
    };
    Some(String::from_utf8_lossy(line).trim().to_string())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
