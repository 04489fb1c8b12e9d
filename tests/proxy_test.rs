use async_trait::async_trait;
use futures_util::future::BoxFuture;
use rproxy::proxy::{default_listen_fn, equals, Conn, DialProxy, Proxy, ProxyError, ServiceTarget, Target};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

const LISTEN: &str = "127.0.0.1:0";

// 연결을 받으면 이름과 Host, 엿본 바이트를 보고하는 목적지
struct RecordingTarget {
    name: &'static str,
    tx: mpsc::UnboundedSender<(&'static str, Option<String>, Vec<u8>)>,
}

#[async_trait]
impl Target for RecordingTarget {
    async fn handle_conn(&self, conn: Conn) {
        let _ = self.tx.send((self.name, conn.host_name.clone(), conn.peeked.clone()));
    }
}

fn recorder(
    name: &'static str,
    tx: &mpsc::UnboundedSender<(&'static str, Option<String>, Vec<u8>)>,
) -> Arc<dyn Target> {
    Arc::new(RecordingTarget { name, tx: tx.clone() })
}

async fn started(proxy: Proxy) -> (Arc<Proxy>, SocketAddr) {
    let proxy = Arc::new(proxy);
    proxy.start().await.unwrap();
    let addr = proxy.local_addr(LISTEN).unwrap();
    (proxy, addr)
}

async fn send_request(addr: SocketAddr, host: &str) -> TcpStream {
    let mut client = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET / HTTP/1.1\r\nHost: {}\r\nAccept: */*\r\n\r\n", host);
    client.write_all(request.as_bytes()).await.unwrap();
    client
}

// 지정한 바이트 수만큼 읽은 뒤 받은 내용을 돌려주고 `reply`로 응답하는 백엔드
async fn backend(expect: usize, reply: &'static [u8]) -> (SocketAddr, tokio::task::JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut received = vec![0u8; expect];
        stream.read_exact(&mut received).await.unwrap();
        stream.write_all(reply).await.unwrap();
        received
    });
    (addr, handle)
}

#[tokio::test]
async fn test_host_route_and_fallback() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut proxy = Proxy::new();
    proxy.add_http_host_route(LISTEN, "web.local", recorder("web", &tx));
    proxy.add_route(LISTEN, recorder("fallback", &tx));
    let (_proxy, addr) = started(proxy).await;

    let _client = send_request(addr, "web.local").await;
    let (name, host, peeked) = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(name, "web");
    assert_eq!(host.as_deref(), Some("web.local"));
    assert!(peeked.starts_with(b"GET / HTTP/1.1\r\n"));

    let _client = send_request(addr, "other.local").await;
    let (name, _, _) = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(name, "fallback");
}

#[tokio::test]
async fn test_host_match_route() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut proxy = Proxy::new();
    proxy.add_http_host_match_route(
        LISTEN,
        Arc::new(|host: &str| host.ends_with(".example.com")),
        recorder("wildcard", &tx),
    );
    let (_proxy, addr) = started(proxy).await;

    let _client = send_request(addr, "api.example.com").await;
    let (name, host, _) = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(name, "wildcard");
    assert_eq!(host.as_deref(), Some("api.example.com"));
}

#[tokio::test]
async fn test_duplicate_fixed_route_first_wins() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut proxy = Proxy::new();
    proxy.add_route(LISTEN, recorder("first", &tx));
    proxy.add_route(LISTEN, recorder("second", &tx));
    assert_eq!(proxy.routes().routes_for(LISTEN).len(), 2);
    let (_proxy, addr) = started(proxy).await;

    // 고정 규칙은 데이터를 기다리지 않습니다.
    let _client = TcpStream::connect(addr).await.unwrap();
    let (name, host, peeked) = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(name, "first");
    assert!(host.is_none());
    assert!(peeked.is_empty());
}

#[tokio::test]
async fn test_no_match_closes_connection() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut proxy = Proxy::new();
    proxy.add_http_host_route(LISTEN, "web.local", recorder("web", &tx));
    let (_proxy, addr) = started(proxy).await;

    let mut client = send_request(addr, "other.local").await;
    let mut buf = [0u8; 16];
    let result = timeout(Duration::from_secs(5), client.read(&mut buf)).await.unwrap();
    assert!(matches!(result, Ok(0) | Err(_)));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_equals_matcher_requires_exact_host() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut proxy = Proxy::new();
    proxy.add_http_host_match_route(LISTEN, equals("web.local"), recorder("web", &tx));
    proxy.add_route(LISTEN, recorder("fallback", &tx));
    let (_proxy, addr) = started(proxy).await;

    let _client = send_request(addr, "web.local.evil").await;
    let (name, _, _) = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(name, "fallback");
}

#[tokio::test]
async fn test_relay_with_proxy_protocol_v1() {
    let request = b"GET / HTTP/1.1\r\nHost: web.local\r\n\r\n";

    let backend_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_addr = backend_listener.local_addr().unwrap();

    let mut proxy = Proxy::new();
    proxy.add_http_host_route(
        LISTEN,
        "web.local",
        Arc::new(DialProxy::to(backend_addr.to_string()).with_proxy_protocol(1)),
    );
    let (_proxy, proxy_addr) = started(proxy).await;

    // 헤더 길이는 클라이언트 포트에 따라 달라지므로 연결 후에 기대값을 만듭니다.
    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let client_addr = client.local_addr().unwrap();
    let header = format!(
        "PROXY TCP4 {} {} {} {}\r\n",
        client_addr.ip(),
        client_addr.port(),
        proxy_addr.ip(),
        proxy_addr.port()
    );
    let expected: Vec<u8> = header.as_bytes().iter().chain(request.iter()).copied().collect();

    let expect_len = expected.len();
    let backend_task = tokio::spawn(async move {
        let (mut stream, _) = backend_listener.accept().await.unwrap();
        let mut received = vec![0u8; expect_len];
        stream.read_exact(&mut received).await.unwrap();
        stream.write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n").await.unwrap();
        received
    });

    client.write_all(request).await.unwrap();

    let mut response = Vec::new();
    timeout(Duration::from_secs(5), client.read_to_end(&mut response))
        .await
        .unwrap()
        .unwrap();
    assert!(response.starts_with(b"HTTP/1.1 200 OK"));

    let received = backend_task.await.unwrap();
    assert_eq!(received, expected);
}

#[tokio::test]
async fn test_peeked_bytes_replayed_once_in_order() {
    // Host 헤더가 없고 스니핑 한도보다 긴 요청 머리
    let mut payload = b"GET / HTTP/1.1\r\nX-Pad: ".to_vec();
    payload.extend(std::iter::repeat(b'a').take(6000));
    let total = payload.len();

    let (backend_addr, backend_task) = backend(total, b"done").await;

    let mut proxy = Proxy::new();
    proxy.add_http_host_route(LISTEN, "web.local", Arc::new(DialProxy::to("127.0.0.1:1")));
    proxy.add_route(
        LISTEN,
        Arc::new(ServiceTarget::new("pad", vec![DialProxy::to(backend_addr.to_string())])),
    );
    let (_proxy, addr) = started(proxy).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&payload).await.unwrap();

    let mut reply = [0u8; 4];
    timeout(Duration::from_secs(5), client.read_exact(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&reply, b"done");

    let received = backend_task.await.unwrap();
    assert_eq!(received, payload);
}

#[tokio::test]
async fn test_dial_failure_closes_client() {
    // 닫힌 포트를 얻기 위해 바인딩 후 바로 닫습니다.
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();

    let mut proxy = Proxy::new();
    proxy.add_route(LISTEN, Arc::new(DialProxy::to(closed.to_string())));
    let (_proxy, addr) = started(proxy).await;

    let mut client = send_request(addr, "web.local").await;
    let mut buf = [0u8; 16];
    let result = timeout(Duration::from_secs(5), client.read(&mut buf)).await.unwrap();
    assert!(matches!(result, Ok(0) | Err(_)));
}

#[tokio::test]
async fn test_double_start_fails() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut proxy = Proxy::new();
    proxy.add_route(LISTEN, recorder("a", &tx));
    let (proxy, _) = started(proxy).await;

    assert!(matches!(proxy.start().await, Err(ProxyError::AlreadyStarted)));
}

#[tokio::test]
async fn test_bind_failure_rolls_back_listeners() {
    let opened: Arc<Mutex<Vec<SocketAddr>>> = Arc::new(Mutex::new(Vec::new()));
    let opened_clone = opened.clone();
    let default_listen = default_listen_fn();

    let listen = Arc::new(move |network: String, address: String| -> BoxFuture<'static, io::Result<TcpListener>> {
        let opened = opened_clone.clone();
        let default_listen = default_listen.clone();
        Box::pin(async move {
            if address.starts_with("fail") {
                return Err(io::Error::new(io::ErrorKind::AddrInUse, "bind refused"));
            }
            let listener = default_listen(network, address).await?;
            opened.lock().unwrap().push(listener.local_addr()?);
            Ok(listener)
        })
    });

    let (tx, _rx) = mpsc::unbounded_channel();
    let mut proxy = Proxy::new().with_listen_fn(listen);
    proxy.add_route(LISTEN, recorder("a", &tx));
    proxy.add_route("fail:1", recorder("b", &tx));

    match proxy.start().await {
        Err(ProxyError::Bind { address, .. }) => assert_eq!(address, "fail:1"),
        other => panic!("unexpected result: {:?}", other.err()),
    }
    assert!(proxy.local_addrs().is_empty());

    let opened = opened.lock().unwrap().clone();
    assert_eq!(opened.len(), 1);
    assert!(TcpStream::connect(opened[0]).await.is_err());
}

#[tokio::test]
async fn test_default_listen_rejects_non_tcp() {
    let listen = default_listen_fn();
    let err = listen("udp".to_string(), LISTEN.to_string()).await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    assert!(err.to_string().contains("invalid network"));
}

#[tokio::test]
async fn test_close_ends_wait() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut proxy = Proxy::new();
    proxy.add_route(LISTEN, recorder("a", &tx));
    let (proxy, addr) = started(proxy).await;

    proxy.close();
    timeout(Duration::from_secs(5), proxy.wait()).await.unwrap().unwrap();

    // 리스너가 닫혔으므로 연결되지 않습니다.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_replace_routes_applies_to_new_connections() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut proxy = Proxy::new();
    proxy.add_route(LISTEN, recorder("old", &tx));
    let (proxy, addr) = started(proxy).await;

    let mut table = rproxy::proxy::RouteTable::new();
    table.add_route(LISTEN, recorder("new", &tx));
    proxy.replace_routes(table);

    let _client = TcpStream::connect(addr).await.unwrap();
    let (name, _, _) = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(name, "new");
}
