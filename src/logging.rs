use std::ffi::OsStr;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, error, info, span, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::proxy::Conn;
use crate::settings::logging::{LogFormat, LogOutput, LogSettings};

/// 로깅 설정에 맞춰 전역 subscriber를 설치합니다.
///
/// 반환된 가드는 프로세스가 끝날 때까지 살아 있어야 버퍼된 로그가 모두 기록됩니다.
/// `RUST_LOG`가 설정되어 있으면 설정 파일의 레벨보다 우선합니다.
pub fn init_logging(settings: &LogSettings) -> WorkerGuard {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(settings.level).into())
        .from_env_lossy();

    let (writer, guard) = match &settings.output {
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::File(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let file_name = path.file_name().unwrap_or(OsStr::new("rproxy.log"));
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name))
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::new(Rfc3339))
        .with_writer(writer)
        .with_target(true);

    let result = match settings.format {
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
        LogFormat::Text => builder
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .try_init(),
    };
    if let Err(e) = result {
        eprintln!("로깅 초기화 실패: {}", e);
    }

    guard
}

/// 한 번의 중계 세션 요약
#[derive(Debug)]
pub struct ConnectionLog {
    pub conn_id: Uuid,
    pub client: Option<SocketAddr>,
    pub host: Option<String>,
    pub backend: String,
    pub started: Instant,
    /// 세션을 먼저 끝낸 방향만 값이 채워집니다.
    pub bytes_to_backend: Option<u64>,
    pub bytes_to_client: Option<u64>,
    pub error: Option<String>,
}

impl ConnectionLog {
    pub fn new(conn: &Conn, backend: &str) -> Self {
        debug!(conn_id = %conn.id, backend = %backend, "중계 세션 시작");
        Self {
            conn_id: conn.id,
            client: conn.peer_addr(),
            host: conn.host_name.clone(),
            backend: backend.to_string(),
            started: Instant::now(),
            bytes_to_backend: None,
            bytes_to_client: None,
            error: None,
        }
    }

    pub fn with_error(&mut self, error: impl std::fmt::Display) {
        self.error = Some(error.to_string());
    }

    pub fn duration_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }
}

pub fn log_connection(log: &ConnectionLog) {
    let level = if log.error.is_some() { Level::ERROR } else { Level::INFO };

    let span = span!(
        Level::INFO,
        "session",
        conn_id = %log.conn_id,
        client = ?log.client,
        host = ?log.host,
        backend = %log.backend,
        duration_ms = %log.duration_ms()
    );
    let _enter = span.enter();

    match level {
        Level::ERROR => error!(error = ?log.error, "중계 세션 비정상 종료"),
        _ => info!(
            bytes_to_backend = ?log.bytes_to_backend,
            bytes_to_client = ?log.bytes_to_client,
            "중계 세션 종료"
        ),
    }
}
