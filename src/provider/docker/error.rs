use std::fmt;

#[derive(Debug)]
pub enum DockerError {
    /// Docker 데몬 연결 실패
    ConnectionError {
        source: bollard::errors::Error,
        context: String,
    },
    /// 컨테이너 목록 조회 실패
    ListContainersError {
        source: bollard::errors::Error,
        context: String,
    },
    /// 이벤트 스트림 오류
    EventStreamError {
        source: bollard::errors::Error,
    },
    /// 엔드포인트 설정 오류
    EndpointError {
        endpoint: String,
        reason: String,
    },
}

impl DockerError {
    /// 재시도할 가치가 있는 에러인지 여부
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DockerError::ConnectionError { .. }
                | DockerError::ListContainersError { .. }
                | DockerError::EventStreamError { .. }
        )
    }
}

impl fmt::Display for DockerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DockerError::ConnectionError { source, context } =>
                write!(f, "Docker 데몬 연결 실패 ({}): {}", context, source),
            DockerError::ListContainersError { source, context } =>
                write!(f, "컨테이너 목록 조회 실패 ({}): {}", context, source),
            DockerError::EventStreamError { source } =>
                write!(f, "Docker 이벤트 스트림 오류: {}", source),
            DockerError::EndpointError { endpoint, reason } =>
                write!(f, "Docker 엔드포인트 {} 설정 오류: {}", endpoint, reason),
        }
    }
}

impl std::error::Error for DockerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DockerError::ConnectionError { source, .. }
            | DockerError::ListContainersError { source, .. }
            | DockerError::EventStreamError { source } => Some(source),
            DockerError::EndpointError { .. } => None,
        }
    }
}

impl From<bollard::errors::Error> for DockerError {
    fn from(err: bollard::errors::Error) -> Self {
        DockerError::ConnectionError {
            source: err,
            context: "Docker 데몬 연결 실패".to_string(),
        }
    }
}
