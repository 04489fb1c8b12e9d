use std::path::PathBuf;

use super::docker::DockerError;
use crate::settings::SettingsError;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Docker 프로바이더 오류: {0}")]
    Docker(#[from] DockerError),

    #[error("설정 파일 {path} 읽기 실패: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("설정 파일 {path} 파싱 실패: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("알 수 없는 프로바이더: {name}")]
    UnknownProvider { name: String },

    #[error("프로바이더 {name} 설정이 없습니다")]
    MissingSettings { name: String },

    #[error("설정 채널이 닫혔습니다")]
    ChannelClosed,
}
