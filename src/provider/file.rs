//! 파일 기반 동적 설정 프로바이더

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{Provider, ProviderError, ProviderMessage};
use crate::dynamic::Configuration;
use crate::settings::{ConfigEvent, ConfigWatcher, FileSettings};

pub const PROVIDER_NAME: &str = "file";

/// TOML 또는 JSON(확장자 `.json`) 파일에서 스냅샷을 읽습니다.
pub struct FileProvider {
    settings: FileSettings,
}

impl FileProvider {
    pub fn new(settings: FileSettings) -> Self {
        Self { settings }
    }

    pub fn path(&self) -> &Path {
        &self.settings.path
    }

    pub async fn load(&self) -> Result<Configuration, ProviderError> {
        let path = self.path();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ProviderError::File {
                path: path.to_path_buf(),
                source,
            })?;

        let is_json = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));

        let parsed = if is_json {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            toml::from_str(&content).map_err(|e| e.to_string())
        };

        parsed.map_err(|reason| ProviderError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn is_our_file(&self, event: &ConfigEvent) -> bool {
        if matches!(event, ConfigEvent::Deleted(_)) {
            return false;
        }
        event.path().file_name() == self.path().file_name()
    }
}

#[async_trait]
impl Provider for FileProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn provide(&self, tx: mpsc::Sender<ProviderMessage>) -> Result<(), ProviderError> {
        let mut last = match self.load().await {
            Ok(configuration) => {
                info!(path = %self.path().display(), routers = configuration.routers.len(), "설정 파일 로드");
                tx.send(ProviderMessage::new(PROVIDER_NAME, configuration.clone()))
                    .await
                    .map_err(|_| ProviderError::ChannelClosed)?;
                Some(configuration)
            }
            Err(e) if self.settings.watch => {
                error!(error = %e, "설정 파일 로드 실패, 변경 감시는 계속함");
                None
            }
            Err(e) => return Err(e),
        };

        if !self.settings.watch {
            return Ok(());
        }

        let mut watcher = ConfigWatcher::new();
        watcher.add_path(self.path());
        watcher.start()?;

        while let Some(event) = watcher.watch().await {
            if !self.is_our_file(&event) {
                continue;
            }

            match self.load().await {
                Ok(configuration) if last.as_ref() == Some(&configuration) => {
                    debug!(path = %self.path().display(), "변경 없음");
                }
                Ok(configuration) => {
                    info!(path = %self.path().display(), "설정 파일 변경 감지, 다시 로드");
                    tx.send(ProviderMessage::new(PROVIDER_NAME, configuration.clone()))
                        .await
                        .map_err(|_| ProviderError::ChannelClosed)?;
                    last = Some(configuration);
                }
                Err(e) => error!(error = %e, "설정 파일 다시 로드 실패"),
            }
        }

        Ok(())
    }
}
