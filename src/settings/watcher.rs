use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use notify::{RecommendedWatcher, RecursiveMode, Watcher, Event, Result as NotifyResult};
use crate::settings::{Result, error::SettingsError};
use tracing::{debug, error};

/// 설정 파일 변경 이벤트 타입
#[derive(Debug, PartialEq, Clone)]
pub enum ConfigEvent {
    /// 파일이 수정됨
    Modified(PathBuf),
    /// 파일이 생성됨
    Created(PathBuf),
    /// 파일이 삭제됨
    Deleted(PathBuf),
}

impl ConfigEvent {
    pub fn path(&self) -> &Path {
        match self {
            ConfigEvent::Modified(p) | ConfigEvent::Created(p) | ConfigEvent::Deleted(p) => p,
        }
    }
}

/// 설정 파일 감시자
///
/// 에디터가 파일을 교체하는 경우에도 놓치지 않도록 파일이 아닌 부모 디렉토리를 감시합니다.
pub struct ConfigWatcher {
    /// 감시할 파일/디렉토리 경로 목록
    paths: Vec<PathBuf>,
    /// 이벤트 송신자
    event_tx: mpsc::Sender<ConfigEvent>,
    /// 이벤트 수신자
    event_rx: mpsc::Receiver<ConfigEvent>,
    /// 파일 시스템 감시자
    watcher: Option<RecommendedWatcher>,
}

impl ConfigWatcher {
    /// 새로운 ConfigWatcher 인스턴스 생성
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::channel(32);
        Self {
            paths: Vec::new(),
            event_tx,
            event_rx,
            watcher: None,
        }
    }

    /// 감시할 경로 추가
    pub fn add_path<P: Into<PathBuf>>(&mut self, path: P) {
        self.paths.push(path.into());
    }

    /// 테스트용 이벤트 송신자 반환
    #[cfg(test)]
    pub fn get_sender(&self) -> mpsc::Sender<ConfigEvent> {
        self.event_tx.clone()
    }

    /// 감시 시작
    pub fn start(&mut self) -> Result<()> {
        let event_tx = self.event_tx.clone();

        // notify의 이벤트를 ConfigEvent로 변환하여 채널로 전송하는 핸들러
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res: NotifyResult<Event>| {
            match res {
                Ok(event) => {
                    use notify::EventKind::*;

                    for path in event.paths {
                        let config_event = match event.kind {
                            Modify(_) => ConfigEvent::Modified(path),
                            Create(_) => ConfigEvent::Created(path),
                            Remove(_) => ConfigEvent::Deleted(path),
                            _ => continue,
                        };
                        debug!(event = ?config_event, "파일 변경 감지");
                        let _ = event_tx.blocking_send(config_event);
                    }
                }
                Err(e) => error!("감시 오류: {}", e),
            }
        }).map_err(|e| SettingsError::WatchError(e.to_string()))?;

        for path in &self.paths {
            let target = watch_target(path);
            debug!("경로 감시 시작: {}", target.display());
            watcher.watch(&target, RecursiveMode::NonRecursive)
                .map_err(|e| SettingsError::WatchError(e.to_string()))?;
        }

        self.watcher = Some(watcher);
        Ok(())
    }

    /// 이벤트 수신 대기
    pub async fn watch(&mut self) -> Option<ConfigEvent> {
        self.event_rx.recv().await
    }
}

/// 파일이면 부모 디렉토리를, 디렉토리면 그대로 돌려줍니다.
fn watch_target(path: &Path) -> PathBuf {
    if path.is_dir() {
        return path.to_path_buf();
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

impl Default for ConfigWatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_config_watcher() {
        let mut watcher = ConfigWatcher::new();
        let tx = watcher.get_sender();
        let test_path = Path::new("/test/dynamic.toml").to_path_buf();

        tx.send(ConfigEvent::Created(test_path.clone())).await.unwrap();

        match watcher.watch().await {
            Some(event) => {
                assert_eq!(event.path(), test_path.as_path());
                assert_eq!(event, ConfigEvent::Created(test_path));
            }
            None => panic!("이벤트를 받지 못했습니다"),
        }
    }

    #[test]
    fn test_watch_target_is_parent_dir() {
        assert_eq!(watch_target(Path::new("conf/dynamic.toml")), PathBuf::from("conf"));
        assert_eq!(watch_target(Path::new("dynamic.toml")), PathBuf::from("."));
    }
}
