use rproxy::provider::{FileProvider, Provider, ProviderError};
use rproxy::settings::FileSettings;
use std::path::Path;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration};

const DYNAMIC_TOML: &str = r#"
[routers.web]
service = "web"
host = "web.local"
entryPoints = ["web"]

[services.web.loadBalancer]
servers = [{ url = "http://10.0.0.5:8080" }, { url = "http://10.0.0.6:8080" }]
"#;

fn provider(path: &Path, watch: bool) -> FileProvider {
    FileProvider::new(FileSettings {
        path: path.to_path_buf(),
        watch,
    })
}

#[tokio::test]
async fn test_load_toml_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dynamic.toml");
    std::fs::write(&path, DYNAMIC_TOML).unwrap();

    let config = provider(&path, false).load().await.unwrap();
    let router = &config.routers["web"];
    assert_eq!(router.service, "web");
    assert_eq!(router.host.as_deref(), Some("web.local"));
    assert_eq!(router.entry_points, vec!["web"]);
    assert_eq!(config.services["web"].servers().len(), 2);
}

#[tokio::test]
async fn test_load_json_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dynamic.json");
    std::fs::write(
        &path,
        r#"{
            "routers": { "api": { "service": "api" } },
            "services": { "api": { "loadBalancer": { "servers": [ { "url": "http://10.0.0.9:9000" } ] } } }
        }"#,
    )
    .unwrap();

    let config = provider(&path, false).load().await.unwrap();
    assert!(config.routers["api"].host.is_none());
    assert_eq!(config.services["api"].servers()[0].url, "http://10.0.0.9:9000");
}

#[tokio::test]
async fn test_missing_and_malformed_files_are_errors() {
    let dir = tempfile::tempdir().unwrap();

    let missing = dir.path().join("missing.toml");
    let (tx, _rx) = mpsc::channel(1);
    assert!(matches!(
        provider(&missing, false).provide(tx).await,
        Err(ProviderError::File { .. })
    ));

    let malformed = dir.path().join("broken.toml");
    std::fs::write(&malformed, "[routers.web\nservice = ").unwrap();
    assert!(matches!(
        provider(&malformed, false).load().await,
        Err(ProviderError::Parse { .. })
    ));
}

#[tokio::test]
async fn test_provide_without_watch_sends_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dynamic.toml");
    std::fs::write(&path, DYNAMIC_TOML).unwrap();

    let (tx, mut rx) = mpsc::channel(4);
    provider(&path, false).provide(tx).await.unwrap();

    let message = rx.recv().await.unwrap();
    assert_eq!(message.provider, "file");
    assert_eq!(message.configuration.routers.len(), 1);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_watch_reemits_on_change() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dynamic.toml");
    std::fs::write(&path, DYNAMIC_TOML).unwrap();

    let (tx, mut rx) = mpsc::channel(4);
    let file_provider = provider(&path, true);
    let task = tokio::spawn(async move { file_provider.provide(tx).await });

    let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert!(first.configuration.routers.contains_key("web"));

    // 감시자가 준비될 시간을 줍니다.
    sleep(Duration::from_millis(200)).await;
    std::fs::write(
        &path,
        r#"
[routers.api]
service = "api"

[services.api.loadBalancer]
servers = [{ url = "http://10.0.0.7:80" }]
"#,
    )
    .unwrap();

    let second = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert!(second.configuration.routers.contains_key("api"));
    assert!(!second.configuration.routers.contains_key("web"));

    task.abort();
}
