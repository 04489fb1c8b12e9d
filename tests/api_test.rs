use rproxy::dynamic::{Configuration, Router, Service};
use rproxy::server::ApiServer;
use std::sync::Arc;
use tokio::sync::RwLock;

async fn start_api(config: Configuration) -> (String, Arc<RwLock<Configuration>>) {
    let shared = Arc::new(RwLock::new(config));
    let api = ApiServer::bind("127.0.0.1:0", shared.clone()).await.unwrap();
    let base = format!("http://{}", api.local_addr().unwrap());
    tokio::spawn(api.serve());
    (base, shared)
}

#[tokio::test]
async fn test_ping() {
    let (base, _) = start_api(Configuration::default()).await;

    let res = reqwest::get(format!("{}/ping", base)).await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_rawdata_reflects_current_configuration() {
    let (base, shared) = start_api(Configuration::default()).await;

    let body: serde_json::Value = reqwest::get(format!("{}/api/rawdata", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["routers"], serde_json::json!({}));

    {
        let mut config = shared.write().await;
        config
            .routers
            .insert("web".to_string(), Router::new("web").with_host("web.local"));
        config
            .services
            .insert("web".to_string(), Service::with_servers(["http://10.0.0.5:8080"]));
    }

    let res = reqwest::get(format!("{}/api/rawdata", base)).await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(
        res.headers().get("content-type").unwrap().to_str().unwrap(),
        "application/json"
    );
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["routers"]["web"]["host"], "web.local");
    assert_eq!(
        body["services"]["web"]["loadBalancer"]["servers"][0]["url"],
        "http://10.0.0.5:8080"
    );
}

#[tokio::test]
async fn test_unknown_path_and_method() {
    let (base, _) = start_api(Configuration::default()).await;

    let res = reqwest::get(format!("{}/api/unknown", base)).await.unwrap();
    assert_eq!(res.status(), 404);

    let res = reqwest::Client::new()
        .post(format!("{}/ping", base))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 405);
}

#[tokio::test]
async fn test_bind_on_taken_port_is_api_bind_error() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = taken.local_addr().unwrap().to_string();

    let result = ApiServer::bind(&address, Arc::new(RwLock::new(Configuration::default()))).await;
    match result {
        Err(rproxy::server::Error::ApiBind { address: failed, .. }) => assert_eq!(failed, address),
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
}
