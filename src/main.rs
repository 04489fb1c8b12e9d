use rproxy::logging::init_logging;
use rproxy::provider::ProviderRegistry;
use rproxy::server::Server;
use rproxy::settings::Settings;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match Settings::load().await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("설정 로드 실패: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _guard = init_logging(&settings.logging);
    info!(
        entrypoints = settings.entrypoints.len(),
        providers = ?settings.providers.names(),
        "rproxy 시작"
    );

    let server = Server::new(settings, ProviderRegistry::with_defaults());
    match server.run().await {
        Ok(()) => {
            info!("rproxy 종료");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "rproxy 실행 실패");
            ExitCode::FAILURE
        }
    }
}
