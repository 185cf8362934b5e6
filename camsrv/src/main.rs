mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use camsrv::api::{ApiServer, ApiServerConfig, AppState};
use camsrv::client::RpcClient;
use camsrv::config::AppConfig;
use camsrv::domain::CameraId;
use camsrv::logging::{LoggingSettings, init_logging};
use camsrv::manifest::FfprobeInspector;
use camsrv::process::FfmpegDescriptorFactory;
use camsrv::registry::CameraRegistry;

use crate::cli::{Args, Commands, CtlAction, ServeArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    match args.command {
        Commands::Serve(serve_args) => serve(serve_args).await,
        Commands::Ctl { server, action } => ctl(&server, action).await,
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let logging_settings = LoggingSettings {
        log_dir: args.log_dir.clone(),
        retention_days: args.log_retention_days,
        ..Default::default()
    };
    let (logging_config, _log_guard) =
        init_logging(&logging_settings).context("Failed to initialize logging")?;

    let config = AppConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    info!(
        cameras = config.cameras.len(),
        hls_dir = %config.hls_dir.display(),
        "Configuration loaded"
    );

    let factory = Arc::new(FfmpegDescriptorFactory::new(config.ffmpeg.clone()));
    let inspector = Arc::new(
        FfprobeInspector::new(config.ffmpeg.ffprobe_path.clone())
            .with_timeout(Duration::from_millis(config.ffmpeg.inspect_timeout_ms)),
    );
    let registry = CameraRegistry::new(&config, factory, inspector);

    let shutdown = CancellationToken::new();
    logging_config.start_retention_cleanup(shutdown.clone());

    let server_config = ApiServerConfig {
        bind_address: args.bind,
        port: args.port,
        enable_cors: args.cors,
    };
    let state = AppState::new(registry.clone()).with_logging_config(logging_config);
    let server = ApiServer::new(server_config, state);

    let server_token = server.cancel_token();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
        }
        signal_token.cancel();
        server_token.cancel();
    });

    let served = server.run().await;
    shutdown.cancel();
    registry.shutdown().await;
    served.context("API server failed")?;

    info!("camsrv stopped");
    Ok(())
}

async fn ctl(server: &str, action: CtlAction) -> anyhow::Result<()> {
    let client = RpcClient::new(server)?;

    match action {
        CtlAction::Start { cam_id } => {
            let ack = client
                .start(CameraId::new(cam_id))
                .await
                .with_context(|| format!("Failed to start camera {}", cam_id))?;
            println!("{}", ack);
        }
        CtlAction::Stop { cam_id } => {
            let ack = client
                .stop(CameraId::new(cam_id))
                .await
                .with_context(|| format!("Failed to stop camera {}", cam_id))?;
            println!("{}", ack);
        }
        CtlAction::List => {
            let cameras = client.list().await.context("Failed to list cameras")?;
            for id in cameras {
                println!("{}", id);
            }
        }
    }
    Ok(())
}
