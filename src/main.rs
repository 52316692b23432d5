use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use family_autoreply::bridge::BridgeClient;
use family_autoreply::config::{self, Config};
use family_autoreply::openai::Client as OpenAiClient;
use family_autoreply::responder::Responder;
use family_autoreply::store::DeviceStore;
use family_autoreply::transport::TransportEvent;

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = config::load_dotenv(config::DOTENV_PATH);

    // Setup logging
    let log_dir = config::log_dir();
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("family-autoreply.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file: {e}");
            return ExitCode::FAILURE;
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    if let Err(e) = dotenv {
        warn!("Warning: .env file not found: {e}");
    }
    info!("🚀 Starting family-autoreply...");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    info!("Bridge: {}", config.bridge_url);

    let store = match DeviceStore::open(&config.store_path) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to create store: {e}");
            return ExitCode::FAILURE;
        }
    };
    let device_id = match store.device_id() {
        Ok(id) => id,
        Err(e) => {
            error!("Failed to get device: {e}");
            return ExitCode::FAILURE;
        }
    };

    let bridge = Arc::new(BridgeClient::new(config.bridge_url.clone()));
    let completion = Arc::new(OpenAiClient::new(config.openai_api_key.clone()));

    let mut events = bridge.subscribe();
    if let Err(e) = bridge.connect().await {
        error!("Failed to connect: {e}");
        return ExitCode::FAILURE;
    }

    // No device stored, new login
    let backlog = if device_id.is_none() {
        match pair(&mut events).await {
            Some(backlog) => backlog,
            None => {
                error!("Pairing did not complete");
                return ExitCode::FAILURE;
            }
        }
    } else {
        Vec::new()
    };

    println!("✅ WhatsApp connected successfully!");
    println!("🤖 Bot is now active and monitoring family groups...");

    let responder = Arc::new(Responder::new(bridge.clone(), completion).with_store(store));
    let running = tokio::spawn({
        let responder = responder.clone();
        async move {
            for event in backlog {
                responder.handle_event(event).await;
            }
            responder.run(events).await
        }
    });

    wait_for_shutdown().await;
    println!("\n👋 Shutting down gracefully...");

    running.abort();
    if let Err(e) = bridge.disconnect().await {
        warn!("Disconnect failed: {e}");
    }
    ExitCode::SUCCESS
}

/// Print scan codes until the bridge reports the pairing outcome. Returns
/// the other events seen meanwhile, or `None` if pairing failed.
async fn pair(events: &mut mpsc::Receiver<TransportEvent>) -> Option<Vec<TransportEvent>> {
    let mut backlog = Vec::new();
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Pairing { event, code } if event == "code" => {
                println!("📱 Scan this QR code with WhatsApp:");
                if let Some(code) = code {
                    println!("QR Code Data: {code}");
                }
                println!("Please scan this with your WhatsApp mobile app");
            }
            TransportEvent::Pairing { event, .. } => {
                println!("Login event: {event}");
                match event.as_str() {
                    "success" => return Some(backlog),
                    "timeout" | "error" | "err-unexpected-state" | "err-client-outdated" => return None,
                    _ => {}
                }
            }
            other => backlog.push(other),
        }
    }
    None
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
