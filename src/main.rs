use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use tokio::signal;

use animal_classifier::server::startup;
use animal_classifier::state::{AppConfig, AppState};

/// HTTP inference service for the animal image classifier.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the exported ONNX weights
    #[arg(long, default_value = "model/best_animals_model.onnx")]
    model_path: PathBuf,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Number of ranked classes returned per prediction
    #[arg(long, default_value_t = 3)]
    top_k: usize,

    /// Concurrent ONNX sessions backing the classifier
    #[arg(long, default_value_t = 1)]
    session_pool_size: usize,
}

fn init_logging() {
    // default level is info
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Info)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging();

    let config = AppConfig {
        host: args.host,
        port: args.port,
        model_path: args.model_path,
        top_k: args.top_k,
        session_pool_size: args.session_pool_size,
    };

    // Model load is fatal: the process must not accept traffic without a
    // working classifier.
    let app_state = AppState::new(&config)?;

    actix_web::rt::System::new().block_on(async move {
        tokio::select! {
            res = startup(config, app_state) => res.map_err(anyhow::Error::from),
            _ = signal::ctrl_c() => {
                log::info!("Received Ctrl+C, shutting down");
                Ok(())
            }
        }
    })
}
