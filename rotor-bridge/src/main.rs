use anyhow::{Context, Result};
use antenna_controller::CarryoutController;
use antenna_controller::mock::SimulatedController;
use clap::Parser;
use log::{error, info};
use rotor_bridge::config::{Config, Overrides};
use rotor_bridge::{Bridge, SharedController, api};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Control a Winegard Carryout as an AZ/EL rotor from Gpredict.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML). Missing files fall back to defaults.
    #[arg(short, long, default_value = "rotor-bridge/config.toml")]
    config: PathBuf,

    /// Serial port to communicate with the Winegard Carryout.
    #[arg(long)]
    port: Option<String>,

    /// Baudrate for the serial communication.
    #[arg(long)]
    baudrate: Option<u32>,

    /// IP address to listen for Gpredict commands.
    #[arg(long)]
    listen_ip: Option<String>,

    /// Port to listen for Gpredict commands.
    #[arg(long)]
    listen_port: Option<u16>,

    /// Port for the HTTP status API.
    #[arg(long)]
    api_port: Option<u16>,

    /// Run against a simulated dish instead of the serial port.
    #[arg(long)]
    simulate: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            port: self.port.clone(),
            baudrate: self.baudrate,
            listen_ip: self.listen_ip.clone(),
            listen_port: self.listen_port,
            api_port: self.api_port,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config, &args.overrides()).with_context(|| {
        format!("Failed to load configuration from {}", args.config.display())
    })?;

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.logging.level));

    info!("Loaded configuration:");
    info!(
        "  Antenna: {} @ {} baud, {} attempts, {:?} timeout",
        config.antenna.port,
        config.antenna.baudrate,
        config.antenna.retry_attempts,
        config.antenna.read_timeout()
    );
    info!("  rotctld: {}", config.rotctld_address());

    let settings = config.antenna.link_settings()?;
    let controller: SharedController = if args.simulate {
        info!("Using simulated antenna");
        Arc::new(SimulatedController::new(settings.soft_limits))
    } else {
        let controller = CarryoutController::open(
            &config.antenna.port,
            config.antenna.baudrate,
            config.antenna.read_timeout(),
            settings,
        )
        .with_context(|| format!("Failed to open serial port {}", config.antenna.port))?;
        Arc::new(controller)
    };

    let bridge = Bridge::bind(config.rotctld_address(), controller.clone())
        .await
        .with_context(|| format!("Failed to bind rotctld listener on {}", config.rotctld_address()))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let api_task = match config.api_address() {
        Some(addr) => {
            let listener = TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind status API on {addr}"))?;
            Some(tokio::spawn(api::serve(
                listener,
                controller.clone(),
                shutdown_rx.clone(),
            )))
        }
        None => None,
    };

    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    bridge.run(shutdown_rx).await;

    if let Some(api_task) = api_task {
        match api_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Status API failed: {e}"),
            Err(e) => error!("Status API task failed: {e}"),
        }
    }

    info!("Exiting");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
