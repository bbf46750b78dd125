use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast;

use android_use::agent::{AndroidAgent, RunControl};
use android_use::config::{self, AppConfig};
use android_use::dashboard::DashboardClient;
use android_use::device::{self, AdbDevice, DeviceControl};
use android_use::errors::AndroidUseResult;
use android_use::events::RunStatus;
use android_use::llm::ProviderRegistry;
use android_use::server;

#[derive(Parser)]
#[command(name = "android-use")]
#[command(about = "LLM agent that drives an Android device from natural-language tasks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway: control HTTP endpoints plus the event WebSocket
    Serve,
    /// Execute one task against the connected device, without the gateway
    Run {
        /// Natural-language task for the agent
        #[arg(long)]
        task: String,
    },
    /// Terminal dashboard attached to a running gateway
    Dashboard,
    /// List connected Android devices
    Devices,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .init();
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "fatal");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> AndroidUseResult<()> {
    let config = config::load_config_or_default()?;
    match cli.command {
        Commands::Serve => {
            let registry = Arc::new(ProviderRegistry::from_config(&config));
            server::serve(config, registry).await
        }
        Commands::Run { task } => run_once(config, task).await,
        Commands::Dashboard => DashboardClient::new(config.dashboard).run().await,
        Commands::Devices => list_devices(&config).await,
    }
}

/// One agent run straight to stdout. Ctrl-C requests a stop, which lands
/// between steps.
async fn run_once(config: AppConfig, task: String) -> AndroidUseResult<()> {
    let registry = Arc::new(ProviderRegistry::from_config(&config));
    let device: Arc<dyn DeviceControl> = Arc::new(AdbDevice::connect(&config.device).await?);
    let (events, _rx) = broadcast::channel(256);

    let control = RunControl::new();
    let interrupt = control.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping after the current step");
            interrupt.request_stop();
        }
    });

    let agent = AndroidAgent::new(&task, config.agent, device, registry, control, events);
    let result = agent.run().await;

    for step in &result.steps {
        println!(
            "{:>3}. {} {} -> {}",
            step.step_num,
            step.action,
            step.params,
            step.outcome()
        );
    }
    println!(
        "{}: {} ({} steps, {:.1}s)",
        result.status,
        result.final_message,
        result.total_steps,
        result.total_time_secs
    );
    if result.status != RunStatus::Completed || !result.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn list_devices(config: &AppConfig) -> AndroidUseResult<()> {
    let serials = device::adb::list_devices(&config.device.adb_path).await?;
    if serials.is_empty() {
        println!("no devices connected");
        return Ok(());
    }
    for serial in serials {
        let device = AdbDevice::new(&config.device.adb_path, &serial);
        match device.device_info().await {
            Ok(info) => println!(
                "{}  {} {} (Android {}, SDK {}, {}x{})",
                info.serial,
                info.brand,
                info.model,
                info.android_version,
                info.sdk_version,
                info.screen_width,
                info.screen_height
            ),
            Err(e) => println!("{serial}  (info unavailable: {e})"),
        }
    }
    Ok(())
}
