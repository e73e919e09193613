use iotkit_core::{Application, DeviceHooks, ProvisioningController, SettingsStore};
use iotkit_host::{
    DeviceConfig, Driver, DriverExit, FileBackend, HttpPortal, ProcessRestarter, SimulatedLink,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Hooks of the simulated device: everything is logged.
struct ConsoleDevice {
    force_portal: bool,
}

impl DeviceHooks for ConsoleDevice {
    fn pre_setup(&mut self) {
        tracing::debug!("pre_setup");
    }

    fn post_setup(&mut self) {
        tracing::info!("Device setup complete");
    }

    fn config_requested_on_startup(&mut self) -> bool {
        self.force_portal
    }

    fn on_config(&mut self, access_point: &str) {
        tracing::info!("Connect to access point {} to configure the device", access_point);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,iotkit_core=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("iotkit device starting...");

    // Configuration
    let config = DeviceConfig::from_env()?;
    tracing::info!("Settings directory: {}", config.data_dir.display());

    let store = SettingsStore::new(FileBackend::new(&config.data_dir)?);
    let portal = HttpPortal::new(config.portal_addr, tokio::runtime::Handle::current());
    let controller = ProvisioningController::new(
        config.provisioning_config(),
        ConsoleDevice {
            force_portal: config.force_portal,
        },
        SimulatedLink::new(config.link_connect_after),
        portal,
        ProcessRestarter::new(),
    );
    let mut app = Application::new(config.device.clone(), config.layout, store, controller)
        .with_update_interval(config.update_interval());

    let driver = Driver::new(config.tick_interval()).with_status_endpoint(config.status_addr);

    // Wait for shutdown signal or a restart request
    let exit = driver
        .run(&mut app, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    match exit {
        DriverExit::Shutdown => {
            tracing::info!("Shutdown complete");
            Ok(())
        }
        DriverExit::Restart => {
            tracing::warn!("Exiting for restart");
            drop(app);
            std::process::exit(exit.exit_code());
        }
    }
}
