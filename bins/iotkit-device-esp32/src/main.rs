//! iotkit device firmware for ESP32.
//!
//! This binary requires the ESP32 Rust toolchain.
//! It will not compile with the standard Rust toolchain.
//!
//! Same provisioning and settings logic as the Linux build; only the
//! platform bindings differ (NVS instead of JSON files, SoftAP instead of a
//! local HTTP listener, chip reset instead of a process exit).

use std::time::Instant;

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{error, info};

use iotkit_core::portal::DEFAULT_AP_PREFIX;
use iotkit_core::provisioning::duration_ms;
use iotkit_core::{
    access_point_name, Application, DeviceHooks, DeviceProperties, ProvisioningConfig,
    ProvisioningController, SemanticVersion, SettingsLayout, SettingsStore,
};
use iotkit_esp32::{chip_id, shared_wifi, ChipRestarter, EspWifiLink, NvsBackend, SoftApPortal};

const TICK_INTERVAL_MS: u32 = 50;

struct Firmware;

impl DeviceHooks for Firmware {
    fn post_setup(&mut self) {
        info!("Device setup complete");
    }

    fn on_config(&mut self, access_point: &str) {
        info!("Connect to access point {} to configure the device", access_point);
    }
}

fn main() {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    if let Err(e) = run() {
        error!("Fatal error: {:?}", e);
        FreeRtos::delay_ms(10_000);
        esp_idf_svc::hal::reset::restart();
    }
}

fn run() -> anyhow::Result<()> {
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let wifi = shared_wifi(peripherals.modem, sysloop, nvs.clone())?;
    let config = ProvisioningConfig {
        access_point: access_point_name(DEFAULT_AP_PREFIX, chip_id()),
        ..ProvisioningConfig::default()
    };
    info!("iotkit device {} starting...", config.access_point);

    let controller = ProvisioningController::new(
        config,
        Firmware,
        EspWifiLink::new(wifi.clone()),
        SoftApPortal::new(wifi),
        ChipRestarter,
    );
    let properties = DeviceProperties::new(
        "iotkit-device",
        "ESP32",
        "DIY",
        SemanticVersion::new(0, 1, 0),
    );
    let mut app = Application::new(
        properties,
        SettingsLayout::BaseWithBroker,
        SettingsStore::new(NvsBackend::new(nvs)),
        controller,
    );

    let started = Instant::now();
    let now_ms = || duration_ms(started.elapsed());

    app.setup(now_ms());
    loop {
        app.tick(now_ms());
        if app.take_publish_request() {
            info!("publishing device state");
        }
        FreeRtos::delay_ms(TICK_INTERVAL_MS);
    }
}
