//! Wi-Fi station link for ESP32.
//!
//! The driver is shared with [`SoftApPortal`](crate::portal::SoftApPortal),
//! which switches it to mixed mode while the portal is open.

use std::sync::{Arc, Mutex, MutexGuard};

use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, peripheral},
    nvs::EspDefaultNvsPartition,
    sys::{esp, esp_wifi_set_ps, esp_wifi_sta_get_ap_info, wifi_ap_record_t, wifi_ps_type_t_WIFI_PS_NONE},
    wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi},
};
use log::{info, warn};

use iotkit_core::{LinkError, LinkStatus, NetworkLink};

/// Wi-Fi driver shared between the station link and the portal.
pub type SharedWifi = Arc<Mutex<EspWifi<'static>>>;

/// Create the Wi-Fi driver.
pub fn shared_wifi(
    modem: impl peripheral::Peripheral<P = Modem> + 'static,
    sysloop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
) -> anyhow::Result<SharedWifi> {
    let wifi = EspWifi::new(modem, sysloop, Some(nvs))?;
    Ok(Arc::new(Mutex::new(wifi)))
}

pub(crate) fn lock(wifi: &SharedWifi) -> Result<MutexGuard<'_, EspWifi<'static>>, LinkError> {
    wifi.lock()
        .map_err(|_| LinkError::Driver("Wi-Fi driver lock poisoned".to_string()))
}

/// [`NetworkLink`] over the ESP32 station interface.
pub struct EspWifiLink {
    wifi: SharedWifi,
}

impl EspWifiLink {
    pub fn new(wifi: SharedWifi) -> Self {
        Self { wifi }
    }
}

impl NetworkLink for EspWifiLink {
    fn begin_join(&mut self, ssid: &str, password: &str) -> Result<(), LinkError> {
        if ssid.is_empty() {
            return Err(LinkError::InvalidConfig("SSID cannot be empty".to_string()));
        }
        let auth_method = if password.is_empty() {
            info!("WiFi password is empty, using open network");
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let config = ClientConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| LinkError::InvalidConfig("SSID too long (max 32 chars)".to_string()))?,
            password: password.try_into().map_err(|_| {
                LinkError::InvalidConfig("Password too long (max 64 chars)".to_string())
            })?,
            auth_method,
            ..Default::default()
        };

        let mut wifi = lock(&self.wifi)?;
        let driver = |e: esp_idf_svc::sys::EspError| LinkError::Driver(e.to_string());
        wifi.set_configuration(&Configuration::Client(config))
            .map_err(driver)?;
        if !wifi.is_started().map_err(driver)? {
            wifi.start().map_err(driver)?;
        }
        info!("Connecting to '{}'...", ssid);
        // Returns immediately; progress is observed through link_status.
        wifi.connect().map_err(driver)
    }

    fn link_status(&mut self) -> LinkStatus {
        let Ok(wifi) = lock(&self.wifi) else {
            return LinkStatus::Disconnected;
        };
        let connected = wifi.is_connected().unwrap_or(false);
        let netif_up = wifi.sta_netif().is_up().unwrap_or(false);
        if connected && netif_up {
            LinkStatus::Connected
        } else {
            LinkStatus::Disconnected
        }
    }

    fn disable_power_save(&mut self) -> Result<(), LinkError> {
        // SAFETY: plain FFI call on a started driver.
        esp!(unsafe { esp_wifi_set_ps(wifi_ps_type_t_WIFI_PS_NONE) })
            .map_err(|e| LinkError::Driver(e.to_string()))
    }

    fn rssi(&mut self) -> Option<i8> {
        let mut record = wifi_ap_record_t::default();
        // SAFETY: `record` outlives the call.
        match esp!(unsafe { esp_wifi_sta_get_ap_info(&mut record) }) {
            Ok(()) => Some(record.rssi),
            Err(e) => {
                warn!("Failed to read RSSI: {}", e);
                None
            }
        }
    }
}
