//! Chip identity and software reset.

use esp_idf_svc::sys::{esp, esp_efuse_mac_get_default};
use log::{info, warn};

use iotkit_core::Restarter;

/// Chip id derived from the factory MAC: its last three bytes.
pub fn chip_id() -> u32 {
    let mut mac = [0u8; 6];
    // SAFETY: `mac` is the six-byte buffer the call expects.
    if let Err(e) = esp!(unsafe { esp_efuse_mac_get_default(mac.as_mut_ptr()) }) {
        warn!("Failed to read factory MAC: {}", e);
        return 0;
    }
    u32::from_be_bytes([0, mac[3], mac[4], mac[5]])
}

/// [`Restarter`] that resets the chip.
pub struct ChipRestarter;

impl Restarter for ChipRestarter {
    fn restart(&mut self) {
        info!("Restarting...");
        esp_idf_svc::hal::reset::restart();
    }
}
