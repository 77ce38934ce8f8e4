// Radio that reports every call through tracing instead of a BLE stack.
//
// Lets `fastcon run` be driven and observed on a machine without an
// advertising-capable controller.

use fastcon_core::{AdvertisingParams, Radio, RadioError};
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct LoggingRadio {
    configured: Vec<u8>,
    advertising: bool,
    scanning: bool,
    advertisements: u64,
}

impl LoggingRadio {
    pub fn new() -> Self {
        Self {
            scanning: true,
            ..Self::default()
        }
    }

    /// Successful advertisement starts so far
    pub fn advertisements(&self) -> u64 {
        self.advertisements
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }
}

impl Radio for LoggingRadio {
    fn configure_advertisement(&mut self, data: &[u8]) -> Result<(), RadioError> {
        if data.len() > fastcon_core::protocol::MAX_ADVERTISEMENT_LEN {
            return Err(RadioError::Configure(format!("{} bytes", data.len())));
        }
        self.configured = data.to_vec();
        debug!("radio: advertisement data {}", hex::encode(data));
        Ok(())
    }

    fn start_advertising(&mut self, params: &AdvertisingParams) -> Result<(), RadioError> {
        self.advertising = true;
        self.advertisements += 1;
        info!(
            "radio: advertising [0x{:02x}-0x{:02x}] {}",
            params.interval_min,
            params.interval_max,
            hex::encode(&self.configured)
        );
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), RadioError> {
        if self.advertising {
            debug!("radio: advertising stopped");
        }
        self.advertising = false;
        Ok(())
    }

    fn stop_scanning(&mut self) {
        self.scanning = false;
        info!("radio: scanning stopped");
    }

    fn start_scanning(&mut self, interval_ms: u32) {
        self.scanning = true;
        info!("radio: scanning resumed ({} ms interval)", interval_ms);
    }
}
