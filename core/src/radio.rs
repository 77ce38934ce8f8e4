/// Radio capability
///
/// The controller never talks to a BLE stack directly. It drives anything
/// implementing [`Radio`]: set raw advertisement bytes, start/stop a
/// non-connectable advertisement, and stop/resume scanning around pairing.
///
/// Every call returns immediately. Failures are reported, never retried here.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by a radio implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RadioError {
    #[error("Failed to configure advertisement data: {0}")]
    Configure(String),
    #[error("Failed to start advertising: {0}")]
    Start(String),
    #[error("Failed to stop advertising: {0}")]
    Stop(String),
}

/// Advertisement PDU type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvertisingKind {
    /// ADV_NONCONN_IND
    NonConnectable,
}

/// Own address type used while advertising
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnAddress {
    Public,
}

/// Parameters for one advertisement run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisingParams {
    /// Minimum advertising interval, units of 0.625 ms
    pub interval_min: u16,
    /// Maximum advertising interval, units of 0.625 ms
    pub interval_max: u16,
    pub kind: AdvertisingKind,
    pub address: OwnAddress,
}

impl AdvertisingParams {
    pub fn non_connectable(interval_min: u16, interval_max: u16) -> Self {
        Self {
            interval_min,
            interval_max,
            kind: AdvertisingKind::NonConnectable,
            address: OwnAddress::Public,
        }
    }
}

/// Low-level advertising/scanning primitive
#[cfg_attr(test, mockall::automock)]
pub trait Radio: Send {
    fn configure_advertisement(&mut self, data: &[u8]) -> Result<(), RadioError>;
    fn start_advertising(&mut self, params: &AdvertisingParams) -> Result<(), RadioError>;
    fn stop_advertising(&mut self) -> Result<(), RadioError>;
    fn stop_scanning(&mut self);
    fn start_scanning(&mut self, interval_ms: u32);
}

/// One call observed by [`RecordingRadio`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioEvent {
    Configured(Vec<u8>),
    StartedAdvertising(AdvertisingParams),
    StoppedAdvertising,
    StoppedScanning,
    StartedScanning(u32),
}

#[derive(Debug)]
struct RecordingState {
    events: Vec<RadioEvent>,
    advertising: bool,
    scanning: bool,
    configured: Vec<u8>,
    transmitted: Vec<Vec<u8>>,
    failing_starts: u32,
}

/// In-memory radio recording every call.
///
/// Clones share the same log, so a test can keep a handle while the
/// controller owns another.
#[derive(Debug, Clone)]
pub struct RecordingRadio {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingRadio {
    /// New radio, scanning as a host BLE stack normally is
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RecordingState {
                events: Vec::new(),
                advertising: false,
                scanning: true,
                configured: Vec::new(),
                transmitted: Vec::new(),
                failing_starts: 0,
            })),
        }
    }

    /// Make the next `count` start attempts fail
    pub fn fail_next_starts(&self, count: u32) {
        self.state.lock().failing_starts = count;
    }

    pub fn events(&self) -> Vec<RadioEvent> {
        self.state.lock().events.clone()
    }

    /// Drain the event log
    pub fn take_events(&self) -> Vec<RadioEvent> {
        std::mem::take(&mut self.state.lock().events)
    }

    /// Advertisement data of every successful start, in order
    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        self.state.lock().transmitted.clone()
    }

    pub fn is_advertising(&self) -> bool {
        self.state.lock().advertising
    }

    pub fn is_scanning(&self) -> bool {
        self.state.lock().scanning
    }
}

impl Default for RecordingRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl Radio for RecordingRadio {
    fn configure_advertisement(&mut self, data: &[u8]) -> Result<(), RadioError> {
        let mut state = self.state.lock();
        state.configured = data.to_vec();
        state.events.push(RadioEvent::Configured(data.to_vec()));
        Ok(())
    }

    fn start_advertising(&mut self, params: &AdvertisingParams) -> Result<(), RadioError> {
        let mut state = self.state.lock();
        if state.failing_starts > 0 {
            state.failing_starts -= 1;
            return Err(RadioError::Start("injected failure".to_string()));
        }
        state.advertising = true;
        let data = state.configured.clone();
        state.transmitted.push(data);
        state.events.push(RadioEvent::StartedAdvertising(*params));
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), RadioError> {
        let mut state = self.state.lock();
        state.advertising = false;
        state.events.push(RadioEvent::StoppedAdvertising);
        Ok(())
    }

    fn stop_scanning(&mut self) {
        let mut state = self.state.lock();
        state.scanning = false;
        state.events.push(RadioEvent::StoppedScanning);
    }

    fn start_scanning(&mut self, interval_ms: u32) {
        let mut state = self.state.lock();
        state.scanning = true;
        state.events.push(RadioEvent::StartedScanning(interval_ms));
    }
}
