// Fastcon Core: advertisement-only BLE mesh light controller
//
// Bulbs never connect and never answer. Every command, pairing hand-off and
// factory reset is an encrypted frame broadcast on a fixed duty cycle.

pub mod clock;
pub mod config;
pub mod controller;
pub mod pairing;
pub mod protocol;
pub mod radio;
pub mod transmit;

use thiserror::Error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, ControllerConfig, PairingQueuePolicy};
pub use controller::{
    ControllerMode, ControllerStatus, FastconController, DEFAULT_GROUP_ID, FACTORY_RESET_PAYLOAD,
};
pub use pairing::{PairingPhase, PairingSession, PairingTick};
pub use protocol::{
    encode_light_state, AdvertisementError, ColorMode, CommandType, Frame, LightCommand,
    LightState, MeshKey, PacketCodec,
};
pub use radio::{AdvertisingParams, Radio, RadioError, RadioEvent, RecordingRadio};
pub use transmit::{CommandQueue, DebounceConfig, QueueError, ScheduleState};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error)]
pub enum FastconError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Radio error: {0}")]
    Radio(#[from] RadioError),
    #[error("Advertisement error: {0}")]
    Advertisement(#[from] AdvertisementError),
}
