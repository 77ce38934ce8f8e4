/// Fastcon controller
///
/// Ties the protocol pieces to a radio and a clock. A single polling loop
/// calls [`FastconController::tick`]; producers of light updates and
/// commands may call in from other threads.
///
/// The radio is owned by exactly one of two state machines at a time:
///
/// - the **transmission scheduler**, draining the command queue, or
/// - a **pairing session**, which parks the scheduler until it ends.
///
/// Lock order: owner, radio, debounce, codec, queue.

use crate::clock::Clock;
use crate::config::{ControllerConfig, PairingQueuePolicy};
use crate::pairing::{PairingPhase, PairingSession, PairingTick};
use crate::protocol::{
    command_advertisement, encode_frame, encode_light_state, AddressPrefixFramer, LightCommand, LightState,
    MeshKey, PacketCodec, RfFramer, BROADCAST_ADDRESS,
};
use crate::radio::Radio;
use crate::transmit::{CommandQueue, DebounceConfig, DebounceLayer, ScheduleState, TransmissionScheduler};
use crate::FastconError;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Factory reset payload: seven zero bytes
pub const FACTORY_RESET_PAYLOAD: [u8; 7] = [0; 7];

pub const DEFAULT_GROUP_ID: u32 = 1;

// ============================================================================
// RADIO SUPERVISOR
// ============================================================================

enum RadioOwner {
    Scheduler(TransmissionScheduler),
    Pairing {
        session: PairingSession,
        parked: TransmissionScheduler,
    },
}

impl RadioOwner {
    fn scheduler(&self) -> &TransmissionScheduler {
        match self {
            RadioOwner::Scheduler(scheduler) => scheduler,
            RadioOwner::Pairing { parked, .. } => parked,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerMode {
    Normal,
    Pairing,
}

/// Point-in-time view of the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub mode: ControllerMode,
    pub schedule_state: ScheduleState,
    pub queue_size: usize,
    pub queue_capacity: usize,
    pub pending_updates: usize,
    pub frames_sent: u64,
    pub next_sequence: u8,
    pub pairing_phase: Option<PairingPhase>,
    pub pairing_light_id: Option<u16>,
    pub pairing_elapsed_ms: Option<u64>,
}

// ============================================================================
// CONTROLLER
// ============================================================================

pub struct FastconController<R: Radio, C: Clock> {
    config: Arc<RwLock<ControllerConfig>>,
    codec: Arc<PacketCodec>,
    framer: Arc<dyn RfFramer>,
    queue: Arc<CommandQueue>,
    debounce: Arc<DebounceLayer>,
    owner: Arc<Mutex<RadioOwner>>,
    radio: Arc<Mutex<R>>,
    clock: Arc<C>,
}

impl<R: Radio, C: Clock> Clone for FastconController<R, C> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            codec: Arc::clone(&self.codec),
            framer: Arc::clone(&self.framer),
            queue: Arc::clone(&self.queue),
            debounce: Arc::clone(&self.debounce),
            owner: Arc::clone(&self.owner),
            radio: Arc::clone(&self.radio),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<R: Radio, C: Clock> FastconController<R, C> {
    pub fn new(config: ControllerConfig, radio: R, clock: C) -> Result<Self, FastconError> {
        config.validate()?;

        Ok(Self {
            codec: Arc::new(PacketCodec::new(config.mesh_key)),
            framer: Arc::new(AddressPrefixFramer),
            queue: Arc::new(CommandQueue::new(config.max_queue_size)),
            debounce: Arc::new(DebounceLayer::new(config.debounce)),
            owner: Arc::new(Mutex::new(RadioOwner::Scheduler(TransmissionScheduler::new()))),
            radio: Arc::new(Mutex::new(radio)),
            clock: Arc::new(clock),
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// Replace the RF framing step
    pub fn with_framer(mut self, framer: Arc<dyn RfFramer>) -> Self {
        self.framer = framer;
        self
    }

    /// Log the active configuration
    pub fn setup(&self) {
        let config = self.config.read();
        info!("Setting up Fastcon BLE Controller...");
        info!("  Advertisement interval: {}-{}", config.adv_interval_min, config.adv_interval_max);
        info!("  Advertisement duration: {} ms", config.adv_duration_ms);
        info!("  Advertisement gap: {} ms", config.adv_gap_ms);
        info!("  Max queue size: {}", config.max_queue_size);
        info!(
            "  Debounce: settle {} ms, min interval {} ms",
            config.debounce.settle_ms, config.debounce.min_interval_ms
        );
        info!("  Pairing queue policy: {:?}", config.pairing_queue_policy);
    }

    pub fn config(&self) -> ControllerConfig {
        self.config.read().clone()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Inspect the radio under its lock
    pub fn with_radio<T>(&self, f: impl FnOnce(&R) -> T) -> T {
        f(&self.radio.lock())
    }

    /// One pass of the polling loop. Bounded work, never blocks on I/O.
    pub fn tick(&self) -> ControllerMode {
        let now = self.clock.now_ms();
        let mut owner = self.owner.lock();

        let finished = match &mut *owner {
            RadioOwner::Pairing { session, .. } => {
                let key = self.codec.mesh_key();
                let mut radio = self.radio.lock();
                match session.tick(now, &key, &mut *radio) {
                    PairingTick::Active => return ControllerMode::Pairing,
                    PairingTick::Finished => true,
                }
            }
            RadioOwner::Scheduler(_) => false,
        };

        if finished {
            self.release_pairing(&mut owner);
        }

        self.flush_debounce(now);

        let timing = self.config.read().scheduler_timing();
        if let RadioOwner::Scheduler(scheduler) = &mut *owner {
            let mut radio = self.radio.lock();
            scheduler.tick(now, &self.queue, &mut *radio, &timing);
        }
        ControllerMode::Normal
    }

    fn flush_debounce(&self, now: u64) {
        self.debounce.flush(now, |light_id, light_data| {
            let frame = self.codec.encode_light_control(light_id, light_data);
            let framed = self.framer.frame(&BROADCAST_ADDRESS, frame.as_bytes());
            debug!("Queueing state update for light {}", light_id);
            self.queue.enqueue(light_id, framed, now).is_ok()
        });
    }

    fn release_pairing(&self, owner: &mut RadioOwner) {
        let placeholder = RadioOwner::Scheduler(TransmissionScheduler::new());
        if let RadioOwner::Pairing { mut parked, .. } = std::mem::replace(owner, placeholder) {
            parked.reset();
            *owner = RadioOwner::Scheduler(parked);
        }
        info!("Pairing ended, {} queued commands resume", self.queue.len());
    }

    // ------------------------------------------------------------------------
    // Command surface
    // ------------------------------------------------------------------------

    /// Stage a light state; it is sent once it settles
    pub fn update_light_state(&self, light_id: u16, state: &LightState) {
        let light_data = encode_light_state(state);
        self.debounce.stage(light_id, light_data, self.clock.now_ms());
    }

    /// Encode `payload` as a forwarded control command and queue it directly
    pub fn queue_raw_command(&self, light_id: u16, payload: &[u8]) -> Result<(), FastconError> {
        let command = LightCommand::control(light_id, payload.to_vec());

        // Size check on a trial frame so a rejected payload keeps the sequence
        let trial = encode_frame(&command, &self.codec.mesh_key(), 0);
        command_advertisement(&self.framer.frame(&BROADCAST_ADDRESS, trial.as_bytes()))?;

        let frame = self.codec.encode(&command);
        let framed = self.framer.frame(&BROADCAST_ADDRESS, frame.as_bytes());

        debug!("Raw command for light {}: {}", light_id, frame.to_hex());
        self.queue.enqueue(light_id, framed, self.clock.now_ms())?;
        Ok(())
    }

    pub fn factory_reset_device(&self, light_id: u16) -> Result<(), FastconError> {
        info!("Sending factory reset to light {}", light_id);
        self.queue_raw_command(light_id, &FACTORY_RESET_PAYLOAD)?;
        info!("Factory reset command queued");
        Ok(())
    }

    /// Start a pairing session for `light_id`. Restarts any running session.
    pub fn pair_device(&self, light_id: u16, group_id: u32) {
        let now = self.clock.now_ms();
        let policy = self.config.read().pairing_queue_policy;
        let mut owner = self.owner.lock();
        let mut radio = self.radio.lock();

        let session = PairingSession::start(light_id, group_id, now, &mut *radio);
        let placeholder = RadioOwner::Scheduler(TransmissionScheduler::new());
        let mut parked = match std::mem::replace(&mut *owner, placeholder) {
            RadioOwner::Scheduler(scheduler) => scheduler,
            RadioOwner::Pairing { parked, .. } => {
                info!("Restarting pairing session");
                parked
            }
        };
        parked.reset();
        *owner = RadioOwner::Pairing { session, parked };

        match policy {
            PairingQueuePolicy::Retain => {
                debug!("Retaining {} queued commands until pairing ends", self.queue.len())
            }
            PairingQueuePolicy::Clear => {
                let dropped = self.clear_queue();
                info!("Cleared {} queued commands for pairing", dropped);
            }
        }
    }

    /// End a running pairing session early. Returns false if none was running.
    pub fn cancel_pairing(&self) -> bool {
        let mut owner = self.owner.lock();
        let RadioOwner::Pairing { session, .. } = &mut *owner else {
            return false;
        };

        info!("Pairing cancelled");
        session.finish(&mut *self.radio.lock());
        self.release_pairing(&mut owner);
        true
    }

    pub fn is_pairing(&self) -> bool {
        matches!(&*self.owner.lock(), RadioOwner::Pairing { .. })
    }

    /// Discard every queued frame. Dropped frames never reached the air, so
    /// per-light dedup forgets them too.
    pub fn clear_queue(&self) -> usize {
        let dropped = self.queue.clear();
        self.debounce.forget_sent();
        dropped
    }

    pub fn queue_size(&self) -> usize {
        self.queue.len()
    }

    pub fn is_queue_empty(&self) -> bool {
        self.queue.is_empty()
    }

    // ------------------------------------------------------------------------
    // Configuration setters
    // ------------------------------------------------------------------------

    pub fn set_mesh_key(&self, key: MeshKey) {
        self.config.write().mesh_key = key;
        self.codec.set_mesh_key(key);
    }

    pub fn set_adv_interval_min(&self, value: u16) {
        let mut config = self.config.write();
        config.adv_interval_min = value;
        let max = config.adv_interval_max;
        config.set_adv_interval_max(max);
    }

    /// Values below the current minimum are raised to it
    pub fn set_adv_interval_max(&self, value: u16) {
        self.config.write().set_adv_interval_max(value);
    }

    pub fn set_adv_duration(&self, ms: u16) {
        self.config.write().adv_duration_ms = ms;
    }

    pub fn set_adv_gap(&self, ms: u16) {
        self.config.write().adv_gap_ms = ms;
    }

    pub fn set_max_queue_size(&self, size: usize) -> Result<(), FastconError> {
        if size == 0 {
            return Err(crate::config::ConfigError::InvalidQueueSize.into());
        }
        self.config.write().max_queue_size = size;
        self.queue.set_capacity(size);
        Ok(())
    }

    pub fn set_debounce(&self, debounce: DebounceConfig) {
        self.config.write().debounce = debounce;
        self.debounce.set_config(debounce);
    }

    pub fn set_pairing_queue_policy(&self, policy: PairingQueuePolicy) {
        self.config.write().pairing_queue_policy = policy;
    }

    pub fn status(&self) -> ControllerStatus {
        let now = self.clock.now_ms();
        let owner = self.owner.lock();
        let session = match &*owner {
            RadioOwner::Pairing { session, .. } => Some(session),
            RadioOwner::Scheduler(_) => None,
        };

        ControllerStatus {
            mode: if session.is_some() {
                ControllerMode::Pairing
            } else {
                ControllerMode::Normal
            },
            schedule_state: owner.scheduler().state(),
            queue_size: self.queue.len(),
            queue_capacity: self.queue.capacity(),
            pending_updates: self.debounce.pending_count(),
            frames_sent: owner.scheduler().frames_sent(),
            next_sequence: self.codec.next_sequence(),
            pairing_phase: session.map(|s| s.phase()),
            pairing_light_id: session.map(|s| s.current_light_id()),
            pairing_elapsed_ms: session.map(|s| s.elapsed(now)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::protocol::{Frame, HEADER_LEN};
    use crate::radio::{RadioEvent, RecordingRadio};

    fn controller() -> (FastconController<RecordingRadio, ManualClock>, RecordingRadio, ManualClock) {
        let radio = RecordingRadio::new();
        let clock = ManualClock::new();
        let config = ControllerConfig::new(MeshKey::new(*b"0236"));
        let controller = FastconController::new(config, radio.clone(), clock.clone()).unwrap();
        (controller, radio, clock)
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = ControllerConfig::new(MeshKey::new([0; 4]));
        config.max_queue_size = 0;
        let result = FastconController::new(config, RecordingRadio::new(), ManualClock::new());
        assert!(matches!(result, Err(FastconError::Config(_))));
    }

    #[test]
    fn test_raw_command_framed_and_queued() {
        let (controller, radio, _) = controller();
        controller.queue_raw_command(5, &[0x00]).unwrap();
        assert_eq!(controller.queue_size(), 1);

        controller.tick();
        let adv = radio.transmitted().pop().unwrap();
        // flags(3) + manufacturer header(4) + address(3) + header + 1 payload byte
        assert_eq!(adv.len(), 7 + 3 + HEADER_LEN + 1);
        assert_eq!(&adv[7..10], &[0xC3, 0xC2, 0xC1]);
        assert!(controller.is_queue_empty());
    }

    #[test]
    fn test_raw_command_too_large_rejected() {
        let (controller, _, _) = controller();
        let result = controller.queue_raw_command(1, &[0u8; 20]);
        assert!(matches!(result, Err(FastconError::Advertisement(_))));
        assert!(controller.is_queue_empty());
    }

    #[test]
    fn test_rejected_raw_command_keeps_sequence() {
        let (controller, _, _) = controller();
        let before = controller.status().next_sequence;
        assert!(controller.queue_raw_command(1, &[0u8; 20]).is_err());
        assert_eq!(controller.status().next_sequence, before);

        controller.queue_raw_command(1, &[0]).unwrap();
        assert_ne!(controller.status().next_sequence, before);
    }

    /// Hold the scheduler on a long raw advertisement so the next state
    /// update stays in the queue, then drop it with `drop_queued`.
    fn resend_after_dropped_frame(drop_queued: impl Fn(&FastconController<RecordingRadio, ManualClock>)) {
        let (controller, radio, clock) = controller();
        controller.set_adv_duration(1_000);
        controller.queue_raw_command(9, &[1]).unwrap();
        controller.tick();

        controller.update_light_state(1, &LightState::off());
        clock.set(100);
        controller.tick();
        assert_eq!(controller.queue_size(), 1, "off frame waiting behind the raw command");

        drop_queued(&controller);
        assert!(controller.is_queue_empty());

        controller.update_light_state(1, &LightState::off());
        for _ in 0..600 {
            clock.advance(5);
            controller.tick();
        }
        assert_eq!(radio.transmitted().len(), 2, "raw command and the re-issued off");
    }

    #[test]
    fn test_identical_state_resent_after_clear_queue() {
        resend_after_dropped_frame(|controller| {
            assert_eq!(controller.clear_queue(), 1);
        });
    }

    #[test]
    fn test_identical_state_resent_after_clear_policy_pairing() {
        resend_after_dropped_frame(|controller| {
            controller.set_pairing_queue_policy(PairingQueuePolicy::Clear);
            controller.pair_device(10, DEFAULT_GROUP_ID);
            assert!(controller.cancel_pairing());
        });
    }

    #[test]
    fn test_factory_reset_payload() {
        let (controller, radio, _) = controller();
        controller.factory_reset_device(3).unwrap();
        controller.tick();

        let adv = radio.transmitted().pop().unwrap();
        let key = MeshKey::new(*b"0236");
        let frame = Frame::from(adv[10..].to_vec());
        let plain = frame.decrypt(&key);
        assert_eq!(&plain[HEADER_LEN..], &FACTORY_RESET_PAYLOAD);
    }

    #[test]
    fn test_queue_full_surfaces_error() {
        let (controller, _, _) = controller();
        controller.set_max_queue_size(1).unwrap();
        controller.queue_raw_command(1, &[1]).unwrap();
        assert!(matches!(
            controller.queue_raw_command(2, &[2]),
            Err(FastconError::Queue(_))
        ));
        assert!(controller.set_max_queue_size(0).is_err());
    }

    #[test]
    fn test_pairing_parks_queue_and_resumes() {
        let (controller, radio, clock) = controller();
        controller.queue_raw_command(1, &[1]).unwrap();
        controller.pair_device(10, DEFAULT_GROUP_ID);
        assert!(controller.is_pairing());
        assert_eq!(controller.queue_size(), 1);

        clock.advance(60_000);
        assert_eq!(controller.tick(), ControllerMode::Normal);
        assert!(!controller.is_pairing());
        assert!(radio.is_scanning());
        assert!(controller.is_queue_empty(), "retained command sent after pairing");
    }

    #[test]
    fn test_clear_policy_drops_queue() {
        let (controller, _, _) = controller();
        controller.set_pairing_queue_policy(PairingQueuePolicy::Clear);
        controller.queue_raw_command(1, &[1]).unwrap();
        controller.pair_device(10, DEFAULT_GROUP_ID);
        assert!(controller.is_queue_empty());
    }

    #[test]
    fn test_cancel_pairing() {
        let (controller, radio, _) = controller();
        assert!(!controller.cancel_pairing());

        controller.pair_device(10, 2);
        controller.tick();
        assert!(controller.cancel_pairing());
        assert!(!controller.is_pairing());
        assert_eq!(radio.events().last(), Some(&RadioEvent::StartedScanning(300)));
    }

    #[test]
    fn test_repairing_restarts_session() {
        let (controller, _, clock) = controller();
        controller.pair_device(10, 1);
        clock.advance(30_000);
        controller.pair_device(20, 1);

        let status = controller.status();
        assert_eq!(status.pairing_light_id, Some(20));
        assert_eq!(status.pairing_elapsed_ms, Some(0));
        assert_eq!(status.pairing_phase, Some(PairingPhase::Discovery));
    }

    #[test]
    fn test_status_snapshot() {
        let (controller, _, _) = controller();
        controller.update_light_state(1, &LightState::on(0.5));
        let status = controller.status();

        assert_eq!(status.mode, ControllerMode::Normal);
        assert_eq!(status.schedule_state, ScheduleState::Idle);
        assert_eq!(status.pending_updates, 1);
        assert_eq!(status.queue_capacity, 100);
        assert!(status.pairing_phase.is_none());
        assert!(serde_json::to_string(&status).unwrap().contains("\"normal\""));
    }

    #[test]
    fn test_interval_setters_keep_order() {
        let (controller, _, _) = controller();
        controller.set_adv_interval_max(0x10);
        assert_eq!(controller.config().adv_interval_max, 0x20);

        controller.set_adv_interval_min(0x50);
        let config = controller.config();
        assert_eq!(config.adv_interval_min, 0x50);
        assert_eq!(config.adv_interval_max, 0x50);
    }

    #[test]
    fn test_mesh_key_update_reaches_codec() {
        let (controller, radio, _) = controller();
        let key = MeshKey::new(*b"9999");
        controller.set_mesh_key(key);
        controller.queue_raw_command(1, &[0]).unwrap();
        controller.tick();

        let adv = radio.transmitted().pop().unwrap();
        let plain = Frame::from(adv[10..].to_vec()).decrypt(&key);
        assert_eq!(plain[2], b'9');
        assert_eq!(plain[HEADER_LEN], 0);
    }
}
