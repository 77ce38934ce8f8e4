/// Pairing session
///
/// Commissioning runs entirely on advertisements, with exclusive use of the
/// radio for up to a minute:
///
/// - **Discovery** (first 4 s): discovery advertisement re-issued every 100 ms
/// - **Pairing** (4 s to the end): pairing advertisement carrying the target
///   light id and the mesh key, re-issued every 100 ms; the light id moves to
///   the next slot every 5 s so several bulbs can be commissioned in a row
///
/// The session ends at 60 s (or on cancel): advertising stops, scanning
/// resumes, and the radio goes back to the transmission scheduler.

use crate::protocol::{discovery_advertisement, pairing_advertisement, radio_payload, MeshKey};
use crate::radio::{AdvertisingParams, Radio};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const DISCOVERY_PHASE_MS: u64 = 4_000;
pub const LIGHT_ID_SLOT_MS: u64 = 5_000;
pub const SESSION_TIMEOUT_MS: u64 = 60_000;
pub const REISSUE_INTERVAL_MS: u64 = 100;

/// 20 ms
pub const PAIRING_INTERVAL_MIN: u16 = 0x20;
/// 40 ms
pub const PAIRING_INTERVAL_MAX: u16 = 0x40;

/// Scan interval restored when a session ends
pub const RESUME_SCAN_INTERVAL_MS: u32 = 300;

/// First value of the per-packet counter, for every light id
pub const PACKET_COUNTER_START: u8 = 0x50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairingPhase {
    Discovery,
    Pairing,
}

/// Result of one session tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingTick {
    Active,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdvertiseSubstate {
    Idle,
    Advertising { issued_at: u64 },
}

#[derive(Debug, Clone)]
pub struct PairingSession {
    phase: PairingPhase,
    started_at: u64,
    phase_started_at: u64,
    base_light_id: u16,
    current_light_id: u16,
    group_id: u32,
    packet_counter: u8,
    discovery_counter: u8,
    substate: AdvertiseSubstate,
    advertisements_issued: u64,
}

impl PairingSession {
    /// Take the radio: stop scanning and any running advertisement
    pub fn start<R: Radio + ?Sized>(light_id: u16, group_id: u32, now: u64, radio: &mut R) -> Self {
        info!(
            "Starting pairing mode for light {} (group {}), {} s session",
            light_id,
            group_id,
            SESSION_TIMEOUT_MS / 1000
        );

        radio.stop_scanning();
        if let Err(e) = radio.stop_advertising() {
            warn!("Error stopping advertisement before pairing: {}", e);
        }

        Self {
            phase: PairingPhase::Discovery,
            started_at: now,
            phase_started_at: now,
            base_light_id: light_id,
            current_light_id: light_id,
            group_id,
            packet_counter: PACKET_COUNTER_START,
            discovery_counter: 0,
            substate: AdvertiseSubstate::Idle,
            advertisements_issued: 0,
        }
    }

    pub fn phase(&self) -> PairingPhase {
        self.phase
    }

    pub fn base_light_id(&self) -> u16 {
        self.base_light_id
    }

    pub fn current_light_id(&self) -> u16 {
        self.current_light_id
    }

    /// Recorded for logging only; the protocol never transmits it
    pub fn group_id(&self) -> u32 {
        self.group_id
    }

    pub fn elapsed(&self, now: u64) -> u64 {
        now.saturating_sub(self.started_at)
    }

    pub fn advertisements_issued(&self) -> u64 {
        self.advertisements_issued
    }

    pub fn tick<R: Radio + ?Sized>(&mut self, now: u64, key: &MeshKey, radio: &mut R) -> PairingTick {
        let elapsed = self.elapsed(now);

        if self.phase == PairingPhase::Discovery && elapsed >= DISCOVERY_PHASE_MS {
            info!(
                "Discovery phase complete, broadcasting pairing packets for light {}",
                self.current_light_id
            );
            self.phase = PairingPhase::Pairing;
            self.phase_started_at = now;
            self.force_reissue(radio);
        }

        if self.phase == PairingPhase::Pairing {
            let slot = now.saturating_sub(self.phase_started_at) / LIGHT_ID_SLOT_MS;
            let light_id = self.base_light_id.wrapping_add(slot as u16);
            if light_id != self.current_light_id {
                info!("Auto-incrementing pairing target to light {}", light_id);
                self.current_light_id = light_id;
                self.packet_counter = PACKET_COUNTER_START;
                self.force_reissue(radio);
            }
        }

        if elapsed >= SESSION_TIMEOUT_MS {
            info!("Pairing timeout ({} s), exiting pairing mode", SESSION_TIMEOUT_MS / 1000);
            self.finish(radio);
            return PairingTick::Finished;
        }

        let due = match self.substate {
            AdvertiseSubstate::Idle => true,
            AdvertiseSubstate::Advertising { issued_at } => {
                now.saturating_sub(issued_at) >= REISSUE_INTERVAL_MS
            }
        };
        if due {
            self.issue(now, key, radio);
        }

        PairingTick::Active
    }

    /// Release the radio and resume scanning
    pub fn finish<R: Radio + ?Sized>(&mut self, radio: &mut R) {
        if let Err(e) = radio.stop_advertising() {
            warn!("Error stopping pairing advertisement: {}", e);
        }
        self.substate = AdvertiseSubstate::Idle;
        info!("Restarting BLE scanner");
        radio.start_scanning(RESUME_SCAN_INTERVAL_MS);
    }

    fn force_reissue<R: Radio + ?Sized>(&mut self, radio: &mut R) {
        if let Err(e) = radio.stop_advertising() {
            warn!("Error stopping pairing advertisement: {}", e);
        }
        self.substate = AdvertiseSubstate::Idle;
    }

    fn next_advertisement(&self, key: &MeshKey) -> Vec<u8> {
        match self.phase {
            PairingPhase::Discovery => {
                debug!("Broadcasting discovery advertisement (0x4e)");
                discovery_advertisement(self.discovery_counter)
            }
            PairingPhase::Pairing => {
                debug!(
                    "Broadcasting pairing advertisement (0x6e) for light {}",
                    self.current_light_id
                );
                pairing_advertisement(self.packet_counter, self.current_light_id, key)
            }
        }
    }

    /// Counters move only once an advertisement is actually on air
    fn advance_counter(&mut self) {
        match self.phase {
            PairingPhase::Discovery => self.discovery_counter = self.discovery_counter.wrapping_add(1),
            PairingPhase::Pairing => self.packet_counter = self.packet_counter.wrapping_add(1),
        }
    }

    fn issue<R: Radio + ?Sized>(&mut self, now: u64, key: &MeshKey, radio: &mut R) {
        if matches!(self.substate, AdvertiseSubstate::Advertising { .. }) {
            if let Err(e) = radio.stop_advertising() {
                warn!("Error stopping pairing advertisement: {}", e);
            }
        }

        let adv = self.next_advertisement(key);
        if let Err(e) = radio.configure_advertisement(radio_payload(&adv)) {
            warn!("Error setting pairing advertisement data: {}", e);
            return;
        }

        let params = AdvertisingParams::non_connectable(PAIRING_INTERVAL_MIN, PAIRING_INTERVAL_MAX);
        if let Err(e) = radio.start_advertising(&params) {
            warn!("Error starting pairing advertisement: {}", e);
            return;
        }

        self.advance_counter();
        self.substate = AdvertiseSubstate::Advertising { issued_at: now };
        self.advertisements_issued += 1;
    }
}
