// Debounce / dedup layer
//
// Light front-ends may publish many state updates per second (dimmer
// sliders, transitions). Each update is staged per light and only released
// once it has settled, the light's minimum send interval has passed, and the
// bytes actually differ from what was last sent.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace};

pub const DEFAULT_SETTLE_MS: u64 = 100;
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceConfig {
    /// Quiet time required after the last update before sending
    pub settle_ms: u64,
    /// Minimum time between two sends for the same light
    pub min_interval_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            settle_ms: DEFAULT_SETTLE_MS,
            min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
        }
    }
}

/// Per-light record, created on first update and kept for the process lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LightDebounceState {
    /// Bytes of the last command handed to the queue, forgotten if the queue is cleared
    pub last_sent: Option<Vec<u8>>,
    /// Staged bytes not yet released
    pub pending: Option<Vec<u8>>,
    pub last_change_at: u64,
    pub last_sent_at: Option<u64>,
}

pub struct DebounceLayer {
    lights: Mutex<HashMap<u16, LightDebounceState>>,
    config: RwLock<DebounceConfig>,
}

impl DebounceLayer {
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            lights: Mutex::new(HashMap::new()),
            config: RwLock::new(config),
        }
    }

    pub fn config(&self) -> DebounceConfig {
        *self.config.read()
    }

    pub fn set_config(&self, config: DebounceConfig) {
        *self.config.write() = config;
    }

    /// Stage the latest payload for a light, replacing anything pending
    pub fn stage(&self, light_id: u16, payload: Vec<u8>, now: u64) {
        let mut lights = self.lights.lock();
        let record = lights.entry(light_id).or_default();
        record.pending = Some(payload);
        record.last_change_at = now;
        trace!("Staged update for light {}", light_id);
    }

    /// Lights with a staged update
    pub fn pending_count(&self) -> usize {
        self.lights
            .lock()
            .values()
            .filter(|r| r.pending.is_some())
            .count()
    }

    pub fn snapshot(&self, light_id: u16) -> Option<LightDebounceState> {
        self.lights.lock().get(&light_id).cloned()
    }

    /// Forget the last-sent bytes of every light.
    ///
    /// Called when queued frames are discarded before transmission, so a
    /// re-issued identical state is not mistaken for a duplicate.
    pub fn forget_sent(&self) {
        for record in self.lights.lock().values_mut() {
            record.last_sent = None;
        }
    }

    /// Release every staged update that is ready.
    ///
    /// `emit` receives the light id and payload and returns whether the
    /// command was accepted downstream. Accepted payloads become the light's
    /// last-sent bytes; rejected ones are discarded without touching them.
    /// Lights are visited oldest change first. Returns the number accepted.
    pub fn flush<F>(&self, now: u64, mut emit: F) -> usize
    where
        F: FnMut(u16, &[u8]) -> bool,
    {
        let config = self.config();
        let mut lights = self.lights.lock();

        let mut ready: Vec<(u64, u16)> = lights
            .iter()
            .filter(|(_, r)| r.pending.is_some())
            .map(|(id, r)| (r.last_change_at, *id))
            .collect();
        ready.sort_unstable();

        let mut accepted = 0;
        for (_, light_id) in ready {
            let Some(record) = lights.get_mut(&light_id) else {
                continue;
            };

            if now.saturating_sub(record.last_change_at) < config.settle_ms {
                continue;
            }
            if let Some(sent_at) = record.last_sent_at {
                if now.saturating_sub(sent_at) < config.min_interval_ms {
                    continue;
                }
            }

            let Some(payload) = record.pending.take() else {
                continue;
            };

            if record.last_sent.as_deref() == Some(payload.as_slice()) {
                debug!("Suppressing duplicate update for light {}", light_id);
                continue;
            }

            if emit(light_id, &payload) {
                record.last_sent = Some(payload);
                record.last_sent_at = Some(now);
                accepted += 1;
            }
        }

        accepted
    }
}

impl Default for DebounceLayer {
    fn default() -> Self {
        Self::new(DebounceConfig::default())
    }
}
