/// Transmission scheduler
///
/// Cyclic state machine owning the radio while no pairing session runs:
///
/// ```text
/// Idle --(queue non-empty, radio started)--> Advertising
/// Advertising --(duration elapsed, radio stopped)--> Gap
/// Gap --(gap elapsed)--> Idle
/// ```
///
/// One frame goes out per full cycle. Radio failures keep the current
/// state so the next tick retries.

use super::queue::CommandQueue;
use crate::protocol::command_advertisement;
use crate::radio::{AdvertisingParams, Radio};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleState {
    Idle,
    Advertising,
    Gap,
}

/// Duty cycle parameters, taken from the controller configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerTiming {
    /// Units of 0.625 ms
    pub interval_min: u16,
    /// Units of 0.625 ms
    pub interval_max: u16,
    pub duration_ms: u64,
    pub gap_ms: u64,
}

#[derive(Debug, Clone)]
pub struct TransmissionScheduler {
    state: ScheduleState,
    state_started_at: u64,
    frames_sent: u64,
}

impl TransmissionScheduler {
    pub fn new() -> Self {
        Self {
            state: ScheduleState::Idle,
            state_started_at: 0,
            frames_sent: 0,
        }
    }

    pub fn state(&self) -> ScheduleState {
        self.state
    }

    /// Frames successfully handed to the radio
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Drop back to Idle, e.g. after the radio was taken away
    pub fn reset(&mut self) {
        self.state = ScheduleState::Idle;
    }

    /// Advance the state machine. Does bounded work and never blocks.
    pub fn tick<R: Radio + ?Sized>(
        &mut self,
        now: u64,
        queue: &CommandQueue,
        radio: &mut R,
        timing: &SchedulerTiming,
    ) -> ScheduleState {
        let elapsed = now.saturating_sub(self.state_started_at);

        match self.state {
            ScheduleState::Idle => self.start_next(now, queue, radio, timing),
            ScheduleState::Advertising => {
                if elapsed >= timing.duration_ms {
                    match radio.stop_advertising() {
                        Ok(()) => {
                            self.state = ScheduleState::Gap;
                            self.state_started_at = now;
                            trace!("Stopped advertising, entering gap period");
                        }
                        Err(e) => warn!("Error stopping advertisement: {}", e),
                    }
                }
            }
            ScheduleState::Gap => {
                if elapsed >= timing.gap_ms {
                    self.state = ScheduleState::Idle;
                    trace!("Gap period complete");
                    // A cycle is exactly duration + gap long
                    self.start_next(now, queue, radio, timing);
                }
            }
        }

        self.state
    }

    fn start_next<R: Radio + ?Sized>(
        &mut self,
        now: u64,
        queue: &CommandQueue,
        radio: &mut R,
        timing: &SchedulerTiming,
    ) {
        let Some(entry) = queue.dequeue() else {
            return;
        };

        let adv = match command_advertisement(&entry.data) {
            Ok(adv) => adv,
            Err(e) => {
                warn!("Dropping command for light {}: {}", entry.light_id, e);
                return;
            }
        };

        if let Err(e) = radio.configure_advertisement(&adv) {
            warn!("Error setting raw advertisement data: {}", e);
            queue.retry(entry);
            return;
        }

        let params = AdvertisingParams::non_connectable(timing.interval_min, timing.interval_max);
        if let Err(e) = radio.start_advertising(&params) {
            warn!("Error starting advertisement: {}", e);
            queue.retry(entry);
            return;
        }

        self.state = ScheduleState::Advertising;
        self.state_started_at = now;
        self.frames_sent += 1;
        trace!(
            "Started advertising for light {} ({} ms in queue)",
            entry.light_id,
            now.saturating_sub(entry.enqueued_at)
        );
    }
}

impl Default for TransmissionScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::{MockRadio, RadioError, RecordingRadio};

    const TIMING: SchedulerTiming = SchedulerTiming {
        interval_min: 0x20,
        interval_max: 0x40,
        duration_ms: 50,
        gap_ms: 10,
    };

    #[test]
    fn test_idle_with_empty_queue_stays_idle() {
        let mut scheduler = TransmissionScheduler::new();
        let mut radio = RecordingRadio::new();
        let queue = CommandQueue::default();

        assert_eq!(scheduler.tick(0, &queue, &mut radio, &TIMING), ScheduleState::Idle);
        assert!(radio.events().is_empty());
    }

    #[test]
    fn test_full_cycle() {
        let mut scheduler = TransmissionScheduler::new();
        let mut radio = RecordingRadio::new();
        let queue = CommandQueue::default();
        queue.enqueue(1, vec![0xAA], 0).unwrap();

        assert_eq!(scheduler.tick(0, &queue, &mut radio, &TIMING), ScheduleState::Advertising);
        assert_eq!(
            radio.transmitted(),
            vec![vec![0x02, 0x01, 0x06, 0x03, 0xFF, 0xF0, 0xFF, 0xAA]]
        );
        assert_eq!(scheduler.tick(49, &queue, &mut radio, &TIMING), ScheduleState::Advertising);
        assert_eq!(scheduler.tick(50, &queue, &mut radio, &TIMING), ScheduleState::Gap);
        assert!(!radio.is_advertising());
        assert_eq!(scheduler.tick(59, &queue, &mut radio, &TIMING), ScheduleState::Gap);
        assert_eq!(scheduler.tick(60, &queue, &mut radio, &TIMING), ScheduleState::Idle);
        assert_eq!(scheduler.frames_sent(), 1);
    }

    #[test]
    fn test_gap_end_starts_next_frame_immediately() {
        let mut scheduler = TransmissionScheduler::new();
        let mut radio = RecordingRadio::new();
        let queue = CommandQueue::default();
        queue.enqueue(1, vec![1], 0).unwrap();
        queue.enqueue(2, vec![2], 0).unwrap();

        scheduler.tick(0, &queue, &mut radio, &TIMING);
        scheduler.tick(50, &queue, &mut radio, &TIMING);
        assert_eq!(scheduler.tick(60, &queue, &mut radio, &TIMING), ScheduleState::Advertising);
        assert_eq!(scheduler.frames_sent(), 2);
    }

    #[test]
    fn test_start_failure_requeues_and_holds_idle() {
        let mut scheduler = TransmissionScheduler::new();
        let mut radio = MockRadio::new();
        radio.expect_configure_advertisement().returning(|_| Ok(()));
        radio
            .expect_start_advertising()
            .times(1)
            .returning(|_| Err(RadioError::Start("busy".into())));

        let queue = CommandQueue::default();
        queue.enqueue(7, vec![1, 2], 0).unwrap();

        assert_eq!(scheduler.tick(0, &queue, &mut radio, &TIMING), ScheduleState::Idle);
        let entry = queue.dequeue().expect("entry kept for retry");
        assert_eq!(entry.light_id, 7);
        assert_eq!(entry.retries, 1);
    }

    #[test]
    fn test_configure_failure_never_starts() {
        let mut scheduler = TransmissionScheduler::new();
        let mut radio = MockRadio::new();
        radio
            .expect_configure_advertisement()
            .returning(|_| Err(RadioError::Configure("bad length".into())));
        radio.expect_start_advertising().never();

        let queue = CommandQueue::default();
        queue.enqueue(1, vec![1], 0).unwrap();

        for now in 0..3 {
            scheduler.tick(now, &queue, &mut radio, &TIMING);
        }
        assert!(queue.is_empty(), "dropped after exhausting retries");
        assert_eq!(scheduler.state(), ScheduleState::Idle);
    }

    #[test]
    fn test_stop_failure_holds_advertising() {
        let mut scheduler = TransmissionScheduler::new();
        let mut radio = MockRadio::new();
        radio.expect_configure_advertisement().returning(|_| Ok(()));
        radio.expect_start_advertising().returning(|_| Ok(()));
        let mut stops = 0;
        radio.expect_stop_advertising().times(2).returning(move || {
            stops += 1;
            if stops == 1 {
                Err(RadioError::Stop("busy".into()))
            } else {
                Ok(())
            }
        });

        let queue = CommandQueue::default();
        queue.enqueue(1, vec![1], 0).unwrap();

        scheduler.tick(0, &queue, &mut radio, &TIMING);
        assert_eq!(scheduler.tick(50, &queue, &mut radio, &TIMING), ScheduleState::Advertising);
        assert_eq!(scheduler.tick(51, &queue, &mut radio, &TIMING), ScheduleState::Gap);
    }

    #[test]
    fn test_oversized_entry_dropped() {
        let mut scheduler = TransmissionScheduler::new();
        let mut radio = RecordingRadio::new();
        let queue = CommandQueue::default();
        queue.enqueue(1, vec![0u8; 40], 0).unwrap();

        assert_eq!(scheduler.tick(0, &queue, &mut radio, &TIMING), ScheduleState::Idle);
        assert!(queue.is_empty());
        assert!(radio.transmitted().is_empty());
    }
}
