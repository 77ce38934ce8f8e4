// Offline scenarios on a simulated clock.
//
// Both scenarios run the real controller against ManualClock and
// RecordingRadio and report what the radio was asked to do, in order.

use anyhow::Result;
use fastcon_core::{
    ControllerConfig, FastconController, LightState, ManualClock, PairingPhase, RadioEvent,
    RecordingRadio,
};

/// Polling period of the simulated loop
pub const SIM_TICK_MS: u64 = 5;

#[derive(Debug, Clone, Copy)]
pub struct UpdateScenario {
    /// Lights updated each round, ids 1..=lights
    pub lights: u16,
    /// Rounds of updates; each round moves every light to a new brightness
    pub updates: u32,
    pub spacing_ms: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct UpdateReport {
    pub timeline: Vec<(u64, RadioEvent)>,
    pub updates_staged: u64,
    pub frames_sent: u64,
}

pub fn simulate_updates(config: ControllerConfig, scenario: &UpdateScenario) -> Result<UpdateReport> {
    let radio = RecordingRadio::new();
    let clock = ManualClock::new();
    let controller = FastconController::new(config, radio.clone(), clock.clone())?;

    let mut timeline = Vec::new();
    let mut updates_staged = 0;
    let mut round = 0u32;
    let mut now = 0u64;

    while now <= scenario.duration_ms {
        clock.set(now);

        while round < scenario.updates && u64::from(round) * scenario.spacing_ms <= now {
            let brightness = (round + 1) as f32 / scenario.updates as f32;
            for light_id in 1..=scenario.lights {
                controller.update_light_state(light_id, &LightState::on(brightness));
                updates_staged += 1;
            }
            round += 1;
        }

        controller.tick();
        timeline.extend(radio.take_events().into_iter().map(|event| (now, event)));
        now += SIM_TICK_MS;
    }

    Ok(UpdateReport {
        timeline,
        updates_staged,
        frames_sent: controller.status().frames_sent,
    })
}

#[derive(Debug, Clone)]
pub struct PairingAdvertisement {
    pub at_ms: u64,
    pub phase: PairingPhase,
    pub light_id: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct PairingReport {
    pub advertisements: Vec<PairingAdvertisement>,
    /// Clock time scanning resumed, if the session ended within the run
    pub finished_at: Option<u64>,
}

pub fn simulate_pairing(
    config: ControllerConfig,
    light_id: u16,
    group_id: u32,
    duration_ms: u64,
) -> Result<PairingReport> {
    let radio = RecordingRadio::new();
    let clock = ManualClock::new();
    let controller = FastconController::new(config, radio.clone(), clock.clone())?;
    controller.pair_device(light_id, group_id);

    let mut advertisements = Vec::new();
    let mut finished_at = None;
    let mut now = 0u64;

    while now <= duration_ms {
        clock.set(now);
        controller.tick();
        let status = controller.status();

        for event in radio.take_events() {
            match event {
                RadioEvent::Configured(data) => {
                    if let (Some(phase), Some(light_id)) = (status.pairing_phase, status.pairing_light_id) {
                        advertisements.push(PairingAdvertisement {
                            at_ms: now,
                            phase,
                            light_id,
                            data,
                        });
                    }
                }
                RadioEvent::StartedScanning(_) => finished_at = Some(now),
                _ => {}
            }
        }

        if finished_at.is_some() {
            break;
        }
        now += SIM_TICK_MS;
    }

    Ok(PairingReport {
        advertisements,
        finished_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastcon_core::MeshKey;

    fn config() -> ControllerConfig {
        ControllerConfig::new(MeshKey::new(*b"0236"))
    }

    #[test]
    fn test_update_scenario_coalesces() {
        let scenario = UpdateScenario {
            lights: 3,
            updates: 10,
            spacing_ms: 8,
            duration_ms: 1_000,
        };
        let report = simulate_updates(config(), &scenario).unwrap();

        assert_eq!(report.updates_staged, 30);
        assert_eq!(report.frames_sent, 3);
    }

    #[test]
    fn test_pairing_scenario_runs_to_timeout() {
        let report = simulate_pairing(config(), 10, 1, 70_000).unwrap();

        assert_eq!(report.finished_at, Some(60_000));
        assert_eq!(report.advertisements[0].phase, PairingPhase::Discovery);
        let last = report.advertisements.last().unwrap();
        assert_eq!(last.phase, PairingPhase::Pairing);
        assert_eq!(last.light_id, 21);
    }

    #[test]
    fn test_pairing_scenario_truncated() {
        let report = simulate_pairing(config(), 10, 1, 1_000).unwrap();
        assert!(report.finished_at.is_none());
        assert_eq!(report.advertisements.len(), 11);
    }
}
