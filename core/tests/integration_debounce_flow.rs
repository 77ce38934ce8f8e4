//! Light updates end to end: debounce layer, codec, queue, scheduler, radio.
//!
//! Run with: cargo test --test integration_debounce_flow

use fastcon_core::{
    Clock, ControllerConfig, FastconController, Frame, LightState, ManualClock, MeshKey,
    RecordingRadio,
};

const KEY: MeshKey = MeshKey::new(*b"0236");

/// flags (3) + manufacturer header (4) + broadcast address (3)
const FRAME_OFFSET: usize = 10;

fn setup() -> (FastconController<RecordingRadio, ManualClock>, RecordingRadio, ManualClock) {
    let radio = RecordingRadio::new();
    let clock = ManualClock::new();
    let controller =
        FastconController::new(ControllerConfig::new(KEY), radio.clone(), clock.clone())
            .expect("default config is valid");
    (controller, radio, clock)
}

/// Decrypted control payload `[header, light_id_low, light data...]`
fn control_payload(adv: &[u8]) -> Vec<u8> {
    let plain = Frame::from(adv[FRAME_OFFSET..].to_vec()).decrypt(&KEY);
    plain[4..].to_vec()
}

fn run_until(controller: &FastconController<RecordingRadio, ManualClock>, clock: &ManualClock, end: u64) {
    while clock.now_ms() < end {
        clock.advance(10);
        controller.tick();
    }
}

#[test]
fn test_three_lights_off_yield_three_frames() {
    let (controller, radio, clock) = setup();

    for (i, light_id) in [1u16, 2, 3].into_iter().enumerate() {
        clock.set(i as u64 * 20);
        controller.update_light_state(light_id, &LightState::off());
        controller.tick();
    }

    run_until(&controller, &clock, 1_000);

    let sent = radio.transmitted();
    assert_eq!(sent.len(), 3, "one frame per light, not one per event");

    let mut ids: Vec<u8> = sent.iter().map(|adv| control_payload(adv)[1]).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(sent.iter().all(|adv| control_payload(adv)[2] == 0x00));
}

#[test]
fn test_rapid_brightness_updates_collapse() {
    let (controller, radio, clock) = setup();

    for i in 0..10u64 {
        clock.set(i * 8);
        controller.update_light_state(4, &LightState::on((i + 1) as f32 / 10.0));
        controller.tick();
    }

    run_until(&controller, &clock, 1_000);

    let sent = radio.transmitted();
    assert_eq!(sent.len(), 1);
    assert_eq!(control_payload(&sent[0])[2], 0x80 | 127, "final brightness wins");
}

#[test]
fn test_identical_state_not_resent() {
    let (controller, radio, clock) = setup();

    controller.update_light_state(1, &LightState::on(0.5));
    run_until(&controller, &clock, 500);
    controller.update_light_state(1, &LightState::on(0.5));
    run_until(&controller, &clock, 1_500);

    assert_eq!(radio.transmitted().len(), 1);
    assert_eq!(controller.status().pending_updates, 0);
}

#[test]
fn test_rate_limit_per_light() {
    let (controller, radio, clock) = setup();

    // A new level every 150 ms for 3 s; each one settles before the next
    let mut sent_at = Vec::new();
    let mut level = 0.0f32;
    while clock.now_ms() < 3_000 {
        if clock.now_ms() % 150 == 0 {
            level = if level > 0.5 { 0.1 } else { level + 0.1 };
            controller.update_light_state(9, &LightState::on(level));
        }
        let before = radio.transmitted().len();
        controller.tick();
        if radio.transmitted().len() > before {
            sent_at.push(clock.now_ms());
        }
        clock.advance(10);
    }

    assert!(sent_at.len() >= 2);
    for pair in sent_at.windows(2) {
        assert!(pair[1] - pair[0] >= 300, "frames {:?} closer than 300 ms", pair);
    }
}

#[test]
fn test_settle_delay_before_first_frame() {
    let (controller, radio, clock) = setup();

    controller.update_light_state(1, &LightState::on(1.0));
    run_until(&controller, &clock, 90);
    assert!(radio.transmitted().is_empty());

    run_until(&controller, &clock, 100);
    assert_eq!(radio.transmitted().len(), 1);
}
