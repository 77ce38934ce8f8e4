//! Light-state encoder
//!
//! Maps a light snapshot (normalized channels plus a color mode bitset) to
//! the payload bytes a bulb understands:
//!
//! ```text
//! [0] 0x80 | brightness (0-127)   off: single 0x00
//! [1] blue  [2] red  [3] green
//! [4] warm  [5] cold
//! ```

use serde::{Deserialize, Serialize};
use std::ops::BitOr;

/// Color temperature (mireds) at or below which the bulb is fully warm
pub const WARM_MIREDS: f32 = 153.0;

/// Color temperature (mireds) at or above which the bulb is fully cool
pub const COOL_MIREDS: f32 = 500.0;

const LIGHT_DATA_LEN: usize = 6;

/// Capability bitset describing which channels of a snapshot are meaningful
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColorMode(u8);

impl ColorMode {
    pub const ON_OFF: ColorMode = ColorMode(1 << 0);
    pub const BRIGHTNESS: ColorMode = ColorMode(1 << 1);
    pub const WHITE: ColorMode = ColorMode(1 << 2);
    pub const COLOR_TEMPERATURE: ColorMode = ColorMode(1 << 3);
    pub const COLD_WARM_WHITE: ColorMode = ColorMode(1 << 4);
    pub const RGB: ColorMode = ColorMode(1 << 5);

    pub const fn empty() -> Self {
        ColorMode(0)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: ColorMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ColorMode {
    type Output = ColorMode;

    fn bitor(self, rhs: ColorMode) -> ColorMode {
        ColorMode(self.0 | rhs.0)
    }
}

/// Read-only snapshot of a light's target state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightState {
    pub on: bool,
    pub color_mode: ColorMode,
    /// 0.0 - 1.0
    pub brightness: f32,
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub warm_white: f32,
    pub cold_white: f32,
    /// Mireds
    pub color_temperature: f32,
}

impl Default for LightState {
    fn default() -> Self {
        Self {
            on: false,
            color_mode: ColorMode::ON_OFF | ColorMode::BRIGHTNESS,
            brightness: 1.0,
            red: 1.0,
            green: 1.0,
            blue: 1.0,
            warm_white: 0.0,
            cold_white: 0.0,
            color_temperature: WARM_MIREDS,
        }
    }
}

impl LightState {
    pub fn off() -> Self {
        Self::default()
    }

    pub fn on(brightness: f32) -> Self {
        Self {
            on: true,
            brightness,
            ..Self::default()
        }
    }

    pub fn with_rgb(mut self, red: f32, green: f32, blue: f32) -> Self {
        self.color_mode = self.color_mode | ColorMode::RGB;
        self.red = red;
        self.green = green;
        self.blue = blue;
        self
    }

    pub fn with_cold_warm(mut self, cold: f32, warm: f32) -> Self {
        self.color_mode = self.color_mode | ColorMode::COLD_WARM_WHITE;
        self.cold_white = cold;
        self.warm_white = warm;
        self
    }

    pub fn with_color_temperature(mut self, mireds: f32) -> Self {
        self.color_mode = self.color_mode | ColorMode::COLOR_TEMPERATURE;
        self.color_temperature = mireds;
        self
    }

    pub fn with_white(mut self) -> Self {
        self.color_mode = self.color_mode | ColorMode::WHITE;
        self
    }
}

fn channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0) as u8
}

/// Warm/cold byte pair for a color temperature in mireds
fn temperature_channels(mireds: f32) -> (u8, u8) {
    if mireds <= WARM_MIREDS {
        (0xFF, 0x00)
    } else if mireds >= COOL_MIREDS {
        (0x00, 0xFF)
    } else {
        let span = COOL_MIREDS - WARM_MIREDS;
        let warm = (COOL_MIREDS - mireds) * 255.0 / span;
        let cold = (mireds - WARM_MIREDS) * 255.0 / span;
        (warm as u8, cold as u8)
    }
}

/// Encode a light snapshot into command payload bytes.
///
/// White mode returns the bare 7-bit brightness level with no on bit and no
/// channel bytes. Bulbs accept it, but it cannot express a white color
/// switch; left as is until there is a capture of the correct payload.
pub fn encode_light_state(state: &LightState) -> Vec<u8> {
    if !state.on {
        return vec![0x00];
    }

    let level = (state.brightness * 127.0).clamp(0.0, 127.0) as u8;
    let mode = state.color_mode;

    if mode.contains(ColorMode::WHITE) {
        return vec![level];
    }

    let mut data = vec![0u8; LIGHT_DATA_LEN];
    data[0] = 0x80 | level;

    if mode.contains(ColorMode::RGB) {
        data[1] = channel(state.blue);
        data[2] = channel(state.red);
        data[3] = channel(state.green);
    }

    if mode.contains(ColorMode::COLD_WARM_WHITE) {
        data[4] = channel(state.warm_white);
        data[5] = channel(state.cold_white);
    }

    // Color temperature wins over explicit warm/cold values
    if mode.contains(ColorMode::COLOR_TEMPERATURE) {
        let (warm, cold) = temperature_channels(state.color_temperature);
        data[4] = warm;
        data[5] = cold;
    }

    data
}
