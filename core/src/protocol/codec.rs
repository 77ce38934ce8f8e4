/// Mesh packet codec
///
/// Turns a light command into the 4-byte-header frame that fastcon bulbs
/// listen for. The "encryption" is a fixed XOR scheme: header bytes use a
/// public constant, payload bytes use the operator's mesh key.
///
/// Frame layout before encryption:
///
/// ```text
/// [0] forward:1 | command_type:3 | light_id_high:4
/// [1] sequence
/// [2] mesh_key[3] ("safe key")
/// [3] checksum (sum of every other byte, mod 256)
/// [4..] payload
/// ```

use crate::config::ConfigError;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Header length in bytes
pub const HEADER_LEN: usize = 4;

/// Fixed XOR constant applied to the header bytes
pub const HEADER_XOR_KEY: [u8; 4] = [0x5E, 0x36, 0x7B, 0xC4];

/// Light id addressing every bulb in the mesh
pub const BROADCAST_LIGHT_ID: u16 = 0xFFFF;

/// Length of the inner payload used for light control commands
pub const CONTROL_PAYLOAD_LEN: usize = 12;

const CHECKSUM_INDEX: usize = 3;

/// 4-byte operator-provisioned mesh key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshKey([u8; 4]);

impl MeshKey {
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Parse from 8 hex characters. Whitespace is ignored.
    pub fn from_hex(value: &str) -> Result<Self, ConfigError> {
        let cleaned: String = value.chars().filter(|c| !c.is_whitespace()).collect();
        if cleaned.len() != 8 {
            return Err(ConfigError::InvalidMeshKey(
                "Mesh key must be exactly 4 bytes (8 hex characters)".to_string(),
            ));
        }

        let decoded = hex::decode(&cleaned)
            .map_err(|e| ConfigError::InvalidMeshKey(format!("Invalid hex value: {}", e)))?;

        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Fourth key byte, carried in header byte 2
    pub fn safe_key(&self) -> u8 {
        self.0[3]
    }
}

impl fmt::Debug for MeshKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MeshKey({})", self.to_hex())
    }
}

impl fmt::Display for MeshKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for MeshKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for MeshKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        MeshKey::from_hex(&value).map_err(serde::de::Error::custom)
    }
}

/// Mesh command type (3 bits on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandType {
    /// Response sent while commissioning a bulb
    PairingResponse = 2,
    /// Light control
    Control = 5,
}

impl CommandType {
    pub fn value(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for CommandType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(CommandType::PairingResponse),
            5 => Ok(CommandType::Control),
            other => Err(other),
        }
    }
}

/// A command waiting to be encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightCommand {
    pub light_id: u16,
    pub command_type: CommandType,
    pub payload: Vec<u8>,
    pub forward: bool,
}

impl LightCommand {
    /// Control command with forwarding enabled, the shape every outbound
    /// light command takes
    pub fn control(light_id: u16, payload: Vec<u8>) -> Self {
        Self {
            light_id,
            command_type: CommandType::Control,
            payload,
            forward: true,
        }
    }
}

/// Encrypted frame ready for RF framing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Vec<u8>);

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Undo the XOR layers, yielding the plaintext header and payload
    pub fn decrypt(&self, key: &MeshKey) -> Vec<u8> {
        let mut plain = self.0.clone();
        apply_xor(&mut plain, key);
        plain
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Frame(bytes)
    }
}

/// Protocol sequence counter.
///
/// Starts at 0 and wraps from 254 back to 1, so 0 is only ever emitted once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceCounter {
    next: u8,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    /// Start from an explicit value (255 is folded to 1)
    pub fn starting_at(next: u8) -> Self {
        Self {
            next: if next == u8::MAX { 1 } else { next },
        }
    }

    /// Value the next frame will carry
    pub fn peek(&self) -> u8 {
        self.next
    }

    /// Return the current value and move to the next one
    pub fn advance(&mut self) -> u8 {
        let current = self.next;
        self.next = current.wrapping_add(1);
        if self.next == u8::MAX {
            self.next = 1;
        }
        current
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Sum of all bytes except the checksum slot, mod 256
pub fn frame_checksum(body: &[u8]) -> u8 {
    body.iter()
        .enumerate()
        .filter(|(i, _)| *i != CHECKSUM_INDEX)
        .fold(0u8, |acc, (_, b)| acc.wrapping_add(*b))
}

fn apply_xor(body: &mut [u8], key: &MeshKey) {
    let split = body.len().min(HEADER_LEN);
    let (header, payload) = body.split_at_mut(split);
    for (i, b) in header.iter_mut().enumerate() {
        *b ^= HEADER_XOR_KEY[i & 3];
    }
    for (i, b) in payload.iter_mut().enumerate() {
        *b ^= key.as_bytes()[i & 3];
    }
}

/// Encode a command with an explicit sequence value.
///
/// Total over its domain: the payload length is the caller's contract with
/// the advertisement budget.
pub fn encode_frame(command: &LightCommand, key: &MeshKey, sequence: u8) -> Frame {
    let mut body = vec![0u8; HEADER_LEN + command.payload.len()];

    let id_high = (command.light_id >> 8) as u8;
    body[0] = (id_high & 0x0F)
        | ((command.command_type.value() & 0x07) << 4)
        | if command.forward { 0x80 } else { 0x00 };
    body[1] = sequence;
    body[2] = key.safe_key();
    body[HEADER_LEN..].copy_from_slice(&command.payload);
    body[CHECKSUM_INDEX] = frame_checksum(&body);

    apply_xor(&mut body, key);
    Frame(body)
}

/// Wrap light-state bytes in the 12-byte control payload bulbs expect:
/// `[0x02 | (len + 1) << 4, light_id_low, data..., 0...]`
pub fn control_payload(light_id: u16, light_data: &[u8]) -> Vec<u8> {
    let data = &light_data[..light_data.len().min(CONTROL_PAYLOAD_LEN - 2)];

    let mut payload = vec![0u8; CONTROL_PAYLOAD_LEN];
    payload[0] = 0x02 | ((((data.len() + 1) & 0x0F) << 4) as u8);
    payload[1] = (light_id & 0xFF) as u8;
    payload[2..2 + data.len()].copy_from_slice(data);
    payload
}

/// Codec holding the mesh key and the shared sequence counter
pub struct PacketCodec {
    mesh_key: RwLock<MeshKey>,
    sequence: Mutex<SequenceCounter>,
}

impl PacketCodec {
    pub fn new(mesh_key: MeshKey) -> Self {
        Self {
            mesh_key: RwLock::new(mesh_key),
            sequence: Mutex::new(SequenceCounter::new()),
        }
    }

    pub fn with_sequence(mesh_key: MeshKey, sequence: SequenceCounter) -> Self {
        Self {
            mesh_key: RwLock::new(mesh_key),
            sequence: Mutex::new(sequence),
        }
    }

    pub fn mesh_key(&self) -> MeshKey {
        *self.mesh_key.read()
    }

    pub fn set_mesh_key(&self, key: MeshKey) {
        *self.mesh_key.write() = key;
    }

    pub fn next_sequence(&self) -> u8 {
        self.sequence.lock().peek()
    }

    /// Encode a command, consuming one sequence value
    pub fn encode(&self, command: &LightCommand) -> Frame {
        let sequence = self.sequence.lock().advance();
        encode_frame(command, &self.mesh_key(), sequence)
    }

    /// Encode light-state bytes as a forwarded control command
    pub fn encode_light_control(&self, light_id: u16, light_data: &[u8]) -> Frame {
        let payload = control_payload(light_id, light_data);
        tracing::trace!(
            "Inner payload for light {} ({} bytes): {}",
            light_id,
            payload.len(),
            hex::encode(&payload)
        );
        self.encode(&LightCommand::control(light_id, payload))
    }
}
