/// Fastcon mesh protocol
///
/// Pure byte-level pieces of the protocol. Nothing here touches the radio or
/// the clock:
///
/// - **codec**: light commands to encrypted, checksum-protected mesh frames
/// - **framing**: the RF framing step that prefixes the broadcast address
/// - **light**: light-state snapshot to command payload bytes
/// - **advertisement**: raw advertisement layouts for queued frames and for
///   commissioning (discovery / pairing)

pub mod advertisement;
pub mod codec;
pub mod framing;
pub mod light;

pub use advertisement::{
    command_advertisement, discovery_advertisement, pairing_advertisement,
    pairing_placeholder_checksum, radio_payload, AdvertisementError, DISCOVERY_COMMAND,
    MANUFACTURER_ID, MAX_ADVERTISEMENT_LEN, PAIRING_COMMAND,
};
pub use codec::{
    control_payload, encode_frame, frame_checksum, CommandType, Frame, LightCommand, MeshKey,
    PacketCodec, SequenceCounter, BROADCAST_LIGHT_ID, HEADER_LEN, HEADER_XOR_KEY,
};
pub use framing::{AddressPrefixFramer, RfFramer, BROADCAST_ADDRESS};
pub use light::{encode_light_state, ColorMode, LightState};
