/// RF framing seam
///
/// Encrypted frames are handed to a framing step before they become the
/// body of a manufacturer-specific advertisement record. The framing step is
/// a collaborator with a fixed contract: `frame(address, body) -> bytes`.

/// Fixed broadcast address every frame is sent to
pub const BROADCAST_ADDRESS: [u8; 3] = [0xC1, 0xC2, 0xC3];

/// Formats an encrypted frame for the link layer
pub trait RfFramer: Send + Sync {
    fn frame(&self, address: &[u8], body: &[u8]) -> Vec<u8>;
}

/// Framer that prefixes the address in over-the-air (reversed) byte order
/// and leaves the body untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct AddressPrefixFramer;

impl RfFramer for AddressPrefixFramer {
    fn frame(&self, address: &[u8], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(address.len() + body.len());
        out.extend(address.iter().rev());
        out.extend_from_slice(body);
        out
    }
}
