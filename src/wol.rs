use pnet::util::MacAddr;
use serde::Deserialize;
use thiserror::Error;

pub const SYNC_HEADER: [u8; 6] = [ 0xff, 0xff, 0xff, 0xff, 0xff, 0xff ];
pub const MAC_LEN: usize = 6;
pub const MAC_REPEATS: usize = 16;
/// Header plus sixteen MAC repetitions, 102 bytes.
pub const MIN_PAYLOAD_LEN: usize = SYNC_HEADER.len() + MAC_LEN * MAC_REPEATS;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WolError {
    #[error("frame carries no payload")]
    NoPayload,

    #[error("payload too short: got {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },

    #[error("invalid WOL header: byte {offset} is {byte:#04x}, expected 0xff")]
    InvalidHeader { offset: usize, byte: u8 },

    #[error("MAC repetition {index} differs from the first one")]
    RepetitionMismatch { index: usize },
}

/// How much of the magic packet shape is enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Header, length and all sixteen repetitions.
    #[default]
    Strict,
    /// Header and length only.
    Lenient,
}

/// Validates a magic packet payload and returns the MAC of its first repetition.
///
/// Anything after the sixteenth repetition (the SecureOn password, or
/// padding) is ignored.
pub fn extract_target_mac(payload: Option<&[u8]>, policy: ValidationPolicy) -> Result<MacAddr, WolError> {
    let payload = match payload {
        Some(p) if !p.is_empty() => p,
        _ => return Err(WolError::NoPayload),
    };

    if payload.len() < MIN_PAYLOAD_LEN {
        return Err(WolError::TooShort { len: payload.len(), min: MIN_PAYLOAD_LEN });
    }

    if let Some((offset, &byte)) = payload[..SYNC_HEADER.len()]
        .iter()
        .enumerate()
        .find(|&(_, &b)| b != 0xff)
    {
        return Err(WolError::InvalidHeader { offset, byte });
    }

    let body = &payload[SYNC_HEADER.len()..MIN_PAYLOAD_LEN];
    let blocks: Vec<&[u8]> = body.chunks(MAC_LEN).collect();

    if policy == ValidationPolicy::Strict {
        for i in 1..blocks.len() {
            if blocks[i] != blocks[0] {
                return Err(WolError::RepetitionMismatch { index: i });
            }
        }
    }

    let m = blocks[0];
    Ok(MacAddr::new(m[0], m[1], m[2], m[3], m[4], m[5]))
}

pub struct MagicPacket {
    packet: Vec<u8>,
}

impl MagicPacket {
    pub fn new(mac: MacAddr) -> MagicPacket {
        let octets = [mac.0, mac.1, mac.2, mac.3, mac.4, mac.5];
        let mut packet = Vec::with_capacity(MIN_PAYLOAD_LEN);
        packet.extend_from_slice(&SYNC_HEADER);
        (0..MAC_REPEATS).for_each(|_| packet.extend_from_slice(&octets));

        MagicPacket { packet }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> MacAddr {
        MacAddr::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff)
    }

    #[test]
    fn test_extracts_first_repetition() {
        let pkt = MagicPacket::new(target());
        let mac = extract_target_mac(Some(pkt.as_bytes()), ValidationPolicy::Strict).unwrap();
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_ignores_trailing_password() {
        for password in [&[1u8, 2, 3, 4][..], &[9u8, 8, 7, 6, 5, 4][..], &[0u8; 40][..]] {
            let mut bytes = MagicPacket::new(target()).as_bytes().to_vec();
            bytes.extend_from_slice(password);
            let mac = extract_target_mac(Some(&bytes), ValidationPolicy::Strict).unwrap();
            assert_eq!(mac, target());
        }
    }

    #[test]
    fn test_missing_payload() {
        assert_eq!(extract_target_mac(None, ValidationPolicy::Strict), Err(WolError::NoPayload));
        assert_eq!(extract_target_mac(Some(&[][..]), ValidationPolicy::Lenient), Err(WolError::NoPayload));
    }

    #[test]
    fn test_short_payload_never_yields_mac() {
        let pkt = MagicPacket::new(target());
        for len in 1..MIN_PAYLOAD_LEN {
            let res = extract_target_mac(Some(&pkt.as_bytes()[..len]), ValidationPolicy::Lenient);
            assert_eq!(res, Err(WolError::TooShort { len, min: MIN_PAYLOAD_LEN }));
        }
    }

    #[test]
    fn test_bad_header() {
        for offset in 0..SYNC_HEADER.len() {
            let mut bytes = MagicPacket::new(target()).as_bytes().to_vec();
            bytes[offset] = 0xfe;
            let res = extract_target_mac(Some(&bytes), ValidationPolicy::Lenient);
            assert_eq!(res, Err(WolError::InvalidHeader { offset, byte: 0xfe }));
        }
    }

    #[test]
    fn test_repetition_mismatch_depends_on_policy() {
        let mut bytes = MagicPacket::new(target()).as_bytes().to_vec();
        // last byte of the tenth repetition
        bytes[SYNC_HEADER.len() + 10 * MAC_LEN - 1] = 0x00;

        assert_eq!(
            extract_target_mac(Some(&bytes), ValidationPolicy::Strict),
            Err(WolError::RepetitionMismatch { index: 9 })
        );
        assert_eq!(extract_target_mac(Some(&bytes), ValidationPolicy::Lenient), Ok(target()));
    }

    #[test]
    fn test_policy_from_yaml() {
        let p: ValidationPolicy = serde_yml::from_str("lenient").unwrap();
        assert_eq!(p, ValidationPolicy::Lenient);
        assert_eq!(ValidationPolicy::default(), ValidationPolicy::Strict);
    }
}
