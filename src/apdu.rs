//! APDU encoding and the command set of the IOV Ledger app.

use crate::config::HD_PATH;

/// Instruction class of the IOV (ledger-cosmos derived) app.
pub const CLA: u8 = 0x55;

pub const INS_GET_VERSION: u8 = 0x00;
pub const INS_SIGN_SECP256K1: u8 = 0x02;
pub const INS_GET_ADDR_SECP256K1: u8 = 0x04;

/// The app info command is handled by the dashboard, not the app.
pub const CLA_DASHBOARD: u8 = 0xB0;
pub const INS_APP_INFO: u8 = 0x01;

const P1_NO_DISPLAY: u8 = 0x00;
const P1_DISPLAY: u8 = 0x01;

/// Sign payload chunk markers.
const P1_INIT: u8 = 0x00;
const P1_ADD: u8 = 0x01;
const P1_LAST: u8 = 0x02;

/// Maximum payload bytes per sign chunk.
const CHUNK_SIZE: usize = 250;

#[derive(Clone, Debug)]
pub struct ApduCommand {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
}

impl ApduCommand {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.cla, self.ins, self.p1, self.p2, self.data.len() as u8];
        out.extend(self.data.iter());
        out
    }
}

/// The fixed derivation path, serialized the way the app expects it: five
/// little-endian u32 components with the hardened bit set on the first three.
pub fn serialize_hd_path() -> Vec<u8> {
    const HARDENED: u32 = 0x8000_0000;
    let mut out = Vec::with_capacity(20);
    for (i, component) in HD_PATH.iter().enumerate() {
        let value = if i < 3 { component | HARDENED } else { *component };
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn apdu_app_info() -> ApduCommand {
    ApduCommand {
        cla: CLA_DASHBOARD,
        ins: INS_APP_INFO,
        p1: 0,
        p2: 0,
        data: vec![],
    }
}

pub fn apdu_get_version() -> ApduCommand {
    ApduCommand {
        cla: CLA,
        ins: INS_GET_VERSION,
        p1: 0,
        p2: 0,
        data: vec![],
    }
}

/// Derives the public key and bech32 address at the fixed path. With
/// `display` set, the device shows the address and waits for confirmation.
pub fn apdu_get_address(bech32_prefix: &str, display: bool) -> ApduCommand {
    let mut data = Vec::with_capacity(1 + bech32_prefix.len() + 20);
    data.push(bech32_prefix.len() as u8);
    data.extend_from_slice(bech32_prefix.as_bytes());
    data.extend_from_slice(&serialize_hd_path());
    ApduCommand {
        cla: CLA,
        ins: INS_GET_ADDR_SECP256K1,
        p1: if display { P1_DISPLAY } else { P1_NO_DISPLAY },
        p2: 0,
        data,
    }
}

/// Splits a signing request into the chunk sequence the app expects: the
/// serialized path first, then the message in order, with the last chunk
/// marked so the device knows when to render the approval screen.
pub fn apdu_sign_chunks(message: &[u8]) -> Vec<ApduCommand> {
    let mut chunks = vec![ApduCommand {
        cla: CLA,
        ins: INS_SIGN_SECP256K1,
        p1: P1_INIT,
        p2: 0,
        data: serialize_hd_path(),
    }];

    let pieces: Vec<&[u8]> = message.chunks(CHUNK_SIZE).collect();
    for (i, piece) in pieces.iter().enumerate() {
        let last = i + 1 == pieces.len();
        chunks.push(ApduCommand {
            cla: CLA,
            ins: INS_SIGN_SECP256K1,
            p1: if last { P1_LAST } else { P1_ADD },
            p2: 0,
            data: piece.to_vec(),
        });
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_prefixes_the_header_and_length() {
        let cmd = ApduCommand {
            cla: 0x55,
            ins: 0x04,
            p1: 1,
            p2: 0,
            data: vec![0xAA, 0xBB],
        };
        assert_eq!(cmd.encode(), vec![0x55, 0x04, 0x01, 0x00, 0x02, 0xAA, 0xBB]);
    }

    #[test]
    fn hd_path_hardens_purpose_coin_and_account() {
        let raw = serialize_hd_path();
        assert_eq!(raw.len(), 20);
        assert_eq!(&raw[0..4], &(44u32 | 0x8000_0000).to_le_bytes());
        assert_eq!(&raw[4..8], &(234u32 | 0x8000_0000).to_le_bytes());
        assert_eq!(&raw[8..12], &0x8000_0000u32.to_le_bytes());
        assert_eq!(&raw[12..16], &0u32.to_le_bytes());
        assert_eq!(&raw[16..20], &0u32.to_le_bytes());
    }

    #[test]
    fn get_address_embeds_the_prefix() {
        let cmd = apdu_get_address("star", true);
        assert_eq!(cmd.p1, 1);
        assert_eq!(cmd.data[0], 4);
        assert_eq!(&cmd.data[1..5], b"star");
        assert_eq!(cmd.data.len(), 1 + 4 + 20);
    }

    #[test]
    fn sign_chunking_marks_the_last_chunk() {
        let message = vec![0u8; 600];
        let chunks = apdu_sign_chunks(&message);
        // path + ceil(600 / 250) payload chunks
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].p1, 0);
        assert_eq!(chunks[1].p1, 1);
        assert_eq!(chunks[2].p1, 1);
        assert_eq!(chunks[3].p1, 2);
        assert_eq!(chunks[3].data.len(), 100);
    }

    #[test]
    fn short_messages_sign_in_a_single_payload_chunk() {
        let chunks = apdu_sign_chunks(b"{}");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].p1, 2);
    }
}
