//! Classic ledger address decoding.
//!
//! A classic address is base58 (ripple alphabet) over
//! `[0x00][20-byte account id][4-byte checksum]`, where the checksum is the
//! first four bytes of a double SHA-256 over the first 21 bytes.

use sha2::{Digest, Sha256};

const ACCOUNT_ID_PREFIX: u8 = 0x00;
const DECODED_LEN: usize = 25;

/// Decode a classic address into its 20-byte account id.
pub fn decode_account_id(address: &str) -> Option<[u8; 20]> {
    if !address.starts_with('r') {
        return None;
    }
    let bytes = bs58::decode(address)
        .with_alphabet(bs58::Alphabet::RIPPLE)
        .into_vec()
        .ok()?;
    if bytes.len() != DECODED_LEN || bytes[0] != ACCOUNT_ID_PREFIX {
        return None;
    }

    let checksum = Sha256::digest(Sha256::digest(&bytes[..21]));
    if checksum[..4] != bytes[21..] {
        return None;
    }

    let mut id = [0u8; 20];
    id.copy_from_slice(&bytes[1..21]);
    Some(id)
}

pub fn is_valid_address(address: &str) -> bool {
    decode_account_id(address).is_some()
}

/// Uppercase hex of the account id, as used in hook vote parameters.
pub fn account_id_hex(address: &str) -> Option<String> {
    decode_account_id(address).map(hex::encode_upper)
}
