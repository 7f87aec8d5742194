//! Hardware-wallet signing client for the IOV/Starname chain.
//!
//! The [`LedgerSession`] owns the connection to one physical device: it
//! lazily connects, verifies app compatibility, derives the account address,
//! and runs signable payloads through on-device approval. Transaction
//! construction ([`tx`]), canonical serialization ([`canonical`]) and the
//! signature assembly are pure and usable without a device.

pub mod apdu;
pub mod app_info;
pub mod canonical;
pub mod config;
pub mod device;
pub mod errors;
pub mod msg;
pub mod session;
pub mod testing;
pub mod transport;
pub mod tx;

pub use config::LedgerConfig;
pub use errors::{LedgerError, UserAction};
pub use msg::{Coin, Message, VoteOption};
pub use session::LedgerSession;
pub use tx::{apply_signature, SignedTx, TxContext, UnsignedTx};

/// Decodes a bech32 account address to its prefix and payload bytes.
pub fn decode_address(address: &str) -> Result<(String, Vec<u8>), LedgerError> {
    let (hrp, data) = bech32::decode(address)
        .map_err(|e| LedgerError::MalformedResponse(format!("invalid bech32 address: {}", e)))?;
    Ok((hrp.to_string().to_lowercase(), data))
}
