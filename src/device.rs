//! The device capability and its implementation over a raw transport.
//!
//! `DeviceClient` is the single polymorphic surface the session talks to:
//! app info, version, address derivation, signing. It is implemented once
//! against a real `Transport` (`LedgerApp`) and once as a deterministic fake
//! for tests (`crate::testing::FakeDevice`), so nothing in the client
//! inherits from the vendor transport types.

use async_trait::async_trait;

use crate::apdu::{apdu_app_info, apdu_get_address, apdu_get_version, apdu_sign_chunks, ApduCommand};
use crate::app_info::{parse_app_info, AppInfo};
use crate::errors::{error_code_to_string, LedgerError};
use crate::transport::Transport;

pub const SW_OK: u16 = 0x9000;

/// Status code the device library reports while the PIN lock screen is up.
const SW_DEVICE_LOCKED: u16 = 0x6804;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionInfo {
    pub return_code: u16,
    pub error_message: String,
    pub test_mode: bool,
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    pub device_locked: bool,
}

impl VersionInfo {
    pub fn version_string(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressInfo {
    pub return_code: u16,
    pub error_message: String,
    /// 33-byte compressed secp256k1 public key.
    pub compressed_pk: Vec<u8>,
    pub bech32_address: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignResponse {
    pub return_code: u16,
    pub error_message: String,
    /// DER-encoded signature; empty unless the device approved.
    pub signature_der: Vec<u8>,
}

#[async_trait]
pub trait DeviceClient: Send + Sync {
    async fn app_info(&self) -> Result<AppInfo, LedgerError>;
    async fn get_version(&self) -> Result<VersionInfo, LedgerError>;
    /// Derives pubkey and address at the fixed path; with `display` the
    /// device shows the address and waits for on-device confirmation.
    async fn get_address(&self, display: bool) -> Result<AddressInfo, LedgerError>;
    async fn sign(&self, message: &[u8]) -> Result<SignResponse, LedgerError>;
    /// Releases the underlying transport. Called on the self-healing path.
    async fn close(&self) {}
}

/// The IOV app driven over a raw transport. The physical device serializes
/// interactions and reports busy otherwise, so every operation holds the
/// operation lock for its full APDU sequence.
pub struct LedgerApp<T: Transport> {
    transport: T,
    bech32_prefix: String,
    op_lock: tokio::sync::Mutex<()>,
}

impl<T: Transport> LedgerApp<T> {
    pub fn new(transport: T, bech32_prefix: &str) -> Self {
        Self {
            transport,
            bech32_prefix: bech32_prefix.to_string(),
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn exchange(&self, command: &ApduCommand) -> Result<(u16, Vec<u8>), LedgerError> {
        self.transport
            .exchange(command)
            .await
            .map_err(|e| LedgerError::Connection(format!("transport error: {:?}", e)))
    }
}

#[async_trait]
impl<T: Transport> DeviceClient for LedgerApp<T> {
    async fn app_info(&self) -> Result<AppInfo, LedgerError> {
        let _guard = self.op_lock.lock().await;
        let (return_code, mut data) = self.exchange(&apdu_app_info()).await?;
        // parse_app_info expects the trailing status bytes in the frame
        data.extend_from_slice(&return_code.to_be_bytes());
        Ok(parse_app_info(&data))
    }

    async fn get_version(&self) -> Result<VersionInfo, LedgerError> {
        let _guard = self.op_lock.lock().await;
        let (return_code, data) = self.exchange(&apdu_get_version()).await?;
        if return_code == SW_OK && data.len() < 4 {
            return Err(LedgerError::MalformedResponse(format!(
                "version response too short: {} bytes",
                data.len()
            )));
        }
        let (test_mode, major, minor, patch) = if data.len() >= 4 {
            (data[0] != 0, data[1], data[2], data[3])
        } else {
            (false, 0, 0, 0)
        };
        Ok(VersionInfo {
            return_code,
            error_message: error_code_to_string(return_code),
            test_mode,
            major,
            minor,
            patch,
            device_locked: return_code == SW_DEVICE_LOCKED,
        })
    }

    async fn get_address(&self, display: bool) -> Result<AddressInfo, LedgerError> {
        let _guard = self.op_lock.lock().await;
        let (return_code, data) = self
            .exchange(&apdu_get_address(&self.bech32_prefix, display))
            .await?;
        if return_code != SW_OK {
            return Ok(AddressInfo {
                return_code,
                error_message: error_code_to_string(return_code),
                compressed_pk: vec![],
                bech32_address: String::new(),
            });
        }
        if data.len() < 34 {
            return Err(LedgerError::MalformedResponse(format!(
                "address response too short: {} bytes",
                data.len()
            )));
        }
        let compressed_pk = data[..33].to_vec();
        let bech32_address = String::from_utf8(data[33..].to_vec())
            .map_err(|_| LedgerError::MalformedResponse("address is not ASCII".to_string()))?
            .trim_end_matches('\0')
            .to_string();
        Ok(AddressInfo {
            return_code,
            error_message: error_code_to_string(return_code),
            compressed_pk,
            bech32_address,
        })
    }

    async fn sign(&self, message: &[u8]) -> Result<SignResponse, LedgerError> {
        let _guard = self.op_lock.lock().await;
        let mut last = (SW_OK, Vec::new());
        for chunk in apdu_sign_chunks(message) {
            last = self.exchange(&chunk).await?;
            // an intermediate refusal ends the sequence
            if last.0 != SW_OK {
                break;
            }
        }
        let (return_code, data) = last;
        Ok(SignResponse {
            return_code,
            error_message: error_code_to_string(return_code),
            signature_der: if return_code == SW_OK { data } else { vec![] },
        })
    }
}
