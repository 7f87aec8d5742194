//! Session configuration: chain id, address prefix, gas price, test-mode
//! opt-in and timeouts, passed explicitly into session construction.

use std::time::Duration;

/// Minimum version of the IOV Ledger app the client will talk to.
pub const REQUIRED_APP_VERSION: &str = "2.16.1";

/// Name the device reports for the expected application.
pub const EXPECTED_APP_NAME: &str = "iov";

/// Timeout while waiting for a human to approve or reject on-device.
pub const INTERACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout of the startup liveness probe. A lower value always times out.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

pub const DEFAULT_GAS: u64 = 200_000;

pub const DEFAULT_MEMO: &str = "Sent via Big Dipper";

/// BIP44 derivation path 44'/234'/0'/0/0, fixed in this version: one account,
/// one address index.
pub const HD_PATH: [u32; 5] = [44, 234, 0, 0, 0];

#[derive(Clone, Debug)]
pub struct LedgerConfig {
    pub chain_id: String,
    /// bech32 human-readable part of account addresses, e.g. "star".
    pub bech32_prefix: String,
    /// Minor-unit denomination used for fees and builder amounts.
    pub denom: String,
    /// Price per gas unit, in minor units.
    pub gas_price: f64,
    /// Whether a test-mode app is acceptable. Must stay `false` on mainnet.
    pub test_mode_allowed: bool,
    pub probe_timeout: Duration,
    pub interaction_timeout: Duration,
}

impl LedgerConfig {
    pub fn new(chain_id: &str, bech32_prefix: &str, gas_price: f64, test_mode_allowed: bool) -> Self {
        let denom = if chain_id.to_lowercase().contains("mainnet") {
            "uiov"
        } else {
            "uvoi"
        };
        LedgerConfig {
            chain_id: chain_id.to_string(),
            bech32_prefix: bech32_prefix.to_string(),
            denom: denom.to_string(),
            gas_price,
            test_mode_allowed,
            probe_timeout: PROBE_TIMEOUT,
            interaction_timeout: INTERACTION_TIMEOUT,
        }
    }

    pub fn is_mainnet(&self) -> bool {
        self.chain_id.to_lowercase().contains("mainnet")
    }

    /// App the user should open on the device, as shown in error messages.
    pub fn wanted_app_label(&self) -> String {
        if self.is_mainnet() {
            "IOV".to_string()
        } else {
            "IOVTEST".to_string()
        }
    }
}
