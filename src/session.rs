//! Device session lifecycle: lazy connect, compatibility gating, address
//! derivation and signing against a single exclusively-owned device handle.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use semver::Version;

use crate::config::{LedgerConfig, EXPECTED_APP_NAME, REQUIRED_APP_VERSION};
use crate::device::{AddressInfo, DeviceClient, LedgerApp};
use crate::errors::{check_device_response, CheckOptions, LedgerError};
use crate::transport::{TransportHid, TransportTcp};
use crate::tx::{apply_signature, SignedTx, TxContext, UnsignedTx};

const PROBE_TIMEOUT_MESSAGE: &str = "Could not find a connected and unlocked Ledger device";
const CONFIRM_REJECTION_MESSAGE: &str = "Displayed address was rejected";

/// Opens a fresh device handle. The session goes through this both on first
/// use and again after the self-healing teardown, so it has to be repeatable.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn open(&self) -> Result<Box<dyn DeviceClient>, LedgerError>;
}

/// Connects to a physical device over USB HID.
pub struct HidConnector {
    bech32_prefix: String,
}

impl HidConnector {
    pub fn new(bech32_prefix: &str) -> Self {
        Self {
            bech32_prefix: bech32_prefix.to_string(),
        }
    }
}

#[async_trait]
impl DeviceConnector for HidConnector {
    async fn open(&self) -> Result<Box<dyn DeviceClient>, LedgerError> {
        let api = hidapi::HidApi::new()
            .map_err(|e| LedgerError::Connection(format!("failed to initialize HID: {}", e)))?;
        let transport = ledger_transport_hid::TransportNativeHID::new(&api)
            .map_err(|e| LedgerError::Connection(format!("no Ledger device found: {}", e)))?;
        Ok(Box::new(LedgerApp::new(
            TransportHid::new(transport),
            &self.bech32_prefix,
        )))
    }
}

/// Connects to a Speculos simulator over TCP.
pub struct TcpConnector {
    addr: SocketAddr,
    bech32_prefix: String,
}

impl TcpConnector {
    pub fn new(addr: SocketAddr, bech32_prefix: &str) -> Self {
        Self {
            addr,
            bech32_prefix: bech32_prefix.to_string(),
        }
    }
}

#[async_trait]
impl DeviceConnector for TcpConnector {
    async fn open(&self) -> Result<Box<dyn DeviceClient>, LedgerError> {
        let transport = TransportTcp::new(self.addr)
            .await
            .map_err(|e| LedgerError::Connection(format!("speculos not reachable: {:?}", e)))?;
        Ok(Box::new(LedgerApp::new(transport, &self.bech32_prefix)))
    }
}

/// One logical session with one physical device. The handle is owned
/// exclusively here and is never cloned; all device operations serialize
/// through it.
pub struct LedgerSession {
    config: LedgerConfig,
    connector: Box<dyn DeviceConnector>,
    device: Option<Box<dyn DeviceClient>>,
}

async fn with_timeout<T>(
    duration: Duration,
    message: &str,
    fut: impl std::future::Future<Output = Result<T, LedgerError>>,
) -> Result<T, LedgerError> {
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::Timeout(message.to_string())),
    }
}

fn minimum_app_version() -> Version {
    Version::parse(REQUIRED_APP_VERSION).expect("version constant parses")
}

impl LedgerSession {
    pub fn new(config: LedgerConfig, connector: Box<dyn DeviceConnector>) -> Self {
        Self {
            config,
            connector,
            device: None,
        }
    }

    /// Session over USB HID with the configured address prefix.
    pub fn over_hid(config: LedgerConfig) -> Self {
        let connector = HidConnector::new(&config.bech32_prefix);
        Self::new(config, Box::new(connector))
    }

    pub fn is_connected(&self) -> bool {
        self.device.is_some()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Establishes the session if none is live. Idempotent: with a live
    /// handle this is a no-op. Opens the transport, probes liveness with the
    /// short timeout, then runs the compatibility gate; any failure leaves no
    /// handle installed.
    pub async fn connect(&mut self) -> Result<(), LedgerError> {
        self.connect_with(self.config.interaction_timeout).await
    }

    /// Probe-only connect with the short timeout, for presence detection
    /// without starting a signing flow.
    pub async fn test_device(&mut self) -> Result<(), LedgerError> {
        // a lower value always times out
        self.connect_with(self.config.probe_timeout).await
    }

    async fn connect_with(&mut self, open_timeout: Duration) -> Result<(), LedgerError> {
        if self.device.is_some() {
            return Ok(());
        }
        debug!("opening device transport");
        let device = with_timeout(open_timeout, PROBE_TIMEOUT_MESSAGE, self.connector.open()).await?;

        if let Err(e) = self.check_compatibility(&*device).await {
            warn!("device rejected during connect: {}", e);
            if e == LedgerError::AppNotOpen {
                device.close().await;
            }
            return Err(e);
        }

        info!("device session established");
        self.device = Some(device);
        Ok(())
    }

    /// Drops the handle and closes the transport.
    pub async fn disconnect(&mut self) {
        if let Some(device) = self.device.take() {
            device.close().await;
        }
    }

    async fn check_compatibility(&self, device: &dyn DeviceClient) -> Result<(), LedgerError> {
        self.probe(device).await?;
        self.gate(device).await
    }

    /// Liveness probe: a cheap derivation request catches a missing, locked
    /// or screensaver-mode device before any interactive flow starts.
    async fn probe(&self, device: &dyn DeviceClient) -> Result<(), LedgerError> {
        let info = with_timeout(
            self.config.probe_timeout,
            PROBE_TIMEOUT_MESSAGE,
            device.get_address(false),
        )
        .await?;
        let opts = CheckOptions {
            timeout_message: PROBE_TIMEOUT_MESSAGE,
            ..CheckOptions::default()
        };
        check_device_response(&info.error_message, false, &opts)
    }

    /// Compatibility gate: minimum app version, app mode, and the name of
    /// the open application. Runs before a handle is ever installed.
    async fn gate(&self, device: &dyn DeviceClient) -> Result<(), LedgerError> {
        let version = self.fetch_app_version(device).await?;
        if version < minimum_app_version() {
            return Err(LedgerError::OutdatedApp {
                required: REQUIRED_APP_VERSION.to_string(),
            });
        }

        let info = with_timeout(
            self.config.interaction_timeout,
            PROBE_TIMEOUT_MESSAGE,
            device.app_info(),
        )
        .await?;
        check_device_response(&info.error_message, false, &CheckOptions::default())?;
        if info.app_name.to_lowercase() != EXPECTED_APP_NAME {
            return Err(LedgerError::AppMismatch {
                open_app: info.app_name,
                wanted: self.config.wanted_app_label(),
            });
        }
        Ok(())
    }

    async fn fetch_app_version(&self, device: &dyn DeviceClient) -> Result<Version, LedgerError> {
        let v = with_timeout(
            self.config.interaction_timeout,
            PROBE_TIMEOUT_MESSAGE,
            device.get_version(),
        )
        .await?;
        check_device_response(&v.error_message, v.device_locked, &CheckOptions::default())?;

        // Safety gate: a test-mode app must never sign for a caller that did
        // not opt into test mode. Fatal, no bypass.
        if v.test_mode && !self.config.test_mode_allowed {
            return Err(LedgerError::UnsafeMode);
        }

        Version::parse(&v.version_string())
            .map_err(|e| LedgerError::MalformedResponse(format!("bad app version: {}", e)))
    }

    /// Closing the app on the device tears down the transport from the
    /// device side, so the stale handle must go; the next `connect` then
    /// re-initializes from scratch. Every other error class propagates with
    /// the session state untouched.
    async fn reset_on_app_closed(&mut self, e: LedgerError) -> LedgerError {
        if e == LedgerError::AppNotOpen {
            warn!("app closed on device, tearing down the session");
            if let Some(device) = self.device.take() {
                device.close().await;
            }
        }
        e
    }

    fn device(&self) -> Result<&dyn DeviceClient, LedgerError> {
        self.device
            .as_deref()
            .ok_or_else(|| LedgerError::Connection("no device session".to_string()))
    }

    /// Version of the open app, after the mode gate. Re-queried on every
    /// call rather than cached.
    pub async fn get_app_version(&mut self) -> Result<Version, LedgerError> {
        self.connect().await?;
        let result = {
            let device = self.device()?;
            self.fetch_app_version(device).await
        };
        match result {
            Ok(version) => Ok(version),
            Err(e) => Err(self.reset_on_app_closed(e).await),
        }
    }

    /// Compressed public key at the fixed derivation path. Never cached: the
    /// device may have been reconnected or switched accounts since the last
    /// call.
    pub async fn get_pub_key(&mut self) -> Result<Vec<u8>, LedgerError> {
        Ok(self.fetch_address(false, &CheckOptions::default())
            .await?
            .compressed_pk)
    }

    /// Public key and bech32 address at the fixed derivation path.
    pub async fn get_address(&mut self) -> Result<AddressInfo, LedgerError> {
        let info = self.fetch_address(false, &CheckOptions::default()).await?;
        let wanted_prefix = format!("{}1", self.config.bech32_prefix);
        if !info.bech32_address.starts_with(&wanted_prefix) {
            return Err(LedgerError::MalformedResponse(format!(
                "device returned an address for another network: {}",
                info.bech32_address
            )));
        }
        Ok(info)
    }

    /// Re-derives the address with on-device display and waits for the user
    /// to confirm it. Old app versions cannot display addresses, so the
    /// check degrades to a no-op below the minimum version.
    pub async fn confirm_address(&mut self) -> Result<(), LedgerError> {
        self.connect().await?;
        let version = {
            let device = self.device()?;
            self.fetch_app_version(device).await
        };
        let version = match version {
            Ok(v) => v,
            Err(e) => return Err(self.reset_on_app_closed(e).await),
        };
        if version < minimum_app_version() {
            return Ok(());
        }
        let opts = CheckOptions {
            rejection_message: CONFIRM_REJECTION_MESSAGE,
            ..CheckOptions::default()
        };
        self.fetch_address(true, &opts).await.map(|_| ())
    }

    async fn fetch_address(
        &mut self,
        display: bool,
        opts: &CheckOptions<'_>,
    ) -> Result<AddressInfo, LedgerError> {
        self.connect().await?;
        let result = {
            let device = self.device()?;
            let info = with_timeout(
                self.config.interaction_timeout,
                opts.timeout_message,
                device.get_address(display),
            )
            .await?;
            check_device_response(&info.error_message, false, opts).map(|_| info)
        };
        match result {
            Ok(info) => Ok(info),
            Err(e) => Err(self.reset_on_app_closed(e).await),
        }
    }

    /// Sends the signable bytes for on-device approval. Returns the DER
    /// signature exactly as the device produced it.
    pub async fn sign(&mut self, message: &[u8]) -> Result<Vec<u8>, LedgerError> {
        self.connect().await?;
        let result = {
            let device = self.device()?;
            let response = with_timeout(
                self.config.interaction_timeout,
                "Connection timed out. Please try again.",
                device.sign(message),
            )
            .await?;
            check_device_response(&response.error_message, false, &CheckOptions::default())
                .map(|_| response.signature_der)
        };
        match result {
            Ok(signature) => Ok(signature),
            Err(e) => Err(self.reset_on_app_closed(e).await),
        }
    }

    /// Full signing flow: canonicalize, approve on device, assemble the
    /// signed envelope.
    pub async fn sign_tx(
        &mut self,
        tx: &UnsignedTx,
        ctx: &TxContext,
    ) -> Result<SignedTx, LedgerError> {
        let bytes = crate::canonical::get_bytes_to_sign(tx, ctx)?;
        let der = self.sign(&bytes).await?;
        apply_signature(tx, ctx, &der)
    }
}
