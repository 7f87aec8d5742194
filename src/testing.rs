//! Deterministic fakes for tests and development without hardware: a
//! scripted transport and a scriptable `DeviceClient`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::apdu::ApduCommand;
use crate::app_info::{AppFlags, AppInfo};
use crate::device::{AddressInfo, DeviceClient, SignResponse, VersionInfo};
use crate::errors::LedgerError;
use crate::session::DeviceConnector;
use crate::transport::Transport;

/// Transport that replays a scripted list of `(status, payload)` replies and
/// records every command it saw.
pub struct MockTransport {
    replies: Mutex<VecDeque<(u16, Vec<u8>)>>,
    commands: Mutex<Vec<ApduCommand>>,
}

impl MockTransport {
    pub fn new(replies: Vec<(u16, Vec<u8>)>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded_commands(&self) -> Vec<ApduCommand> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = String;

    async fn exchange(&self, command: &ApduCommand) -> Result<(u16, Vec<u8>), Self::Error> {
        self.commands.lock().unwrap().push(command.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| "mock transport script exhausted".to_string())
    }
}

// Lets a test keep a handle on the transport it handed to a client.
#[async_trait]
impl Transport for Arc<MockTransport> {
    type Error = String;

    async fn exchange(&self, command: &ApduCommand) -> Result<(u16, Vec<u8>), Self::Error> {
        self.as_ref().exchange(command).await
    }
}

/// Shared, mutable behavior of a fake device. Tests tweak the fields between
/// calls; every `FakeDevice` opened from the same state observes the change.
pub struct FakeDeviceState {
    pub app_info: Mutex<AppInfo>,
    pub version: Mutex<VersionInfo>,
    pub address: Mutex<AddressInfo>,
    pub sign_response: Mutex<SignResponse>,
    /// Simulated on-device think time before a sign response.
    pub sign_delay: Mutex<Option<Duration>>,
    pub closed: AtomicBool,
    pub sign_calls: AtomicUsize,
    pub address_calls: AtomicUsize,
}

pub const FAKE_ADDRESS: &str = "star1ndh9he6lv5wranywdvy2ep84dm07gqlqm6ekrs";

/// Minimal valid DER encoding of r = 1, s = 1.
pub const FAKE_DER_SIGNATURE: [u8; 8] = [0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x01];

impl FakeDeviceState {
    /// An unlocked device with a current IOV mainnet app open.
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self {
            app_info: Mutex::new(AppInfo {
                return_code: 0x9000,
                error_message: "No errors".to_string(),
                app_name: "IOV".to_string(),
                app_version: "2.16.1".to_string(),
                flags: AppFlags {
                    onboarded: true,
                    pin_validated: true,
                    ..AppFlags::default()
                },
            }),
            version: Mutex::new(VersionInfo {
                return_code: 0x9000,
                error_message: "No errors".to_string(),
                test_mode: false,
                major: 2,
                minor: 16,
                patch: 1,
                device_locked: false,
            }),
            address: Mutex::new(AddressInfo {
                return_code: 0x9000,
                error_message: "No errors".to_string(),
                compressed_pk: vec![0x02; 33],
                bech32_address: FAKE_ADDRESS.to_string(),
            }),
            sign_response: Mutex::new(SignResponse {
                return_code: 0x9000,
                error_message: "No errors".to_string(),
                signature_der: FAKE_DER_SIGNATURE.to_vec(),
            }),
            sign_delay: Mutex::new(None),
            closed: AtomicBool::new(false),
            sign_calls: AtomicUsize::new(0),
            address_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_error_message(&self, message: &str) {
        self.version.lock().unwrap().error_message = message.to_string();
        self.address.lock().unwrap().error_message = message.to_string();
        self.sign_response.lock().unwrap().error_message = message.to_string();
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct FakeDevice {
    state: Arc<FakeDeviceState>,
}

#[async_trait]
impl DeviceClient for FakeDevice {
    async fn app_info(&self) -> Result<AppInfo, LedgerError> {
        Ok(self.state.app_info.lock().unwrap().clone())
    }

    async fn get_version(&self) -> Result<VersionInfo, LedgerError> {
        Ok(self.state.version.lock().unwrap().clone())
    }

    async fn get_address(&self, _display: bool) -> Result<AddressInfo, LedgerError> {
        self.state.address_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.address.lock().unwrap().clone())
    }

    async fn sign(&self, _message: &[u8]) -> Result<SignResponse, LedgerError> {
        self.state.sign_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.sign_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.state.sign_response.lock().unwrap().clone())
    }

    async fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector handing out fake devices that all share one state. Counts how
/// many times the session re-opened the transport.
pub struct FakeConnector {
    state: Arc<FakeDeviceState>,
    opens: AtomicUsize,
    fail_open: Mutex<Option<LedgerError>>,
}

impl FakeConnector {
    pub fn new(state: Arc<FakeDeviceState>) -> Arc<Self> {
        Arc::new(Self {
            state,
            opens: AtomicUsize::new(0),
            fail_open: Mutex::new(None),
        })
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn fail_next_open(&self, error: LedgerError) {
        *self.fail_open.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl DeviceConnector for Arc<FakeConnector> {
    async fn open(&self) -> Result<Box<dyn DeviceClient>, LedgerError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fail_open.lock().unwrap().take() {
            return Err(error);
        }
        Ok(Box::new(FakeDevice {
            state: self.state.clone(),
        }))
    }
}
