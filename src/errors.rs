//! Error taxonomy of the signing client, plus the device status-code catalog
//! and the response dispatch routine shared by every device operation.

use std::error::Error;
use std::fmt;

/// What the user (or the caller) can do about a failure.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UserAction {
    Retry,
    Reconnect,
    UpdateApp,
    SwitchApp,
    Abort,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LedgerError {
    /// No device found, or the transport failed.
    Connection(String),
    /// Liveness probe or on-device interaction timed out.
    Timeout(String),
    /// Screensaver / PIN lock is active.
    LockedDevice,
    /// The expected application is not open on the device. The session closes
    /// the transport when it sees this, so the next `connect` starts clean.
    AppNotOpen,
    /// A different application is open on the device.
    AppMismatch { open_app: String, wanted: String },
    /// Application version below the supported minimum. Fatal, never retried.
    OutdatedApp { required: String },
    /// The app is in test mode but the caller did not opt into test mode.
    UnsafeMode,
    /// The user rejected the request on the device.
    UserRejected(String),
    /// A response frame (app info, address, DER signature) failed to parse.
    MalformedResponse(String),
    /// A required field was missing before any device interaction happened.
    Precondition(&'static str),
    /// Any other device status, surfaced with its raw message.
    Device { code: u16, message: String },
}

impl LedgerError {
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            LedgerError::Connection(_)
                | LedgerError::Timeout(_)
                | LedgerError::LockedDevice
                | LedgerError::AppNotOpen
                | LedgerError::AppMismatch { .. }
                | LedgerError::UserRejected(_)
        )
    }

    pub fn user_action(&self) -> UserAction {
        match self {
            LedgerError::Connection(_) | LedgerError::Timeout(_) => UserAction::Retry,
            LedgerError::LockedDevice | LedgerError::UserRejected(_) => UserAction::Retry,
            LedgerError::AppNotOpen => UserAction::Reconnect,
            LedgerError::AppMismatch { .. } => UserAction::SwitchApp,
            LedgerError::OutdatedApp { .. } => UserAction::UpdateApp,
            LedgerError::UnsafeMode
            | LedgerError::MalformedResponse(_)
            | LedgerError::Precondition(_)
            | LedgerError::Device { .. } => UserAction::Abort,
        }
    }

    /// Fatal errors must never be followed by further signing attempts.
    pub fn is_fatal(&self) -> bool {
        self.user_action() == UserAction::Abort || matches!(self, LedgerError::OutdatedApp { .. })
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Connection(msg) => write!(f, "{}", msg),
            LedgerError::Timeout(msg) => write!(f, "{}", msg),
            LedgerError::LockedDevice => write!(f, "Ledger's screensaver mode is on"),
            LedgerError::AppNotOpen => write!(f, "IOV app is not open"),
            LedgerError::AppMismatch { open_app, wanted } => {
                write!(f, "Close {} and open the {} app", open_app, wanted)
            }
            LedgerError::OutdatedApp { required } => write!(
                f,
                "Outdated version: Please update Ledger IOV App to version {}.",
                required
            ),
            LedgerError::UnsafeMode => write!(
                f,
                "DANGER: The IOV Ledger app is in test mode and shouldn't be used on mainnet!"
            ),
            LedgerError::UserRejected(msg) => write!(f, "{}", msg),
            LedgerError::MalformedResponse(msg) => write!(f, "Malformed response: {}", msg),
            LedgerError::Precondition(field) => {
                write!(f, "missing required field: {}", field)
            }
            LedgerError::Device { message, .. } => write!(f, "{}", message),
        }
    }
}

impl Error for LedgerError {}

/// Status codes the device can return, as reported by the transport or in the
/// trailing bytes of a response frame. Codes 1..=14 are short-range HID/U2F
/// codes; the rest are ISO 7816 status words.
pub fn error_code_to_string(code: u16) -> String {
    let description = match code {
        1 => "U2F: Unknown",
        2 => "U2F: Bad request",
        3 => "U2F: Configuration unsupported",
        4 => "U2F: Device Ineligible",
        5 => "U2F: Timeout",
        14 => "Timeout",
        0x9000 => "No errors",
        0x9001 => "Device is busy",
        0x6802 => "Error deriving keys",
        0x6400 => "Execution Error",
        0x6700 => "Wrong Length",
        0x6982 => "Empty Buffer",
        0x6983 => "Output buffer too small",
        0x6984 => "Data is invalid",
        0x6985 => "Conditions not satisfied",
        0x6986 => "Transaction rejected",
        0x6a80 => "Bad key handle",
        0x6b00 => "Invalid P1/P2",
        0x6d00 => "Instruction not supported",
        0x6e00 => "IOV app does not seem to be open",
        0x6f00 => "Unknown error",
        0x6f01 => "Sign/verify error",
        _ => return format!("Unknown Status Code: {}", code),
    };
    description.to_string()
}

pub const NO_ERRORS: &str = "No errors";

/// Per-call overrides for the response check. The defaults match the
/// generic connection flow; the probe and address-confirmation flows
/// substitute their own wording.
#[derive(Clone, Debug)]
pub struct CheckOptions<'a> {
    pub timeout_message: &'a str,
    pub rejection_message: &'a str,
    /// Version named in the "update your app" message.
    pub required_version: &'a str,
}

impl Default for CheckOptions<'_> {
    fn default() -> Self {
        CheckOptions {
            timeout_message: "Connection timed out. Please try again.",
            rejection_message: "User rejected the transaction",
            required_version: crate::config::REQUIRED_APP_VERSION,
        }
    }
}

/// Classifies a device response. The lock flag faults unconditionally; after
/// that, dispatch is on the human-readable status message, keyed exactly the
/// way the device library words them. A "No errors" message is the only
/// non-error path.
///
/// Keying off message text rather than numeric codes mirrors the upstream
/// device library and is a known soft spot: if the wording changes upstream,
/// the mapping silently degrades to the catch-all arm.
pub fn check_device_response(
    error_message: &str,
    device_locked: bool,
    opts: &CheckOptions,
) -> Result<(), LedgerError> {
    if device_locked {
        return Err(LedgerError::LockedDevice);
    }
    match error_message {
        NO_ERRORS => Ok(()),
        "U2F: Timeout" => Err(LedgerError::Timeout(opts.timeout_message.to_string())),
        "IOV app does not seem to be open" => Err(LedgerError::AppNotOpen),
        "Command not allowed" => Err(LedgerError::UserRejected("Transaction rejected".to_string())),
        "Transaction rejected" => Err(LedgerError::UserRejected(
            opts.rejection_message.to_string(),
        )),
        "Unknown error code" => Err(LedgerError::LockedDevice),
        "Instruction not supported" => Err(LedgerError::OutdatedApp {
            required: opts.required_version.to_string(),
        }),
        other => Err(LedgerError::Device {
            code: 0,
            message: other.to_string(),
        }),
    }
}
