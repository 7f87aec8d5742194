//! Parser for the dashboard "app info" response frame.
//!
//! Layout: format tag (must be 1), length-prefixed ASCII app name,
//! length-prefixed ASCII version, a flags length byte, one flags byte.
//! The last two bytes of the whole frame are a big-endian status code,
//! independent of the payload. Anything malformed degrades to a structured
//! "format not recognized" result; this parser never fails past its boundary.

use crate::errors::error_code_to_string;

/// Status code reported when the response frame cannot be interpreted.
pub const FORMAT_NOT_RECOGNIZED_CODE: u16 = 0x9001;
pub const FORMAT_NOT_RECOGNIZED: &str = "response format ID not recognized";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AppFlags {
    pub recovery: bool,
    pub signed_mcu_code: bool,
    pub onboarded: bool,
    pub pin_validated: bool,
}

impl AppFlags {
    fn from_bits(value: u8) -> Self {
        AppFlags {
            recovery: value & 0x01 != 0,
            signed_mcu_code: value & 0x02 != 0,
            onboarded: value & 0x04 != 0,
            pin_validated: value & 0x80 != 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppInfo {
    pub return_code: u16,
    pub error_message: String,
    pub app_name: String,
    pub app_version: String,
    pub flags: AppFlags,
}

impl AppInfo {
    fn unrecognized() -> Self {
        AppInfo {
            return_code: FORMAT_NOT_RECOGNIZED_CODE,
            error_message: FORMAT_NOT_RECOGNIZED.to_string(),
            app_name: "err".to_string(),
            app_version: "err".to_string(),
            flags: AppFlags::default(),
        }
    }
}

/// Decodes an app info frame, trailing status bytes included.
pub fn parse_app_info(response: &[u8]) -> AppInfo {
    if response.len() < 2 {
        return AppInfo::unrecognized();
    }
    let return_code =
        u16::from_be_bytes([response[response.len() - 2], response[response.len() - 1]]);
    let payload = &response[..response.len() - 2];

    match parse_payload(payload) {
        Some((app_name, app_version, flags)) => AppInfo {
            return_code,
            error_message: error_code_to_string(return_code),
            app_name,
            app_version,
            flags,
        },
        // Only format tag 1 has a known layout.
        None => AppInfo::unrecognized(),
    }
}

fn parse_payload(payload: &[u8]) -> Option<(String, String, AppFlags)> {
    if payload.first() != Some(&1) {
        return None;
    }
    let name_len = *payload.get(1)? as usize;
    let name = payload.get(2..2 + name_len)?;
    let mut idx = 2 + name_len;

    let version_len = *payload.get(idx)? as usize;
    idx += 1;
    let version = payload.get(idx..idx + version_len)?;
    idx += version_len;

    let _flags_len = *payload.get(idx)?;
    idx += 1;
    let flags = AppFlags::from_bits(*payload.get(idx)?);

    Some((
        String::from_utf8_lossy(name).into_owned(),
        String::from_utf8_lossy(version).into_owned(),
        flags,
    ))
}
