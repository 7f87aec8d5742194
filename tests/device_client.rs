//! Drives `LedgerApp` against a scripted transport and checks the response
//! parsing and APDU sequencing.

use iov_ledger_client::app_info::{FORMAT_NOT_RECOGNIZED, FORMAT_NOT_RECOGNIZED_CODE};
use iov_ledger_client::device::{DeviceClient, LedgerApp};
use iov_ledger_client::errors::LedgerError;
use iov_ledger_client::testing::MockTransport;

fn app_info_payload(name: &str, version: &str, flags: u8) -> Vec<u8> {
    let mut out = vec![1, name.len() as u8];
    out.extend_from_slice(name.as_bytes());
    out.push(version.len() as u8);
    out.extend_from_slice(version.as_bytes());
    out.push(1);
    out.push(flags);
    out
}

#[tokio::test]
async fn app_info_combines_payload_and_status() {
    let transport = MockTransport::new(vec![(0x9000, app_info_payload("IOV", "2.16.1", 0x05))]);
    let app = LedgerApp::new(transport, "star");

    let info = app.app_info().await.unwrap();
    assert_eq!(info.app_name, "IOV");
    assert_eq!(info.app_version, "2.16.1");
    assert_eq!(info.return_code, 0x9000);
    assert!(info.flags.recovery);
    assert!(info.flags.onboarded);
}

#[tokio::test]
async fn app_info_with_bad_format_degrades_structurally() {
    let transport = MockTransport::new(vec![(0x9000, vec![7, 1, 2, 3])]);
    let app = LedgerApp::new(transport, "star");

    let info = app.app_info().await.unwrap();
    assert_eq!(info.return_code, FORMAT_NOT_RECOGNIZED_CODE);
    assert_eq!(info.error_message, FORMAT_NOT_RECOGNIZED);
}

#[tokio::test]
async fn get_version_decodes_mode_and_semver_fields() {
    let transport = MockTransport::new(vec![(0x9000, vec![1, 2, 16, 1])]);
    let app = LedgerApp::new(transport, "star");

    let version = app.get_version().await.unwrap();
    assert!(version.test_mode);
    assert_eq!(version.version_string(), "2.16.1");
    assert_eq!(version.error_message, "No errors");
    assert!(!version.device_locked);
}

#[tokio::test]
async fn get_version_rejects_a_short_ok_response() {
    let transport = MockTransport::new(vec![(0x9000, vec![1, 2])]);
    let app = LedgerApp::new(transport, "star");

    let err = app.get_version().await.unwrap_err();
    assert!(matches!(err, LedgerError::MalformedResponse(_)));
}

#[tokio::test]
async fn get_address_splits_pubkey_and_address() {
    let mut data = vec![0x02; 33];
    data.extend_from_slice(b"star1qqqqqqqqqqqqqqqq");
    let transport = MockTransport::new(vec![(0x9000, data)]);
    let app = LedgerApp::new(transport, "star");

    let info = app.get_address(false).await.unwrap();
    assert_eq!(info.compressed_pk.len(), 33);
    assert_eq!(info.bech32_address, "star1qqqqqqqqqqqqqqqq");
}

#[tokio::test]
async fn get_address_propagates_device_status() {
    let transport = MockTransport::new(vec![(0x6e00, vec![])]);
    let app = LedgerApp::new(transport, "star");

    let info = app.get_address(false).await.unwrap();
    assert_eq!(info.return_code, 0x6e00);
    assert_eq!(info.error_message, "IOV app does not seem to be open");
    assert!(info.compressed_pk.is_empty());
}

#[tokio::test]
async fn sign_sends_path_then_payload_chunks() {
    let der = vec![0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x01];
    let transport = std::sync::Arc::new(MockTransport::new(vec![
        (0x9000, vec![]),
        (0x9000, der.clone()),
    ]));
    let app = LedgerApp::new(transport.clone(), "star");

    let response = app.sign(b"{\"chain_id\":\"test-1\"}").await.unwrap();
    assert_eq!(response.return_code, 0x9000);
    assert_eq!(response.signature_der, der);

    let commands = transport.recorded_commands();
    assert_eq!(commands.len(), 2);
    // chunk 0 carries the serialized derivation path
    assert_eq!(commands[0].p1, 0);
    assert_eq!(commands[0].data.len(), 20);
    // single payload chunk, marked last
    assert_eq!(commands[1].p1, 2);
    assert_eq!(commands[1].data, b"{\"chain_id\":\"test-1\"}");
}

#[tokio::test]
async fn sign_stops_at_the_first_refusal() {
    let transport = MockTransport::new(vec![(0x6986, vec![])]);
    let app = LedgerApp::new(transport, "star");

    let response = app.sign(b"{}").await.unwrap();
    assert_eq!(response.return_code, 0x6986);
    assert_eq!(response.error_message, "Transaction rejected");
    assert!(response.signature_der.is_empty());
}

#[tokio::test]
async fn transport_failure_surfaces_as_connection_error() {
    // empty script: the first exchange fails
    let transport = MockTransport::new(vec![]);
    let app = LedgerApp::new(transport, "star");

    let err = app.get_version().await.unwrap_err();
    assert!(matches!(err, LedgerError::Connection(_)));
}
