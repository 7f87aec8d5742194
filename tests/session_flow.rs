//! Full session flows against the deterministic fake device: compatibility
//! gating, the self-healing reconnect, timeouts and end-to-end signing.

use std::time::Duration;

use iov_ledger_client::errors::LedgerError;
use iov_ledger_client::testing::{FakeConnector, FakeDeviceState, FAKE_ADDRESS};
use iov_ledger_client::{LedgerConfig, LedgerSession, TxContext, UnsignedTx};

fn mainnet_config() -> LedgerConfig {
    LedgerConfig::new("iov-mainnet-2", "star", 0.025, false)
}

fn session_with(
    config: LedgerConfig,
    state: &std::sync::Arc<FakeDeviceState>,
) -> (LedgerSession, std::sync::Arc<FakeConnector>) {
    let connector = FakeConnector::new(state.clone());
    let session = LedgerSession::new(config, Box::new(connector.clone()));
    (session, connector)
}

#[tokio::test]
async fn connect_is_idempotent() {
    let state = FakeDeviceState::healthy();
    let (mut session, connector) = session_with(mainnet_config(), &state);

    session.connect().await.unwrap();
    session.connect().await.unwrap();

    assert!(session.is_connected());
    assert_eq!(connector.opens(), 1);
}

#[tokio::test]
async fn connect_fails_closed_when_no_device_is_present() {
    let state = FakeDeviceState::healthy();
    let (mut session, connector) = session_with(mainnet_config(), &state);
    connector.fail_next_open(LedgerError::Connection("no HID device".to_string()));

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, LedgerError::Connection(_)));
    assert!(!session.is_connected());
}

#[tokio::test]
async fn outdated_app_version_is_fatal() {
    let state = FakeDeviceState::healthy();
    state.version.lock().unwrap().minor = 15;
    let (mut session, _) = session_with(mainnet_config(), &state);

    let err = session.connect().await.unwrap_err();
    assert_eq!(
        err,
        LedgerError::OutdatedApp {
            required: "2.16.1".to_string()
        }
    );
    assert!(err.is_fatal());
    assert!(!session.is_connected());
}

#[tokio::test]
async fn newer_app_versions_pass_the_gate() {
    let state = FakeDeviceState::healthy();
    {
        let mut version = state.version.lock().unwrap();
        version.major = 3;
        version.minor = 0;
        version.patch = 0;
    }
    state.app_info.lock().unwrap().app_version = "3.0.0".to_string();
    let (mut session, _) = session_with(mainnet_config(), &state);

    session.connect().await.unwrap();
    assert!(session.is_connected());
}

#[tokio::test]
async fn wrong_open_app_names_the_culprit() {
    let state = FakeDeviceState::healthy();
    state.app_info.lock().unwrap().app_name = "Bitcoin".to_string();
    let (mut session, _) = session_with(mainnet_config(), &state);

    let err = session.connect().await.unwrap_err();
    assert_eq!(
        err,
        LedgerError::AppMismatch {
            open_app: "Bitcoin".to_string(),
            wanted: "IOV".to_string(),
        }
    );
    assert_eq!(err.to_string(), "Close Bitcoin and open the IOV app");
}

#[tokio::test]
async fn test_mode_app_is_refused_on_mainnet() {
    let state = FakeDeviceState::healthy();
    state.version.lock().unwrap().test_mode = true;
    let (mut session, _) = session_with(mainnet_config(), &state);

    let err = session.connect().await.unwrap_err();
    assert_eq!(err, LedgerError::UnsafeMode);
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_mode_app_is_accepted_when_opted_in() {
    let state = FakeDeviceState::healthy();
    state.version.lock().unwrap().test_mode = true;
    let config = LedgerConfig::new("iovns-galaxynet", "star", 0.025, true);
    let (mut session, _) = session_with(config, &state);

    session.connect().await.unwrap();
    assert!(session.is_connected());
}

#[tokio::test]
async fn locked_device_faults_during_the_gate() {
    let state = FakeDeviceState::healthy();
    state.version.lock().unwrap().device_locked = true;
    let (mut session, _) = session_with(mainnet_config(), &state);

    let err = session.connect().await.unwrap_err();
    assert_eq!(err, LedgerError::LockedDevice);
}

#[tokio::test]
async fn probe_timeout_status_uses_the_probe_wording() {
    let state = FakeDeviceState::healthy();
    state.address.lock().unwrap().error_message = "U2F: Timeout".to_string();
    let (mut session, _) = session_with(mainnet_config(), &state);

    let err = session.connect().await.unwrap_err();
    assert_eq!(
        err,
        LedgerError::Timeout("Could not find a connected and unlocked Ledger device".to_string())
    );
    assert!(!session.is_connected());
}

#[tokio::test]
async fn addresses_are_validated_against_the_configured_prefix() {
    let state = FakeDeviceState::healthy();
    let (mut session, _) = session_with(mainnet_config(), &state);

    let info = session.get_address().await.unwrap();
    assert_eq!(info.bech32_address, FAKE_ADDRESS);
    assert_eq!(info.compressed_pk, vec![0x02; 33]);

    state.address.lock().unwrap().bech32_address = "cosmos1qqq".to_string();
    let err = session.get_address().await.unwrap_err();
    assert!(matches!(err, LedgerError::MalformedResponse(_)));
}

#[tokio::test]
async fn address_queries_are_never_cached() {
    let state = FakeDeviceState::healthy();
    let (mut session, _) = session_with(mainnet_config(), &state);

    session.get_pub_key().await.unwrap();
    session.get_pub_key().await.unwrap();
    // one probe during connect plus one per query
    assert_eq!(state.address_calls.load(std::sync::atomic::Ordering::SeqCst), 3);
}

#[tokio::test]
async fn sign_tx_assembles_the_final_envelope() {
    let state = FakeDeviceState::healthy();
    let (mut session, _) = session_with(mainnet_config(), &state);

    let pub_key = session.get_pub_key().await.unwrap();
    let ctx = TxContext::new("iov-mainnet-2", 5, 2, "uiov", FAKE_ADDRESS)
        .unwrap()
        .with_public_key(&pub_key);
    let tx = UnsignedTx::create_transfer(&ctx, "star1xyz", 1000)
        .unwrap()
        .with_gas(200_000, 0.025, "uiov");

    let signed = session.sign_tx(&tx, &ctx).await.unwrap();
    assert_eq!(signed.signatures().len(), 1);
    let entry = &signed.signatures()[0];
    assert_eq!(entry.account_number, "5");
    assert_eq!(entry.sequence, "2");
    assert_eq!(entry.pub_key.key_type, "tendermint/PubKeySecp256k1");
    assert!(!entry.signature.is_empty());
}

#[tokio::test]
async fn rejection_is_distinguishable_from_timeout() {
    let state = FakeDeviceState::healthy();
    let (mut session, _) = session_with(mainnet_config(), &state);
    session.connect().await.unwrap();

    state
        .sign_response
        .lock()
        .unwrap()
        .error_message = "Transaction rejected".to_string();
    let err = session.sign(b"{}").await.unwrap_err();
    assert_eq!(
        err,
        LedgerError::UserRejected("User rejected the transaction".to_string())
    );
}

#[tokio::test]
async fn slow_approval_times_out() {
    let state = FakeDeviceState::healthy();
    *state.sign_delay.lock().unwrap() = Some(Duration::from_millis(200));
    let mut config = mainnet_config();
    config.interaction_timeout = Duration::from_millis(20);
    let (mut session, _) = session_with(config, &state);
    session.connect().await.unwrap();

    let err = session.sign(b"{}").await.unwrap_err();
    assert!(matches!(err, LedgerError::Timeout(_)));
    // a timeout is not a rejection and does not tear the session down
    assert!(session.is_connected());
}

#[tokio::test]
async fn closing_the_app_heals_on_the_next_connect() {
    let state = FakeDeviceState::healthy();
    let (mut session, connector) = session_with(mainnet_config(), &state);
    session.connect().await.unwrap();
    assert_eq!(connector.opens(), 1);

    // the user switches apps on the device mid-session
    state.set_error_message("IOV app does not seem to be open");
    let err = session.sign(b"{}").await.unwrap_err();
    assert_eq!(err, LedgerError::AppNotOpen);
    assert!(state.was_closed());
    assert!(!session.is_connected());

    // back on the IOV app, a fresh connect succeeds from scratch
    state.set_error_message("No errors");
    let signature = session.sign(b"{}").await.unwrap();
    assert!(!signature.is_empty());
    assert_eq!(connector.opens(), 2);
}

#[tokio::test]
async fn other_errors_keep_the_session_intact() {
    let state = FakeDeviceState::healthy();
    let (mut session, connector) = session_with(mainnet_config(), &state);
    session.connect().await.unwrap();

    state
        .sign_response
        .lock()
        .unwrap()
        .error_message = "Bad key handle".to_string();
    let err = session.sign(b"{}").await.unwrap_err();
    assert_eq!(err.to_string(), "Bad key handle");
    // no automatic retry outside the app-switch case
    assert!(session.is_connected());
    assert_eq!(connector.opens(), 1);
    assert!(!state.was_closed());
}

#[tokio::test]
async fn confirm_address_maps_rejection_to_its_own_message() {
    let state = FakeDeviceState::healthy();
    let (mut session, _) = session_with(mainnet_config(), &state);
    session.connect().await.unwrap();

    state.address.lock().unwrap().error_message = "Transaction rejected".to_string();
    let err = session.confirm_address().await.unwrap_err();
    assert_eq!(
        err,
        LedgerError::UserRejected("Displayed address was rejected".to_string())
    );
}
