use super::*;

#[test]
fn register_envelope_carries_role() {
    assert_eq!(register_envelope(Role::Worker), Envelope::Register { client: Role::Worker });
}

#[test]
fn matching_ack_while_open_is_accepted() {
    assert_eq!(evaluate_ack(Role::Requester, Role::Requester, ConnectionState::Open), AckOutcome::Accepted);
}

#[test]
fn mismatched_ack_is_rejected() {
    assert_eq!(
        evaluate_ack(Role::Requester, Role::Worker, ConnectionState::Open),
        AckOutcome::RoleMismatch { expected: Role::Requester, acked: Role::Worker }
    );
}

#[test]
fn ack_outside_open_state_is_ignored() {
    for state in [
        ConnectionState::Disconnected,
        ConnectionState::Connecting,
        ConnectionState::Registered,
        ConnectionState::Closing,
    ] {
        assert_eq!(evaluate_ack(Role::Worker, Role::Worker, state), AckOutcome::Ignored(state));
    }
}

#[tokio::test]
async fn wait_returns_once_registered() {
    let (tx, mut rx) = watch::channel(ConnectionState::Open);
    let flip = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send_replace(ConnectionState::Registered);
        tx
    });

    wait_for_registration(&mut rx, Duration::from_secs(2)).await.expect("registered");
    drop(flip.await);
}

#[tokio::test]
async fn wait_returns_immediately_when_already_registered() {
    let (_tx, mut rx) = watch::channel(ConnectionState::Registered);
    wait_for_registration(&mut rx, Duration::from_millis(1)).await.expect("registered");
}

#[tokio::test]
async fn wait_times_out_without_ack() {
    let (_tx, mut rx) = watch::channel(ConnectionState::Open);
    let err = wait_for_registration(&mut rx, Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(err, ConnectError::RegistrationTimeout(d) if d == Duration::from_millis(50)));
    assert_eq!(*rx.borrow(), ConnectionState::Open);
}
