use super::*;

#[test]
fn ack_and_error_route_for_any_role() {
    for role in [Role::Requester, Role::Worker] {
        assert_eq!(route(role, Envelope::Registered { client: role }), Route::Ack(role));
        assert_eq!(
            route(role, Envelope::Error { message: "App未连接".to_owned() }),
            Route::ServerError("App未连接".to_owned())
        );
    }
}

#[test]
fn worker_processes_input() {
    let env = Envelope::ProcessInput { input: "in".to_owned() };
    assert_eq!(route(Role::Worker, env), Route::Process("in".to_owned()));
}

#[test]
fn requester_receives_output() {
    let env = Envelope::ReceiveOutput { output: "out".to_owned() };
    assert_eq!(route(Role::Requester, env), Route::Output("out".to_owned()));
}

#[test]
fn payloads_for_the_other_role_are_dropped() {
    assert_eq!(
        route(Role::Requester, Envelope::ProcessInput { input: "in".to_owned() }),
        Route::Drop(DropReason::WrongRole { role: Role::Requester, kind: Kind::ProcessInput })
    );
    assert_eq!(
        route(Role::Worker, Envelope::ReceiveOutput { output: "out".to_owned() }),
        Route::Drop(DropReason::WrongRole { role: Role::Worker, kind: Kind::ReceiveOutput })
    );
}

#[test]
fn server_bound_kinds_are_dropped() {
    assert_eq!(
        route(Role::Worker, Envelope::register(Role::Worker)),
        Route::Drop(DropReason::ServerBound(Kind::Register))
    );
    assert_eq!(
        route(Role::Worker, Envelope::send_to_app("x")),
        Route::Drop(DropReason::ServerBound(Kind::SendToApp))
    );
    assert_eq!(
        route(Role::Requester, Envelope::send_to_web("y")),
        Route::Drop(DropReason::ServerBound(Kind::SendToWeb))
    );
}
