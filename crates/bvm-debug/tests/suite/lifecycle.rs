use std::time::Duration;

use bvm_debug::{DebugError, Session};
use bvm_wire::mock::{MockVm, MockVmConfig};
use bvm_wire::{opcode, Command, Message, WireError};
use tokio::sync::oneshot;

use crate::harness::{backtrace, connect, hit, paused_at, MAIN, PID};

#[tokio::test]
async fn handshake_reports_the_vm_version_without_loading() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = connect(&vm).await;

    let (accepted, version) = session.handshake("1.0.0").await.unwrap();

    assert!(accepted);
    assert_eq!(version, "1.0.0");
    assert!(!session.is_loaded());
    assert!(!session.is_running());
    assert_eq!(vm.received().await.len(), 1);
}

#[tokio::test]
async fn handshake_mismatch_is_not_an_error() {
    let vm = MockVm::spawn_with_config(MockVmConfig {
        version: "2.0.0".into(),
    })
    .await
    .unwrap();
    let mut session = connect(&vm).await;

    let (accepted, version) = session.handshake("1.0.0").await.unwrap();

    assert!(!accepted);
    assert_eq!(version, "2.0.0");
    session.kill();
    assert!(session.is_terminated());
}

#[tokio::test]
async fn run_to_completion_ends_the_session() {
    let vm = MockVm::spawn().await.unwrap();
    vm.reply(opcode::PROCESS_RUN, vec![Message::ProcessTerminated])
        .await;
    let mut session = connect(&vm).await;

    session.spawn_process(Vec::new()).await.unwrap();
    assert!(!session.is_loaded());
    let stop = session.run().await.unwrap();

    assert_eq!(stop, Some(Message::ProcessTerminated));
    assert!(session.is_terminated());
    assert!(!session.is_loaded());
    assert!(!session.is_running());
    assert_eq!(
        vm.received().await,
        vec![
            Command::ProcessSpawnForMain {
                arguments: Vec::new()
            },
            Command::ProcessRun,
            Command::SessionEnd,
        ]
    );
}

#[tokio::test]
async fn run_treats_a_silently_closed_connection_as_finished() {
    let vm = MockVm::spawn().await.unwrap();
    vm.reply_then_close(opcode::PROCESS_RUN, Vec::new()).await;
    let mut session = connect(&vm).await;

    session.spawn_process(vec!["--flag".into()]).await.unwrap();
    let stop = session.run().await.unwrap();

    assert_eq!(stop, None);
    assert!(session.is_terminated());
    assert!(!session.is_loaded());
}

#[tokio::test]
async fn exit_code_is_recorded_on_termination() {
    let vm = MockVm::spawn().await.unwrap();
    vm.reply(opcode::PROCESS_RUN, vec![Message::ProcessTerminated])
        .await;
    let (exit_tx, exit_rx) = oneshot::channel();
    let mut session = connect(&vm).await.with_exit_signal(exit_rx);
    exit_tx.send(3).unwrap();

    session.spawn_process(Vec::new()).await.unwrap();
    session.run().await.unwrap();

    assert_eq!(session.exit_code(), Some(3));
}

#[tokio::test]
async fn a_process_can_only_be_started_once() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = paused_at(&vm, MAIN, 0).await;

    assert!(matches!(
        session.spawn_process(Vec::new()).await,
        Err(DebugError::AlreadyLoaded)
    ));
    assert!(matches!(session.debug_run().await, Err(DebugError::AlreadyLoaded)));
    assert!(matches!(session.run().await, Err(DebugError::AlreadyLoaded)));
}

#[tokio::test]
async fn compile_time_errors_leave_the_process_loaded() {
    let vm = MockVm::spawn().await.unwrap();
    vm.reply(opcode::PROCESS_RUN, vec![Message::ProcessCompileTimeError])
        .await;
    let mut session = connect(&vm).await;

    session.spawn_process(Vec::new()).await.unwrap();
    let stop = session.debug_run().await.unwrap();

    assert_eq!(stop, Message::ProcessCompileTimeError);
    assert!(session.is_loaded());
    assert!(!session.is_running());
    assert!(!session.is_terminated());
    assert!(matches!(session.cont().await, Err(DebugError::NotRunning)));
    assert_eq!(
        session.describe_stop(&stop).await.unwrap(),
        "Compile-time error."
    );
}

#[tokio::test]
async fn losing_the_connection_terminates_the_session() {
    let vm = MockVm::spawn().await.unwrap();
    vm.reply_then_close(opcode::PROCESS_RUN, Vec::new()).await;
    let mut session = connect(&vm).await;

    session.spawn_process(Vec::new()).await.unwrap();
    let stop = session.debug_run().await.unwrap();

    assert_eq!(stop, Message::ConnectionError);
    assert!(session.is_terminated());
    assert!(!session.is_loaded());
    assert!(!session.is_running());
    // Ending an already terminated session is a no-op.
    session.end_session().await.unwrap();
}

#[tokio::test]
async fn unknown_stop_reasons_are_errors() {
    let vm = MockVm::spawn().await.unwrap();
    vm.reply(opcode::PROCESS_RUN, vec![Message::ProcessIds { ids: vec![1] }])
        .await;
    let mut session = connect(&vm).await;

    session.spawn_process(Vec::new()).await.unwrap();
    let err = session.debug_run().await.unwrap_err();

    assert!(matches!(err, DebugError::UnknownStopReason(name) if name == "ProcessIds"));
}

#[tokio::test]
async fn each_stop_clears_the_cached_stack() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = paused_at(&vm, MAIN, 0).await;
    vm.reply(opcode::PROCESS_BACKTRACE_REQUEST, vec![backtrace(&[(MAIN, 0)])])
        .await;
    vm.reply(opcode::PROCESS_CONTINUE, vec![hit(100, MAIN, 4)])
        .await;

    session.backtrace().await.unwrap();
    // Served from the cache.
    session.backtrace().await.unwrap();
    assert!(session.state().current_backtrace.is_some());

    session.cont().await.unwrap();

    assert!(session.state().current_backtrace.is_none());
    assert!(session.state().current_uncaught_exception.is_none());
    assert_eq!(session.state().current_frame, 0);
    assert_eq!(session.state().current_process, Some(PID));
    let top = session.state().top_frame.as_ref().unwrap();
    assert_eq!((top.function_id(), top.bytecode_index), (MAIN, 4));

    let requests = vm
        .received()
        .await
        .into_iter()
        .filter(|command| matches!(command, Command::ProcessBacktraceRequest { .. }))
        .count();
    assert_eq!(requests, 1);
}

#[tokio::test]
async fn ending_a_paused_session_says_goodbye() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = paused_at(&vm, MAIN, 0).await;

    session.end_session().await.unwrap();

    assert!(session.is_terminated());
    assert_eq!(vm.received().await.last(), Some(&Command::SessionEnd));
}

#[tokio::test]
async fn strict_shutdown_rejects_unsolicited_messages() {
    let vm = MockVm::spawn().await.unwrap();
    vm.reply(opcode::SESSION_END, vec![Message::ProcessTerminated])
        .await;
    let mut session = paused_at(&vm, MAIN, 0).await;

    let err = session.end_session().await.unwrap_err();

    assert!(matches!(
        err,
        DebugError::Wire(WireError::UnexpectedDataDuringShutdown(_))
    ));
    assert!(session.is_terminated());
}

async fn wait_for_disconnect(session: &Session) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while session.is_connected() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn starting_on_a_closed_connection_changes_nothing() {
    let vm = MockVm::spawn().await.unwrap();
    vm.reply_then_close(opcode::PROCESS_SPAWN_FOR_MAIN, Vec::new())
        .await;
    let mut session = connect(&vm).await;
    session.spawn_process(Vec::new()).await.unwrap();
    wait_for_disconnect(&session).await;

    let err = session.debug_run().await.unwrap_err();
    assert!(matches!(err, DebugError::Wire(WireError::ConnectionClosed)));
    assert!(!session.is_loaded());
    assert!(!session.is_running());

    let err = session.run().await.unwrap_err();
    assert!(matches!(err, DebugError::Wire(WireError::ConnectionClosed)));
    assert!(!session.is_loaded());
    assert!(!session.is_running());
    assert!(!session.is_terminated());

    // The goodbye cannot be delivered, but the session still ends cleanly.
    session.end_session().await.unwrap();
    assert!(session.is_terminated());
}

#[tokio::test]
async fn teardown_drops_the_stopped_process() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = paused_at(&vm, MAIN, 4).await;
    vm.reply(opcode::PROCESS_BACKTRACE_REQUEST, vec![backtrace(&[(MAIN, 4)])])
        .await;
    session.describe_backtrace().await.unwrap();
    assert!(session.state().current_backtrace.is_some());

    session.kill();

    assert!(session.state().current_backtrace.is_none());
    assert!(session.state().top_frame.is_none());
    assert_eq!(session.state().current_process, None);
    assert!(matches!(session.backtrace().await, Err(DebugError::NoProcess)));
    assert!(matches!(
        session.describe_backtrace().await,
        Err(DebugError::NoProcess)
    ));
}
