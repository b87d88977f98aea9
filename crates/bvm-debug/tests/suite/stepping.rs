use bvm_debug::DebugError;
use bvm_wire::mock::MockVm;
use bvm_wire::{opcode, Command, Message, NO_BREAKPOINT};

use crate::harness::{
    backtrace, connect, hit, paused_at, received_after_start, HELPER, MAIN, NATIVE, PID,
    TRAMPOLINE,
};

fn one_shot(breakpoint_id: i32, stop: Message) -> Vec<Message> {
    vec![Message::SetBreakpointResult { breakpoint_id }, stop]
}

#[tokio::test]
async fn stepping_requires_a_running_process() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = connect(&vm).await;

    assert!(matches!(session.step().await, Err(DebugError::NotRunning)));
    assert!(matches!(session.step_over().await, Err(DebugError::NotRunning)));
    assert!(matches!(session.step_out().await, Err(DebugError::NotRunning)));
    assert!(matches!(session.cont().await, Err(DebugError::NotRunning)));
    assert!(matches!(session.restart().await, Err(DebugError::NotRunning)));
}

#[tokio::test]
async fn step_runs_to_the_next_source_position() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = paused_at(&vm, MAIN, 0).await;
    vm.reply(opcode::PROCESS_STEP_TO, vec![hit(200, MAIN, 4)]).await;

    let stop = session.step().await.unwrap();

    assert_eq!(stop, hit(200, MAIN, 4));
    // bci 2 shares the starting position, so the target skips past it.
    assert_eq!(
        received_after_start(&vm).await,
        vec![Command::ProcessStepTo {
            function_id: MAIN,
            bytecode_index: 4
        }]
    );
}

#[tokio::test]
async fn step_keeps_going_while_the_position_is_unchanged() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = paused_at(&vm, NATIVE, 0).await;
    vm.reply(opcode::PROCESS_STEP, vec![hit(200, NATIVE, 1)]).await;
    vm.reply(opcode::PROCESS_STEP, vec![hit(200, NATIVE, 2)]).await;
    vm.reply(opcode::PROCESS_STEP, vec![hit(200, MAIN, 4)]).await;

    let stop = session.step().await.unwrap();

    assert_eq!(stop, hit(200, MAIN, 4));
    assert_eq!(received_after_start(&vm).await, vec![Command::ProcessStep; 3]);
}

#[tokio::test]
async fn step_stops_when_it_makes_no_progress() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = paused_at(&vm, NATIVE, 0).await;
    vm.reply(opcode::PROCESS_STEP, vec![hit(200, NATIVE, 0)]).await;

    session.step().await.unwrap();

    assert_eq!(received_after_start(&vm).await, vec![Command::ProcessStep]);
}

#[tokio::test]
async fn step_stops_when_the_process_stops() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = paused_at(&vm, MAIN, 0).await;
    vm.reply(
        opcode::PROCESS_STEP_TO,
        vec![Message::UncaughtException { process_id: PID }],
    )
    .await;

    let stop = session.step().await.unwrap();

    assert_eq!(stop, Message::UncaughtException { process_id: PID });
    assert!(!session.is_running());
    assert!(session.is_loaded());
}

#[tokio::test]
async fn explicit_bytecode_steps_send_a_single_command() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = paused_at(&vm, MAIN, 0).await;
    vm.reply(opcode::PROCESS_STEP, vec![hit(200, MAIN, 2)]).await;
    vm.reply(opcode::PROCESS_STEP_TO, vec![hit(200, MAIN, 8)]).await;

    session.step_bytecode().await.unwrap();
    session.step_to(MAIN, 8).await.unwrap();

    let top = session.state().top_frame.as_ref().unwrap();
    assert_eq!(top.bytecode_index, 8);
    assert_eq!(
        received_after_start(&vm).await,
        vec![
            Command::ProcessStep,
            Command::ProcessStepTo {
                function_id: MAIN,
                bytecode_index: 8
            },
        ]
    );
}

#[tokio::test]
async fn step_over_consumes_its_one_shot_breakpoint() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = paused_at(&vm, MAIN, 0).await;
    vm.reply(opcode::PROCESS_STEP_OVER, one_shot(50, hit(50, MAIN, 4)))
        .await;

    let stop = session.step_over().await.unwrap();

    assert_eq!(stop, hit(50, MAIN, 4));
    assert_eq!(received_after_start(&vm).await, vec![Command::ProcessStepOver]);
}

#[tokio::test]
async fn step_over_interrupted_elsewhere_deletes_the_one_shot() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = paused_at(&vm, MAIN, 0).await;
    vm.reply(opcode::PROCESS_STEP_OVER, one_shot(7, hit(3, HELPER, 0)))
        .await;
    vm.reply(
        opcode::PROCESS_DELETE_ONE_SHOT_BREAKPOINT,
        vec![Message::DeleteBreakpointResult { breakpoint_id: 7 }],
    )
    .await;

    let stop = session.step_over().await.unwrap();

    assert_eq!(stop, hit(3, HELPER, 0));
    assert!(session.is_running());
    assert_eq!(
        received_after_start(&vm).await,
        vec![
            Command::ProcessStepOver,
            Command::ProcessDeleteOneShotBreakpoint {
                process_id: PID,
                breakpoint_id: 7
            },
        ]
    );
}

#[tokio::test]
async fn step_over_repeats_until_the_line_changes() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = paused_at(&vm, MAIN, 0).await;
    vm.reply(
        opcode::PROCESS_STEP_OVER,
        one_shot(NO_BREAKPOINT, hit(100, MAIN, 2)),
    )
    .await;
    vm.reply(
        opcode::PROCESS_STEP_OVER,
        one_shot(NO_BREAKPOINT, hit(100, MAIN, 4)),
    )
    .await;

    let stop = session.step_over().await.unwrap();

    assert_eq!(stop, hit(100, MAIN, 4));
    assert_eq!(
        received_after_start(&vm).await,
        vec![Command::ProcessStepOver; 2]
    );
}

#[tokio::test]
async fn step_out_of_the_outermost_frame_continues() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = paused_at(&vm, MAIN, 0).await;
    vm.reply(opcode::PROCESS_BACKTRACE_REQUEST, vec![backtrace(&[(MAIN, 0)])])
        .await;
    vm.reply(opcode::PROCESS_CONTINUE, vec![hit(100, MAIN, 8)])
        .await;

    let stop = session.step_out().await.unwrap();

    assert_eq!(stop, hit(100, MAIN, 8));
    assert_eq!(
        received_after_start(&vm).await,
        vec![
            Command::ProcessBacktraceRequest { process_id: PID },
            Command::ProcessContinue,
        ]
    );
}

#[tokio::test]
async fn step_out_finishes_the_call_site_line() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = paused_at(&vm, HELPER, 0).await;
    vm.reply(
        opcode::PROCESS_BACKTRACE_REQUEST,
        vec![backtrace(&[(HELPER, 0), (MAIN, 4)])],
    )
    .await;
    // Returns into the middle of line 2, so a regular step follows.
    vm.reply(opcode::PROCESS_STEP_OUT, one_shot(60, hit(60, MAIN, 6)))
        .await;
    vm.reply(opcode::PROCESS_STEP_TO, vec![hit(200, MAIN, 8)]).await;

    let stop = session.step_out().await.unwrap();

    assert_eq!(stop, hit(200, MAIN, 8));
    assert_eq!(
        received_after_start(&vm).await,
        vec![
            Command::ProcessBacktraceRequest { process_id: PID },
            Command::ProcessStepOut,
            Command::ProcessStepTo {
                function_id: MAIN,
                bytecode_index: 8
            },
        ]
    );
}

#[tokio::test]
async fn step_out_interrupted_elsewhere_deletes_the_one_shot() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = paused_at(&vm, HELPER, 0).await;
    vm.reply(
        opcode::PROCESS_BACKTRACE_REQUEST,
        vec![backtrace(&[(HELPER, 0), (MAIN, 4)])],
    )
    .await;
    vm.reply(opcode::PROCESS_STEP_OUT, one_shot(60, hit(5, HELPER, 0)))
        .await;
    vm.reply(
        opcode::PROCESS_DELETE_ONE_SHOT_BREAKPOINT,
        vec![Message::DeleteBreakpointResult { breakpoint_id: 60 }],
    )
    .await;

    let stop = session.step_out().await.unwrap();

    assert_eq!(stop, hit(5, HELPER, 0));
    assert!(session.is_running());
    assert_eq!(
        received_after_start(&vm).await,
        vec![
            Command::ProcessBacktraceRequest { process_id: PID },
            Command::ProcessStepOut,
            Command::ProcessDeleteOneShotBreakpoint {
                process_id: PID,
                breakpoint_id: 60
            },
        ]
    );
}

#[tokio::test]
async fn step_out_does_not_stop_in_internal_frames() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = paused_at(&vm, HELPER, 0).await;
    vm.reply(
        opcode::PROCESS_BACKTRACE_REQUEST,
        vec![backtrace(&[(HELPER, 0), (TRAMPOLINE, 0), (MAIN, 4)])],
    )
    .await;
    vm.reply(opcode::PROCESS_STEP_OUT, one_shot(60, hit(60, TRAMPOLINE, 2)))
        .await;
    vm.reply(opcode::PROCESS_STEP_OUT, one_shot(61, hit(61, MAIN, 8)))
        .await;

    let stop = session.step_out().await.unwrap();

    assert_eq!(stop, hit(61, MAIN, 8));
    assert_eq!(
        received_after_start(&vm).await,
        vec![
            Command::ProcessBacktraceRequest { process_id: PID },
            Command::ProcessStepOut,
            Command::ProcessStepOut,
        ]
    );
}

#[tokio::test]
async fn restart_needs_a_caller() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = paused_at(&vm, MAIN, 0).await;
    vm.reply(opcode::PROCESS_BACKTRACE_REQUEST, vec![backtrace(&[(MAIN, 0)])])
        .await;

    assert!(matches!(session.restart().await, Err(DebugError::CannotRestart)));
}

#[tokio::test]
async fn restart_addresses_the_selected_frame_in_the_full_stack() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = paused_at(&vm, HELPER, 0).await;
    vm.reply(
        opcode::PROCESS_BACKTRACE_REQUEST,
        vec![backtrace(&[(HELPER, 0), (TRAMPOLINE, 0), (MAIN, 4)])],
    )
    .await;
    vm.reply(opcode::PROCESS_RESTART_FRAME, vec![hit(100, MAIN, 0)])
        .await;

    session.select_frame(1).await.unwrap();
    let stop = session.restart().await.unwrap();

    assert_eq!(stop, hit(100, MAIN, 0));
    assert_eq!(
        received_after_start(&vm).await.last(),
        Some(&Command::ProcessRestartFrame { frame: 2 })
    );
}
