use bvm_debug::program::ColumnSpec;
use bvm_debug::DebugError;
use bvm_wire::mock::MockVm;
use bvm_wire::{opcode, Command, Message};

use crate::harness::{connect, hit, paused_at, received_after_start, FOO_A, FOO_B, MAIN};

fn set_result(breakpoint_id: i32) -> Vec<Message> {
    vec![Message::SetBreakpointResult { breakpoint_id }]
}

fn delete_result(breakpoint_id: i32) -> Vec<Message> {
    vec![Message::DeleteBreakpointResult { breakpoint_id }]
}

#[tokio::test]
async fn breaking_on_a_name_covers_every_matching_function() {
    let vm = MockVm::spawn().await.unwrap();
    vm.reply(opcode::PROCESS_SET_BREAKPOINT, set_result(1)).await;
    vm.reply(opcode::PROCESS_SET_BREAKPOINT, set_result(2)).await;
    let mut session = connect(&vm).await;

    let breakpoints = session.set_breakpoint_by_name("foo", 5).await.unwrap();

    let ids: Vec<_> = breakpoints.iter().map(|breakpoint| breakpoint.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(breakpoints[0].function_name, "foo");
    assert_eq!(breakpoints[1].function_name, "Foo.foo");
    assert_eq!(session.list_breakpoints(), breakpoints);
    assert_eq!(
        vm.received().await,
        vec![
            Command::PushFunction { function_id: FOO_A },
            Command::ProcessSetBreakpoint { bytecode_index: 5 },
            Command::PushFunction { function_id: FOO_B },
            Command::ProcessSetBreakpoint { bytecode_index: 5 },
        ]
    );
}

#[tokio::test]
async fn qualified_names_select_a_single_method() {
    let vm = MockVm::spawn().await.unwrap();
    vm.reply(opcode::PROCESS_SET_BREAKPOINT, set_result(4)).await;
    let mut session = connect(&vm).await;

    let breakpoints = session.set_breakpoint_by_name("Foo.foo", 0).await.unwrap();

    assert_eq!(breakpoints.len(), 1);
    assert_eq!(breakpoints[0].function_id, FOO_B);
    assert!(session.set_breakpoint_by_name("nope", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn file_positions_resolve_to_the_closest_following_column() {
    let vm = MockVm::spawn().await.unwrap();
    vm.reply(opcode::PROCESS_SET_BREAKPOINT, set_result(1)).await;
    vm.reply(opcode::PROCESS_SET_BREAKPOINT, set_result(2)).await;
    vm.reply(opcode::PROCESS_SET_BREAKPOINT, set_result(3)).await;
    let mut session = connect(&vm).await;

    let by_column = session
        .set_file_breakpoint("main.src", 2, &ColumnSpec::Column(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!((by_column.function_id, by_column.bytecode_index), (MAIN, 4));

    let by_text = session
        .set_file_breakpoint("main.src", 3, &ColumnSpec::Pattern("var p".into()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!((by_text.function_id, by_text.bytecode_index), (MAIN, 8));

    // Offset 11 is the `v` of `var x` on line 2.
    let by_offset = session
        .set_offset_breakpoint("main.src", 11)
        .await
        .unwrap()
        .unwrap();
    assert_eq!((by_offset.function_id, by_offset.bytecode_index), (MAIN, 4));
}

#[tokio::test]
async fn unresolved_positions_send_nothing() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = connect(&vm).await;

    assert!(session
        .set_file_breakpoint("main.src", 42, &ColumnSpec::Column(1))
        .await
        .unwrap()
        .is_none());
    assert!(session
        .set_file_breakpoint("other.src", 1, &ColumnSpec::Column(1))
        .await
        .unwrap()
        .is_none());
    assert!(session.list_breakpoints().is_empty());

    session.handshake("1.0.0").await.unwrap();
    assert_eq!(vm.received().await.len(), 1);
}

#[tokio::test]
async fn deleting_an_unknown_breakpoint_is_a_local_no_op() {
    let vm = MockVm::spawn().await.unwrap();
    vm.reply(opcode::PROCESS_SET_BREAKPOINT, set_result(1)).await;
    let mut session = connect(&vm).await;
    session.set_breakpoint_by_name("main", 0).await.unwrap();
    let before = vm.received().await.len();

    assert_eq!(session.delete_breakpoint(99).await.unwrap(), None);

    assert_eq!(session.list_breakpoints().len(), 1);
    session.handshake("1.0.0").await.unwrap();
    assert_eq!(vm.received().await.len(), before + 1);
}

#[tokio::test]
async fn deleting_a_breakpoint_removes_it_from_the_table() {
    let vm = MockVm::spawn().await.unwrap();
    vm.reply(opcode::PROCESS_SET_BREAKPOINT, set_result(1)).await;
    vm.reply(opcode::PROCESS_SET_BREAKPOINT, set_result(2)).await;
    vm.reply(opcode::PROCESS_DELETE_BREAKPOINT, delete_result(1))
        .await;
    let mut session = connect(&vm).await;
    session.set_breakpoint_by_name("foo", 0).await.unwrap();

    let removed = session.delete_breakpoint(1).await.unwrap().unwrap();

    assert_eq!(removed.function_id, FOO_A);
    let remaining: Vec<_> = session.list_breakpoints().iter().map(|b| b.id).collect();
    assert_eq!(remaining, vec![2]);
    assert_eq!(
        vm.received().await.last(),
        Some(&Command::ProcessDeleteBreakpoint { breakpoint_id: 1 })
    );
}

#[tokio::test]
async fn a_mismatched_delete_echo_is_an_error() {
    let vm = MockVm::spawn().await.unwrap();
    vm.reply(opcode::PROCESS_SET_BREAKPOINT, set_result(1)).await;
    vm.reply(opcode::PROCESS_DELETE_BREAKPOINT, delete_result(5))
        .await;
    let mut session = connect(&vm).await;
    session.set_breakpoint_by_name("main", 0).await.unwrap();

    let err = session.delete_breakpoint(1).await.unwrap_err();

    assert!(matches!(
        err,
        DebugError::BreakpointIdMismatch {
            requested: 1,
            echoed: 5
        }
    ));
}

#[tokio::test]
async fn breakpoint_hits_name_the_breakpoint() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = paused_at(&vm, MAIN, 0).await;
    vm.reply(opcode::PROCESS_SET_BREAKPOINT, set_result(10)).await;
    vm.reply(opcode::PROCESS_CONTINUE, vec![hit(10, MAIN, 4)]).await;

    session
        .set_file_breakpoint("main.src", 2, &ColumnSpec::Column(3))
        .await
        .unwrap();
    let stop = session.cont().await.unwrap();

    assert_eq!(
        session.describe_stop(&stop).await.unwrap(),
        "Breakpoint 10 hit: main @4 (main.src:2:3)"
    );
    assert_eq!(
        received_after_start(&vm).await,
        vec![
            Command::PushFunction { function_id: MAIN },
            Command::ProcessSetBreakpoint { bytecode_index: 4 },
            Command::ProcessContinue,
        ]
    );
}
