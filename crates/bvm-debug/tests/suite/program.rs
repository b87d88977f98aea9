use std::path::PathBuf;
use std::sync::Arc;

use bvm_debug::program::{ColumnSpec, ProgramSymbols, StaticProgram};
use bvm_debug::Session;
use bvm_wire::mock::MockVm;
use bvm_wire::{opcode, Message, OutputSinks, WireValue};

use crate::harness::{backtrace, hit, plain_config};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

#[test]
fn exported_symbol_tables_load_from_disk() {
    let program = StaticProgram::load_from_path(fixture("counter.json")).unwrap();

    let names: Vec<_> = program
        .functions_named("Counter.increment")
        .iter()
        .map(|function| function.id)
        .collect();
    assert_eq!(names, vec![2]);
    assert_eq!(program.selector_name(4), Some("increment"));
    assert!(program.function(3).unwrap().is_internal());
}

#[test]
fn missing_symbol_tables_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    assert!(StaticProgram::load_from_path(dir.path().join("nope.json")).is_err());
}

#[tokio::test]
async fn a_loaded_program_drives_a_debugging_session() {
    let program = StaticProgram::load_from_path(fixture("counter.json")).unwrap();
    let vm = MockVm::spawn().await.unwrap();
    vm.reply(
        opcode::PROCESS_SET_BREAKPOINT,
        vec![Message::SetBreakpointResult { breakpoint_id: 1 }],
    )
    .await;
    vm.reply(opcode::PROCESS_RUN, vec![hit(1, 2, 0)]).await;
    vm.reply(
        opcode::PROCESS_BACKTRACE_REQUEST,
        vec![backtrace(&[(2, 0), (3, 0), (1, 9)])],
    )
    .await;
    vm.reply(
        opcode::PROCESS_LOCAL_STRUCTURE,
        vec![
            Message::InstanceStructure {
                class_id: 1,
                fields: 1,
            },
            Message::Value(WireValue::Integer(3)),
        ],
    )
    .await;

    let mut session = Session::connect(
        vm.addr(),
        OutputSinks::discard(),
        Arc::new(program),
        plain_config(),
    )
    .await
    .unwrap();
    session.enable_debugging().await.unwrap();
    let breakpoint = session
        .set_file_breakpoint("counter.src", 7, &ColumnSpec::Pattern("increment".into()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(breakpoint.function_name, "Counter.increment");
    session.spawn_process(Vec::new()).await.unwrap();

    let stop = session.debug_run().await.unwrap();
    assert_eq!(
        session.describe_stop(&stop).await.unwrap(),
        "Breakpoint 1 hit: Counter.increment @0 (counter.src:7:5)"
    );
    assert_eq!(
        session.describe_backtrace().await.unwrap(),
        "*0: Counter.increment @0\n 1: main @9\n"
    );

    session.select_frame(1).await.unwrap();
    let count = session.read_local_structure("count").await.unwrap();
    assert_eq!(
        session.renderer().object(&count),
        "count: Instance of 'Counter' {\n  value: 3\n}"
    );
}
