use bvm_debug::SessionConfig;
use bvm_wire::mock::{MockVm, SharedBuffer};
use bvm_wire::{opcode, ChannelConfig, Command, Message, MessageChannel, OutputSinks, VmConnection};
use tokio::net::TcpStream;

use crate::harness::{capture, connect_with, plain_config};

fn filler(n: u32) -> Message {
    Message::ProcessIds { ids: vec![n] }
}

#[tokio::test]
async fn every_command_consumes_exactly_its_declared_responses() {
    let vm = MockVm::spawn().await.unwrap();
    let stream = TcpStream::connect(vm.addr()).await.unwrap();
    let mut conn = VmConnection::new(MessageChannel::new(
        stream,
        OutputSinks::discard(),
        ChannelConfig::default(),
    ));

    let commands = [
        Command::EnableDebugging,
        Command::PushFunction { function_id: 3 },
        Command::ProcessRun,
        Command::ProcessStepOver,
        Command::ProcessBacktraceRequest { process_id: 1 },
        Command::ProcessStepOut,
        Command::ProcessFibers,
    ];
    for (index, command) in commands.iter().enumerate() {
        let count = command.expected_responses().unwrap();
        let replies = (0..count).map(|n| filler(index as u32 * 10 + n as u32)).collect();
        vm.reply(command.opcode(), replies).await;

        let responses = conn.run_command_responses(command).await.unwrap();
        assert_eq!(responses.len(), count, "{}", command.name());
        if let Some(last) = responses.last() {
            assert_eq!(*last, filler(index as u32 * 10 + count as u32 - 1));
        }
    }

    // Nothing was left unread: the next exchange sees its own answer.
    let handshake = Command::HandShake {
        version: "1.0.0".into(),
    };
    assert!(matches!(
        conn.run_command(&handshake).await.unwrap(),
        Some(Message::HandShakeResult { success: true, .. })
    ));
    assert_eq!(vm.received().await.len(), commands.len() + 1);
    assert_eq!(vm.pending_replies().await, 0);
}

#[tokio::test]
async fn program_output_reaches_the_sinks_in_order() {
    let vm = MockVm::spawn().await.unwrap();
    vm.reply(
        opcode::PROCESS_RUN,
        vec![
            Message::StdoutData(b"hello ".to_vec()),
            Message::StderrData(b"oops".to_vec()),
            Message::StdoutData(b"world".to_vec()),
            Message::ProcessTerminated,
        ],
    )
    .await;
    let (stdout, stderr) = (SharedBuffer::default(), SharedBuffer::default());
    let mut session = connect_with(&vm, plain_config(), capture(&stdout, &stderr)).await;

    session.spawn_process(Vec::new()).await.unwrap();
    let stop = session.run().await.unwrap();

    assert_eq!(stop, Some(Message::ProcessTerminated));
    assert_eq!(stdout.contents_lossy(), "hello world");
    assert_eq!(stderr.contents_lossy(), "oops");
}

#[tokio::test]
async fn silent_sessions_drop_program_stdout() {
    let vm = MockVm::spawn().await.unwrap();
    vm.reply(
        opcode::PROCESS_RUN,
        vec![
            Message::StdoutData(b"hidden".to_vec()),
            Message::StderrData(b"shown".to_vec()),
            Message::ProcessTerminated,
        ],
    )
    .await;
    let (stdout, stderr) = (SharedBuffer::default(), SharedBuffer::default());
    let config = SessionConfig {
        silent: true,
        ..plain_config()
    };
    let mut session = connect_with(&vm, config, capture(&stdout, &stderr)).await;

    session.spawn_process(Vec::new()).await.unwrap();
    session.run().await.unwrap();

    assert!(stdout.contents().is_empty());
    assert_eq!(stderr.contents_lossy(), "shown");
}

#[tokio::test]
async fn disabling_standard_output_is_sent_to_the_vm() {
    let vm = MockVm::spawn().await.unwrap();
    let mut session = connect_with(&vm, plain_config(), OutputSinks::discard()).await;

    session.disable_standard_output().await.unwrap();
    session.enable_live_editing().await.unwrap();
    // Neither command is answered; the handshake orders them.
    session.handshake("1.0.0").await.unwrap();

    assert_eq!(
        vm.received().await,
        vec![
            Command::DisableStandardOutput,
            Command::EnableLiveEditing,
            Command::HandShake {
                version: "1.0.0".into()
            },
        ]
    );
}
