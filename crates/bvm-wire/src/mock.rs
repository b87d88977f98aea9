use std::{
    collections::{HashMap, VecDeque},
    io::Write,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError},
};

use tokio::{
    io::AsyncWriteExt,
    net::{tcp::OwnedWriteHalf, TcpListener},
    sync::Mutex,
};
use tokio_util::sync::CancellationToken;

use crate::{
    codec::read_frame,
    message::{Command, Message},
};

/// A scripted stand-in for the virtual machine, listening on localhost.
///
/// It accepts a single connection, records every decoded command, and answers
/// each command with the next reply batch queued for that command's opcode
/// (or nothing when the queue is empty). Handshakes are answered automatically
/// unless a reply was queued for them.
pub struct MockVm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<State>,
}

#[derive(Clone, Debug)]
pub struct MockVmConfig {
    /// Version reported by automatic handshake replies. A handshake carrying a
    /// different version is answered with `success: false`.
    pub version: String,
}

impl Default for MockVmConfig {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
        }
    }
}

#[derive(Debug)]
struct Reply {
    messages: Vec<Message>,
    close_after: bool,
}

struct State {
    config: MockVmConfig,
    replies: Mutex<HashMap<u8, VecDeque<Reply>>>,
    received: Mutex<Vec<Command>>,
}

impl MockVm {
    pub async fn spawn() -> std::io::Result<Self> {
        Self::spawn_with_config(MockVmConfig::default()).await
    }

    pub async fn spawn_with_config(config: MockVmConfig) -> std::io::Result<Self> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();

        let state = Arc::new(State {
            config,
            replies: Mutex::new(HashMap::new()),
            received: Mutex::new(Vec::new()),
        });
        let task_shutdown = shutdown.clone();
        let task_state = state.clone();

        tokio::spawn(async move {
            if let Err(err) = run(listener, task_state, task_shutdown).await {
                tracing::debug!(target: "bvm.wire", error = %err, "mock vm stopped");
            }
        });

        Ok(Self {
            addr,
            shutdown,
            state,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queues `messages` as the answer to the next command with opcode `op`.
    pub async fn reply(&self, op: u8, messages: Vec<Message>) {
        self.push(op, messages, false).await;
    }

    /// Like [`MockVm::reply`], then closes the connection.
    pub async fn reply_then_close(&self, op: u8, messages: Vec<Message>) {
        self.push(op, messages, true).await;
    }

    async fn push(&self, op: u8, messages: Vec<Message>, close_after: bool) {
        self.state
            .replies
            .lock()
            .await
            .entry(op)
            .or_default()
            .push_back(Reply {
                messages,
                close_after,
            });
    }

    /// Every command received so far, in arrival order.
    pub async fn received(&self) -> Vec<Command> {
        self.state.received.lock().await.clone()
    }

    /// Number of queued replies that were never consumed.
    pub async fn pending_replies(&self) -> usize {
        self.state
            .replies
            .lock()
            .await
            .values()
            .map(VecDeque::len)
            .sum()
    }
}

impl Drop for MockVm {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run(
    listener: TcpListener,
    state: Arc<State>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let (socket, _) = tokio::select! {
        _ = shutdown.cancelled() => return Ok(()),
        accept = listener.accept() => accept?,
    };
    let (mut reader, mut writer) = socket.into_split();

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            res = read_frame(&mut reader) => res,
        };
        let Some((op, payload)) = frame.map_err(std::io::Error::other)? else {
            // Debugger closed its side: mirror it so the client can finish draining.
            writer.shutdown().await?;
            return Ok(());
        };
        let command = Command::decode(op, &payload).map_err(std::io::Error::other)?;
        state.received.lock().await.push(command.clone());

        let reply = state
            .replies
            .lock()
            .await
            .get_mut(&op)
            .and_then(VecDeque::pop_front);
        let reply = match (reply, &command) {
            (Some(reply), _) => reply,
            (None, Command::HandShake { version }) => Reply {
                messages: vec![Message::HandShakeResult {
                    success: *version == state.config.version,
                    version: state.config.version.clone(),
                }],
                close_after: false,
            },
            (None, _) => continue,
        };

        write_reply(&mut writer, &reply).await?;
        if reply.close_after {
            writer.shutdown().await?;
            return Ok(());
        }
    }
}

async fn write_reply(writer: &mut OwnedWriteHalf, reply: &Reply) -> std::io::Result<()> {
    debug_assert!(reply.messages.iter().all(|m| m.opcode().is_some()));
    for message in &reply.messages {
        if let Some(frame) = message.encode() {
            writer.write_all(&frame).await?;
        }
    }
    writer.flush().await
}

/// Cloneable in-memory byte sink for capturing diverted program output.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<StdMutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.bytes().clone()
    }

    // A writer that panicked mid-append still leaves readable bytes behind.
    fn bytes(&self) -> MutexGuard<'_, Vec<u8>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contents_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.bytes().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
