use std::io::Write;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    codec::read_frame,
    message::Message,
    types::{Result, WireError},
};

pub type OutputSink = Box<dyn Write + Send>;

/// Destinations for the program's standard output/error, which the VM streams
/// interleaved with protocol messages.
pub struct OutputSinks {
    pub stdout: OutputSink,
    pub stderr: OutputSink,
}

impl OutputSinks {
    pub fn stdio() -> Self {
        Self {
            stdout: Box::new(std::io::stdout()),
            stderr: Box::new(std::io::stderr()),
        }
    }

    pub fn discard() -> Self {
        Self {
            stdout: Box::new(std::io::sink()),
            stderr: Box::new(std::io::sink()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Number of decoded protocol messages buffered ahead of the reader.
    pub incoming_buffer: usize,
    /// Drop standard-output data instead of writing it to the sink.
    pub silence_stdout: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            incoming_buffer: 64,
            silence_stdout: false,
        }
    }
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Bidirectional framed connection to the virtual machine.
///
/// A background task decodes incoming frames, diverts program output to the
/// sinks, and queues everything else for [`MessageChannel::next_message`].
pub struct MessageChannel {
    writer: Option<BoxedWriter>,
    incoming: mpsc::Receiver<Message>,
    alive: Arc<AtomicBool>,
    silence_stdout: Arc<AtomicBool>,
    shutdown: CancellationToken,
    reader_task: Option<JoinHandle<()>>,
}

impl MessageChannel {
    /// Must be called from within a tokio runtime.
    pub fn new<T>(transport: T, sinks: OutputSinks, config: ChannelConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(transport);
        let (tx, incoming) = mpsc::channel(config.incoming_buffer.max(1));
        let alive = Arc::new(AtomicBool::new(true));
        let silence_stdout = Arc::new(AtomicBool::new(config.silence_stdout));
        let shutdown = CancellationToken::new();

        let reader_task = tokio::spawn(read_loop(
            reader,
            tx,
            sinks,
            ReadLoopShared {
                alive: alive.clone(),
                silence_stdout: silence_stdout.clone(),
                shutdown: shutdown.clone(),
            },
        ));

        Self {
            writer: Some(Box::new(writer)),
            incoming,
            alive,
            silence_stdout,
            shutdown,
            reader_task: Some(reader_task),
        }
    }

    /// False once the transport closed or failed, or the channel was killed.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn set_stdout_silenced(&self, silenced: bool) {
        self.silence_stdout.store(silenced, Ordering::Relaxed);
    }

    pub async fn send(&mut self, frame: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(WireError::ConnectionClosed)?;
        let res = async {
            writer.write_all(frame).await?;
            writer.flush().await
        }
        .await;
        if let Err(err) = res {
            self.alive.store(false, Ordering::Release);
            return Err(err.into());
        }
        Ok(())
    }

    /// Next protocol message, or `None` once the incoming side is drained.
    pub async fn next_message(&mut self) -> Option<Message> {
        self.incoming.recv().await
    }

    /// Closes the outgoing side. Idempotent.
    pub async fn close_outgoing(&mut self) -> Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.shutdown().await?;
        Ok(())
    }

    /// Resolves once the incoming side has fully closed.
    pub async fn closed(&mut self) {
        if let Some(task) = self.reader_task.take() {
            if let Err(err) = task.await {
                tracing::warn!(target: "bvm.wire", error = %err, "reader task ended abnormally");
            }
        }
    }

    /// Tears the connection down without waiting for the peer. Never fails.
    pub fn kill(&mut self) {
        self.alive.store(false, Ordering::Release);
        self.writer = None;
        self.shutdown.cancel();
        self.incoming.close();
    }
}

impl Drop for MessageChannel {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct ReadLoopShared {
    alive: Arc<AtomicBool>,
    silence_stdout: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

async fn read_loop<R>(
    mut reader: R,
    tx: mpsc::Sender<Message>,
    mut sinks: OutputSinks,
    shared: ReadLoopShared,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            res = read_frame(&mut reader) => res,
        };
        let (opcode, payload) = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::debug!(target: "bvm.wire", "virtual machine closed the connection");
                break;
            }
            Err(err) => {
                tracing::warn!(target: "bvm.wire", error = %err, "failed to read frame");
                break;
            }
        };

        let message = match Message::decode(opcode, &payload) {
            Ok(message) => message,
            Err(err) => {
                tracing::error!(target: "bvm.wire", opcode, error = %err, "undecodable message");
                break;
            }
        };
        tracing::trace!(target: "bvm.wire", message = message.name(), "received");

        match message {
            Message::StdoutData(bytes) => {
                if !shared.silence_stdout.load(Ordering::Relaxed) {
                    divert(&mut sinks.stdout, &bytes);
                }
            }
            Message::StderrData(bytes) => divert(&mut sinks.stderr, &bytes),
            message => {
                let sent = tokio::select! {
                    _ = shared.shutdown.cancelled() => break,
                    res = tx.send(message) => res,
                };
                if sent.is_err() {
                    break;
                }
            }
        }
    }

    shared.alive.store(false, Ordering::Release);
}

fn divert(sink: &mut OutputSink, bytes: &[u8]) {
    if let Err(err) = sink.write_all(bytes).and_then(|()| sink.flush()) {
        tracing::warn!(target: "bvm.wire", error = %err, "failed to forward program output");
    }
}
