use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::oneshot;

use bvm_wire::{
    BreakpointId, Command, FunctionId, Message, MessageChannel, OutputSinks, ProcessId,
    VmConnection, WireError, NO_BREAKPOINT,
};

use crate::backtrace::{BackTrace, BackTraceFrame, FunctionRef};
use crate::config::SessionConfig;
use crate::error::{DebugError, DebugResult};
use crate::format::Renderer;
use crate::program::{ColumnSpec, FunctionInfo, Position, Program, SourceLocation};
use crate::scope::Scope;
use crate::state::{Breakpoint, DebugState};
use crate::value::{self, unexpected, RemoteObject, RemoteValue};

/// The client side of one debugging connection to the virtual machine.
///
/// Every operation takes `&mut self`, so at most one command exchange is ever
/// in flight. The `loaded`/`running`/`terminated` flags move only in response
/// to protocol events.
pub struct Session {
    conn: VmConnection,
    program: Arc<dyn Program>,
    config: SessionConfig,
    state: DebugState,
    loaded: bool,
    running: bool,
    terminated: bool,
    exit_signal: Option<oneshot::Receiver<i32>>,
    exit_code: Option<i32>,
}

impl Session {
    /// Must be called from within a tokio runtime.
    pub fn new<T>(
        transport: T,
        sinks: OutputSinks,
        program: Arc<dyn Program>,
        config: SessionConfig,
    ) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let channel = MessageChannel::new(transport, sinks, config.channel_config());
        Self {
            conn: VmConnection::new(channel),
            program,
            state: DebugState::new(config.show_internal_frames, config.verbose),
            config,
            loaded: false,
            running: false,
            terminated: false,
            exit_signal: None,
            exit_code: None,
        }
    }

    pub async fn connect(
        addr: impl ToSocketAddrs,
        sinks: OutputSinks,
        program: Arc<dyn Program>,
        config: SessionConfig,
    ) -> DebugResult<Self> {
        let stream = TcpStream::connect(addr).await.map_err(WireError::from)?;
        stream.set_nodelay(true).map_err(WireError::from)?;
        Ok(Self::new(stream, sinks, program, config))
    }

    /// Resolves with the VM's exit code; awaited while the session terminates.
    pub fn with_exit_signal(mut self, exit: oneshot::Receiver<i32>) -> Self {
        self.exit_signal = Some(exit);
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// False once the VM closed its side or the connection was torn down.
    pub fn is_connected(&self) -> bool {
        self.conn.is_alive()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn state(&self) -> &DebugState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn program(&self) -> &dyn Program {
        &*self.program
    }

    pub fn renderer(&self) -> Renderer<'_> {
        Renderer::new(&*self.program, &self.config)
    }

    fn require_running(&self) -> DebugResult<()> {
        if self.running {
            Ok(())
        } else {
            Err(DebugError::NotRunning)
        }
    }

    fn require_live_process(&self) -> DebugResult<ProcessId> {
        if !self.loaded || self.terminated {
            return Err(DebugError::NoProcess);
        }
        self.state.current_process.ok_or(DebugError::NoProcess)
    }

    /// Returns whether the VM accepted `version`, and the VM's own version.
    pub async fn handshake(&mut self, version: &str) -> DebugResult<(bool, String)> {
        let command = Command::HandShake {
            version: version.to_owned(),
        };
        match self.conn.run_command(&command).await? {
            Some(Message::HandShakeResult { success, version }) => {
                tracing::debug!(target: "bvm.debug", success, vm_version = %version, "handshake");
                Ok((success, version))
            }
            other => Err(unexpected("HandShakeResult", &other.unwrap_or(Message::ConnectionError))),
        }
    }

    pub async fn enable_debugging(&mut self) -> DebugResult<()> {
        self.conn.run_command(&Command::EnableDebugging).await?;
        Ok(())
    }

    pub async fn enable_live_editing(&mut self) -> DebugResult<()> {
        self.conn.run_command(&Command::EnableLiveEditing).await?;
        Ok(())
    }

    /// Asks the VM to stop streaming program output, and drops any that is
    /// already in flight.
    pub async fn disable_standard_output(&mut self) -> DebugResult<()> {
        self.conn.channel().set_stdout_silenced(true);
        self.conn.run_command(&Command::DisableStandardOutput).await?;
        Ok(())
    }

    pub async fn spawn_process(&mut self, arguments: Vec<String>) -> DebugResult<()> {
        if self.loaded {
            return Err(DebugError::AlreadyLoaded);
        }
        self.conn
            .run_command(&Command::ProcessSpawnForMain { arguments })
            .await?;
        Ok(())
    }

    /// Runs the spawned process to completion.
    ///
    /// Returns the stop event, or `None` when the VM closed the connection
    /// without one (it halts silently on compile-time errors); that case
    /// counts as a completed run.
    pub async fn run(&mut self) -> DebugResult<Option<Message>> {
        if self.loaded || self.running {
            return Err(DebugError::AlreadyLoaded);
        }
        self.conn.send_command(&Command::ProcessRun).await?;
        self.loaded = true;
        self.running = true;

        match self.conn.read_next(false).await {
            Some(stop) => self.handle_process_stop(stop).await.map(Some),
            None => {
                tracing::debug!(target: "bvm.debug", "connection drained without a stop event");
                if let Err(err) = self.conn.shutdown(true).await {
                    tracing::warn!(target: "bvm.debug", error = %err, "shutdown after run failed");
                }
                self.mark_terminated();
                Ok(None)
            }
        }
    }

    /// Starts the spawned process under debugger control.
    pub async fn debug_run(&mut self) -> DebugResult<Message> {
        if self.loaded || self.running {
            return Err(DebugError::AlreadyLoaded);
        }
        self.conn.send_command(&Command::ProcessRun).await?;
        self.loaded = true;
        self.running = true;
        let stop = self
            .conn
            .read_next(true)
            .await
            .unwrap_or(Message::ConnectionError);
        self.handle_process_stop(stop).await
    }

    /// Classifies the terminal response of a run/step/continue/restart
    /// command and updates the session accordingly. Returns the same message.
    pub async fn handle_process_stop(&mut self, stop: Message) -> DebugResult<Message> {
        self.state.reset();
        match &stop {
            Message::ProcessBreakpoint {
                breakpoint_id,
                process_id,
                function_id,
                bytecode_index,
            } => {
                tracing::debug!(
                    target: "bvm.debug",
                    breakpoint_id,
                    process_id,
                    function_id,
                    bytecode_index,
                    "process paused"
                );
                self.state.current_process = Some(*process_id);
                let function = FunctionRef::resolve(&*self.program, *function_id);
                self.state.top_frame = Some(BackTraceFrame::new(function, *bytecode_index));
                self.running = true;
            }
            Message::UncaughtException { process_id } => {
                tracing::debug!(target: "bvm.debug", process_id, "uncaught exception");
                self.state.current_process = Some(*process_id);
                self.running = false;
            }
            Message::ProcessCompileTimeError => {
                tracing::debug!(target: "bvm.debug", "compile-time error");
                self.running = false;
            }
            Message::ProcessTerminated => {
                tracing::debug!(target: "bvm.debug", "process terminated");
                self.running = false;
                self.loaded = false;
                self.terminate_session().await?;
            }
            Message::ConnectionError => {
                tracing::debug!(target: "bvm.debug", "connection lost");
                if let Err(err) = self.conn.shutdown(true).await {
                    tracing::warn!(target: "bvm.debug", error = %err, "shutdown after connection loss failed");
                }
                self.mark_terminated();
            }
            other => {
                tracing::error!(target: "bvm.debug", message = other.name(), "unknown process stop reason");
                return Err(DebugError::UnknownStopReason(other.name().to_owned()));
            }
        }
        Ok(stop)
    }

    async fn run_stop_command(&mut self, command: Command) -> DebugResult<Message> {
        let stop = self
            .conn
            .run_command(&command)
            .await?
            .unwrap_or(Message::ConnectionError);
        self.handle_process_stop(stop).await
    }

    async fn terminate_session(&mut self) -> DebugResult<()> {
        if let Err(err) = self.conn.run_command(&Command::SessionEnd).await {
            tracing::warn!(target: "bvm.debug", error = %err, "failed to send SessionEnd");
        }
        if let Some(exit) = self.exit_signal.take() {
            match exit.await {
                Ok(code) => {
                    tracing::debug!(target: "bvm.debug", code, "virtual machine exited");
                    self.exit_code = Some(code);
                }
                Err(_) => tracing::debug!(target: "bvm.debug", "exit signal dropped"),
            }
        }
        let res = self.conn.shutdown(false).await;
        self.mark_terminated();
        Ok(res?)
    }

    /// Drops the process and every cache that described it.
    fn mark_terminated(&mut self) {
        self.running = false;
        self.loaded = false;
        self.terminated = true;
        self.state.reset();
        self.state.current_process = None;
    }

    /// Ends the session: tells the VM, waits for its exit, then closes the
    /// connection. No-op once terminated.
    pub async fn end_session(&mut self) -> DebugResult<()> {
        if self.terminated {
            return Ok(());
        }
        self.running = false;
        self.loaded = false;
        self.terminate_session().await
    }

    /// Closes the connection without ending the session on the VM side.
    pub async fn shutdown(&mut self) -> DebugResult<()> {
        let res = self.conn.shutdown(false).await;
        self.mark_terminated();
        Ok(res?)
    }

    /// Tears the connection down immediately. Never fails.
    pub fn kill(&mut self) {
        self.conn.kill();
        self.mark_terminated();
    }

    pub async fn set_breakpoint(
        &mut self,
        function: &FunctionInfo,
        bytecode_index: u32,
    ) -> DebugResult<Breakpoint> {
        let response = self
            .conn
            .run_commands(&[
                Command::PushFunction {
                    function_id: function.id,
                },
                Command::ProcessSetBreakpoint { bytecode_index },
            ])
            .await?;
        let id = match response {
            Some(Message::SetBreakpointResult { breakpoint_id }) => breakpoint_id,
            other => {
                return Err(unexpected(
                    "SetBreakpointResult",
                    &other.unwrap_or(Message::ConnectionError),
                ))
            }
        };

        let breakpoint = Breakpoint {
            id,
            function_id: function.id,
            function_name: self.renderer().qualified_name(function),
            bytecode_index,
        };
        tracing::debug!(target: "bvm.debug", breakpoint_id = id, function_id = function.id, bytecode_index, "breakpoint set");
        self.state.breakpoints.insert(id, breakpoint.clone());
        Ok(breakpoint)
    }

    /// One breakpoint per function matching `name`.
    pub async fn set_breakpoint_by_name(
        &mut self,
        name: &str,
        bytecode_index: u32,
    ) -> DebugResult<Vec<Breakpoint>> {
        let functions = self.program.functions_named(name);
        let mut breakpoints = Vec::with_capacity(functions.len());
        for function in functions {
            breakpoints.push(self.set_breakpoint(&function, bytecode_index).await?);
        }
        Ok(breakpoints)
    }

    /// `None` when the position does not resolve to code.
    pub async fn set_file_breakpoint(
        &mut self,
        file: &str,
        line: u32,
        column: &ColumnSpec,
    ) -> DebugResult<Option<Breakpoint>> {
        let position = self.program.position_for_line(file, line, column);
        self.set_breakpoint_at(position).await
    }

    pub async fn set_offset_breakpoint(
        &mut self,
        file: &str,
        offset: usize,
    ) -> DebugResult<Option<Breakpoint>> {
        let position = self.program.position_for_offset(file, offset);
        self.set_breakpoint_at(position).await
    }

    async fn set_breakpoint_at(&mut self, position: Option<Position>) -> DebugResult<Option<Breakpoint>> {
        let Some(position) = position else {
            return Ok(None);
        };
        self.set_breakpoint(&position.function, position.bytecode_index)
            .await
            .map(Some)
    }

    /// Returns the removed breakpoint, or `None` if `id` is unknown.
    pub async fn delete_breakpoint(&mut self, id: BreakpointId) -> DebugResult<Option<Breakpoint>> {
        if !self.state.breakpoints.contains_key(&id) {
            return Ok(None);
        }
        self.expect_deleted(Command::ProcessDeleteBreakpoint { breakpoint_id: id }, id)
            .await?;
        tracing::debug!(target: "bvm.debug", breakpoint_id = id, "breakpoint deleted");
        Ok(self.state.breakpoints.remove(&id))
    }

    pub async fn delete_one_shot_breakpoint(
        &mut self,
        process_id: ProcessId,
        id: BreakpointId,
    ) -> DebugResult<()> {
        tracing::debug!(target: "bvm.debug", breakpoint_id = id, process_id, "deleting unused one-shot breakpoint");
        self.expect_deleted(
            Command::ProcessDeleteOneShotBreakpoint {
                process_id,
                breakpoint_id: id,
            },
            id,
        )
        .await
    }

    async fn expect_deleted(&mut self, command: Command, requested: BreakpointId) -> DebugResult<()> {
        match self.conn.run_command(&command).await? {
            Some(Message::DeleteBreakpointResult { breakpoint_id }) if breakpoint_id == requested => Ok(()),
            Some(Message::DeleteBreakpointResult { breakpoint_id }) => Err(DebugError::BreakpointIdMismatch {
                requested,
                echoed: breakpoint_id,
            }),
            other => Err(unexpected(
                "DeleteBreakpointResult",
                &other.unwrap_or(Message::ConnectionError),
            )),
        }
    }

    /// Ordered by id.
    pub fn list_breakpoints(&self) -> Vec<Breakpoint> {
        self.state.breakpoints.values().cloned().collect()
    }

    fn top_frame(&self) -> DebugResult<BackTraceFrame> {
        self.state.top_frame.clone().ok_or(DebugError::NoProcess)
    }

    fn current_location(&self) -> Option<SourceLocation> {
        self.state.top_frame.as_ref()?.source_location()
    }

    /// Loop condition shared by `step` and `step_over`: still running, still
    /// on the starting source position, and the frame moved since `initial`.
    fn keep_stepping(&self, previous: &Option<SourceLocation>, initial: &BackTraceFrame) -> bool {
        let Some(top) = self.state.top_frame.as_ref() else {
            return false;
        };
        self.running && top.source_location() == *previous && !top.same_position(initial)
    }

    pub async fn step_bytecode(&mut self) -> DebugResult<Message> {
        self.require_running()?;
        self.run_stop_command(Command::ProcessStep).await
    }

    pub async fn step_to(&mut self, function_id: FunctionId, bytecode_index: u32) -> DebugResult<Message> {
        self.require_running()?;
        self.run_stop_command(Command::ProcessStepTo {
            function_id,
            bytecode_index,
        })
        .await
    }

    /// Steps until execution reaches a different source position.
    pub async fn step(&mut self) -> DebugResult<Message> {
        self.require_running()?;
        let initial = self.top_frame()?;
        let previous = initial.source_location();
        loop {
            let top = self.top_frame()?;
            let command = match top.step_target() {
                Some(bytecode_index) => Command::ProcessStepTo {
                    function_id: top.function_id(),
                    bytecode_index,
                },
                None => Command::ProcessStep,
            };
            let stop = self.run_stop_command(command).await?;
            if !self.keep_stepping(&previous, &initial) {
                return Ok(stop);
            }
        }
    }

    /// Like [`Session::step`], but calls are run to completion behind a
    /// one-shot breakpoint at their return address.
    pub async fn step_over(&mut self) -> DebugResult<Message> {
        self.require_running()?;
        let process_id = self.require_live_process()?;
        let initial = self.top_frame()?;
        let previous = initial.source_location();
        loop {
            let (one_shot, stop) = self.run_one_shot_command(Command::ProcessStepOver).await?;
            if !self.settle_one_shot(process_id, one_shot, &stop).await? {
                return Ok(stop);
            }
            if !self.keep_stepping(&previous, &initial) {
                return Ok(stop);
            }
        }
    }

    /// Runs until the current call returns to a visible frame, then steps
    /// past the call site.
    pub async fn step_out(&mut self) -> DebugResult<Message> {
        self.require_running()?;
        let backtrace = self.backtrace().await?;
        if backtrace.visible_len() <= 1 {
            return self.cont().await;
        }
        let return_location = backtrace
            .visible_frame(1)
            .and_then(BackTraceFrame::source_location);
        let process_id = self.require_live_process()?;

        let stop = loop {
            let (one_shot, stop) = self.run_one_shot_command(Command::ProcessStepOut).await?;
            if !self.settle_one_shot(process_id, one_shot, &stop).await? || !self.running {
                return Ok(stop);
            }
            let show_internal = self.state.show_internal_frames;
            let visible = self
                .state
                .top_frame
                .as_ref()
                .is_some_and(|frame| frame.is_visible(show_internal));
            if visible {
                break stop;
            }
        };

        if self.running && self.current_location() == return_location {
            return self.step().await;
        }
        Ok(stop)
    }

    /// Sends a command answered by a one-shot breakpoint acknowledgement and a
    /// stop event. Returns the planted id (or [`NO_BREAKPOINT`]) and the
    /// classified stop.
    async fn run_one_shot_command(&mut self, command: Command) -> DebugResult<(BreakpointId, Message)> {
        let mut responses = self.conn.run_command_responses(&command).await?.into_iter();
        let ack = responses.next().unwrap_or(Message::ConnectionError);
        let stop = responses.next().unwrap_or(Message::ConnectionError);
        let one_shot = match ack {
            Message::SetBreakpointResult { breakpoint_id } => breakpoint_id,
            Message::ConnectionError => NO_BREAKPOINT,
            other => return Err(unexpected("SetBreakpointResult", &other)),
        };
        let stop = self.handle_process_stop(stop).await?;
        Ok((one_shot, stop))
    }

    /// True if `stop` consumed the one-shot breakpoint (or none was planted).
    /// Otherwise something else interrupted the step; the one-shot is
    /// deleted while the process is still around.
    async fn settle_one_shot(
        &mut self,
        process_id: ProcessId,
        one_shot: BreakpointId,
        stop: &Message,
    ) -> DebugResult<bool> {
        if one_shot == NO_BREAKPOINT {
            return Ok(true);
        }
        if matches!(stop, Message::ProcessBreakpoint { breakpoint_id, .. } if *breakpoint_id == one_shot) {
            return Ok(true);
        }
        if self.loaded && !self.terminated {
            self.delete_one_shot_breakpoint(process_id, one_shot).await?;
        }
        Ok(false)
    }

    pub async fn cont(&mut self) -> DebugResult<Message> {
        self.require_running()?;
        self.run_stop_command(Command::ProcessContinue).await
    }

    /// Restarts the selected frame's function from its beginning.
    pub async fn restart(&mut self) -> DebugResult<Message> {
        self.require_running()?;
        let backtrace = self.backtrace().await?;
        if backtrace.len() <= 1 {
            return Err(DebugError::CannotRestart);
        }
        let current = self.state.current_frame;
        let frame = backtrace
            .actual_index(current)
            .and_then(|index| u32::try_from(index).ok())
            .ok_or(DebugError::InvalidFrame(current))?;
        self.run_stop_command(Command::ProcessRestartFrame { frame }).await
    }

    /// The current process's stack, cached until the next stop event.
    pub async fn backtrace(&mut self) -> DebugResult<Arc<BackTrace>> {
        let process_id = self.require_live_process()?;
        if let Some(backtrace) = &self.state.current_backtrace {
            return Ok(backtrace.clone());
        }
        let backtrace = Arc::new(
            self.request_backtrace(Command::ProcessBacktraceRequest { process_id })
                .await?,
        );
        if self.state.top_frame.is_none() {
            self.state.top_frame = backtrace.top_frame().cloned();
        }
        self.state.current_backtrace = Some(backtrace.clone());
        Ok(backtrace)
    }

    async fn request_backtrace(&mut self, command: Command) -> DebugResult<BackTrace> {
        match self.conn.run_command(&command).await? {
            Some(Message::Backtrace {
                function_ids,
                bytecode_indices,
            }) => Ok(BackTrace::from_wire(
                &*self.program,
                &function_ids,
                &bytecode_indices,
                self.state.show_internal_frames,
            )),
            other => Err(unexpected("Backtrace", &other.unwrap_or(Message::ConnectionError))),
        }
    }

    /// One backtrace per fiber of the current process.
    pub async fn fiber_backtraces(&mut self) -> DebugResult<Vec<BackTrace>> {
        self.require_live_process()?;
        let count = match self.conn.run_command(&Command::ProcessFibers).await? {
            Some(Message::NumberOfStacks { count }) => count,
            other => {
                return Err(unexpected(
                    "NumberOfStacks",
                    &other.unwrap_or(Message::ConnectionError),
                ))
            }
        };
        let mut backtraces = Vec::new();
        for fiber in 0..count {
            backtraces.push(
                self.request_backtrace(Command::ProcessFiberBacktraceRequest { fiber })
                    .await?,
            );
        }
        Ok(backtraces)
    }

    pub async fn process_ids(&mut self) -> DebugResult<Vec<ProcessId>> {
        match self.conn.run_command(&Command::ProcessGetProcessIds).await? {
            Some(Message::ProcessIds { ids }) => Ok(ids),
            other => Err(unexpected("ProcessIds", &other.unwrap_or(Message::ConnectionError))),
        }
    }

    pub async fn write_snapshot(&mut self, path: &str) -> DebugResult<bool> {
        let command = Command::WriteSnapshot {
            path: path.to_owned(),
        };
        match self.conn.run_command(&command).await? {
            Some(Message::WriteSnapshotResult { success }) => Ok(success),
            other => Err(unexpected(
                "WriteSnapshotResult",
                &other.unwrap_or(Message::ConnectionError),
            )),
        }
    }

    /// Selects a frame by its index among the visible frames. An invalid
    /// index leaves the selection unchanged.
    pub async fn select_frame(&mut self, frame: usize) -> DebugResult<()> {
        let backtrace = self.backtrace().await?;
        if backtrace.visible_frame(frame).is_none() {
            return Err(DebugError::InvalidFrame(frame));
        }
        self.state.current_frame = frame;
        Ok(())
    }

    pub fn toggle_internal_frames(&mut self) -> bool {
        self.state.toggle_internal_frames()
    }

    pub fn toggle_verbose(&mut self) -> bool {
        self.state.toggle_verbose()
    }

    /// The selected frame with its index in the unfiltered stack.
    async fn selected_frame(&mut self) -> DebugResult<(u32, BackTraceFrame)> {
        let backtrace = self.backtrace().await?;
        let current = self.state.current_frame;
        let actual = backtrace
            .actual_index(current)
            .ok_or(DebugError::InvalidFrame(current))?;
        let frame = backtrace
            .frames()
            .get(actual)
            .cloned()
            .ok_or(DebugError::InvalidFrame(current))?;
        let actual = u32::try_from(actual).map_err(|_| DebugError::InvalidFrame(current))?;
        Ok((actual, frame))
    }

    /// Locals in scope in the selected frame.
    pub async fn scope(&mut self) -> DebugResult<Scope> {
        Ok(self.selected_frame().await?.1.scope())
    }

    async fn local_address(&mut self, name: &str) -> DebugResult<(u32, u32)> {
        let (frame, function_frame) = self.selected_frame().await?;
        let slot = function_frame
            .scope()
            .lookup(name)
            .map(|info| info.slot)
            .ok_or_else(|| DebugError::UnknownLocal(name.to_owned()))?;
        Ok((frame, slot))
    }

    pub async fn read_local(&mut self, name: &str) -> DebugResult<RemoteObject> {
        let (frame, slot) = self.local_address(name).await?;
        match self.conn.run_command(&Command::ProcessLocal { frame, slot }).await? {
            Some(Message::Value(value)) => Ok(RemoteObject::Value(RemoteValue {
                name: Some(name.to_owned()),
                value,
            })),
            other => Err(unexpected("Value", &other.unwrap_or(Message::ConnectionError))),
        }
    }

    /// Reads a local including the fields of an instance.
    pub async fn read_local_structure(&mut self, name: &str) -> DebugResult<RemoteObject> {
        let (frame, slot) = self.local_address(name).await?;
        value::read_structure(
            &mut self.conn,
            &Command::ProcessLocalStructure { frame, slot },
            Some(name.to_owned()),
        )
        .await
    }

    /// Every visible local of the selected frame, in declaration order.
    pub async fn read_all_locals(&mut self) -> DebugResult<Vec<RemoteObject>> {
        let scope = self.scope().await?;
        let names: Vec<String> = scope
            .visible_locals()
            .into_iter()
            .map(|info| info.name.clone())
            .collect();
        let mut locals = Vec::with_capacity(names.len());
        for name in names {
            locals.push(self.read_local(&name).await?);
        }
        Ok(locals)
    }

    /// The exception the process stopped on, cached until the next stop.
    pub async fn uncaught_exception(&mut self) -> DebugResult<RemoteObject> {
        self.require_live_process()?;
        if let Some(exception) = &self.state.current_uncaught_exception {
            return Ok(exception.clone());
        }
        let exception =
            value::read_structure(&mut self.conn, &Command::ProcessUncaughtExceptionRequest, None)
                .await?;
        self.state.current_uncaught_exception = Some(exception.clone());
        Ok(exception)
    }

    pub async fn describe_stop(&mut self, stop: &Message) -> DebugResult<String> {
        match stop {
            Message::UncaughtException { .. } if self.loaded && !self.terminated => {
                let exception = self.uncaught_exception().await?;
                let backtrace = self.backtrace().await?;
                let renderer = self.renderer();
                Ok(format!(
                    "{}\n{}",
                    renderer.exception(&exception),
                    renderer.backtrace(&backtrace, self.state.current_frame, self.state.verbose)
                ))
            }
            Message::ProcessBreakpoint { breakpoint_id, .. } => Ok(self.renderer().stop(
                stop,
                self.state.top_frame.as_ref(),
                self.state.breakpoints.get(breakpoint_id),
            )),
            other => Ok(self.renderer().stop(other, None, None)),
        }
    }

    pub async fn describe_backtrace(&mut self) -> DebugResult<String> {
        let backtrace = self.backtrace().await?;
        Ok(self
            .renderer()
            .backtrace(&backtrace, self.state.current_frame, self.state.verbose))
    }
}
