use crate::{
    channel::MessageChannel,
    message::{Command, Message},
    types::{Result, WireError},
};

/// Strictly sequential command/response cursor over a [`MessageChannel`].
///
/// Every command is followed by exactly the number of responses it declares;
/// no other command is sent until those have been consumed.
pub struct VmConnection {
    channel: MessageChannel,
    drained: bool,
}

impl VmConnection {
    pub fn new(channel: MessageChannel) -> Self {
        Self {
            channel,
            drained: false,
        }
    }

    pub fn channel(&self) -> &MessageChannel {
        &self.channel
    }

    pub fn is_alive(&self) -> bool {
        self.channel.is_alive()
    }

    pub async fn send_command(&mut self, command: &Command) -> Result<()> {
        if !self.channel.is_alive() {
            return Err(WireError::ConnectionClosed);
        }
        tracing::trace!(target: "bvm.wire", command = command.name(), "sending");
        self.channel.send(&command.encode()).await
    }

    /// Pulls the next message. Once the incoming side is drained this yields
    /// [`Message::ConnectionError`] when `force` is set and `None` otherwise.
    pub async fn read_next(&mut self, force: bool) -> Option<Message> {
        if !self.drained {
            match self.channel.next_message().await {
                Some(message) => return Some(message),
                None => self.drained = true,
            }
        }
        force.then_some(Message::ConnectionError)
    }

    async fn read_forced(&mut self) -> Message {
        self.read_next(true)
            .await
            .unwrap_or(Message::ConnectionError)
    }

    /// Sends `command` and returns every response it declares, in order.
    pub async fn run_command_responses(&mut self, command: &Command) -> Result<Vec<Message>> {
        let count = command
            .expected_responses()
            .ok_or(WireError::UnknownResponseCount(command.name()))?;
        self.send_command(command).await?;
        let mut responses = Vec::with_capacity(count);
        for _ in 0..count {
            responses.push(self.read_forced().await);
        }
        Ok(responses)
    }

    /// Sends `command`, reads its declared responses, returns the last one.
    pub async fn run_command(&mut self, command: &Command) -> Result<Option<Message>> {
        self.run_commands(std::slice::from_ref(command)).await
    }

    /// Runs `commands` in order and returns the last message read overall.
    ///
    /// Commands without a declared response count are rejected before anything
    /// is sent.
    pub async fn run_commands(&mut self, commands: &[Command]) -> Result<Option<Message>> {
        if let Some(command) = commands.iter().find(|c| c.expected_responses().is_none()) {
            return Err(WireError::UnknownResponseCount(command.name()));
        }

        let mut last = None;
        for command in commands {
            let count = command.expected_responses().unwrap_or_default();
            self.send_command(command).await?;
            for _ in 0..count {
                last = Some(self.read_forced().await);
            }
        }
        Ok(last)
    }

    /// Closes the outgoing side and drains the incoming side until the peer
    /// closes. Unless `ignore_extra_messages` is set, any message arriving
    /// while draining is a protocol violation that kills the connection.
    pub async fn shutdown(&mut self, ignore_extra_messages: bool) -> Result<()> {
        if let Err(err) = self.channel.close_outgoing().await {
            tracing::warn!(target: "bvm.wire", error = %err, "failed to close outgoing side");
        }

        while let Some(message) = self.read_next(false).await {
            if ignore_extra_messages {
                tracing::debug!(target: "bvm.wire", message = message.name(), "ignoring message during shutdown");
                continue;
            }
            tracing::error!(target: "bvm.wire", message = message.name(), "unexpected message during shutdown");
            self.kill();
            return Err(WireError::UnexpectedDataDuringShutdown(message.name()));
        }

        self.channel.closed().await;
        Ok(())
    }

    /// Unconditionally tears the connection down. Never fails.
    pub fn kill(&mut self) {
        self.drained = true;
        self.channel.kill();
    }
}
