use bvm_wire::{ClassId, Command, Message, VmConnection, WireError, WireValue};

use crate::error::{DebugError, DebugResult};

#[derive(Clone, Debug, PartialEq)]
pub struct RemoteValue {
    pub name: Option<String>,
    pub value: WireValue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RemoteInstance {
    pub name: Option<String>,
    pub class_id: ClassId,
    /// In the class's field declaration order.
    pub fields: Vec<RemoteObject>,
}

/// A value read back from the VM: either a primitive (or opaque reference),
/// or an instance with its fields.
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteObject {
    Value(RemoteValue),
    Instance(RemoteInstance),
}

impl RemoteObject {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Value(value) => value.name.as_deref(),
            Self::Instance(instance) => instance.name.as_deref(),
        }
    }
}

/// Sends a structure read and decodes its variable-length answer: either a
/// single `Value`, or an `InstanceStructure` header followed by exactly
/// `fields` `Value` messages. Nothing else may be sent until this returns.
pub(crate) async fn read_structure(
    conn: &mut VmConnection,
    command: &Command,
    name: Option<String>,
) -> DebugResult<RemoteObject> {
    conn.send_command(command).await?;
    match next(conn).await? {
        Message::Value(value) => Ok(RemoteObject::Value(RemoteValue { name, value })),
        Message::InstanceStructure { class_id, fields } => {
            tracing::trace!(target: "bvm.debug", class_id, fields, "reading instance fields");
            // `fields` comes from the peer; grow as values actually arrive.
            let mut values = Vec::new();
            let mut mismatch = None;
            for _ in 0..fields {
                match next(conn).await? {
                    Message::Value(value) => {
                        values.push(RemoteObject::Value(RemoteValue { name: None, value }))
                    }
                    // Keep consuming so the next command starts on its own reply.
                    other => {
                        if mismatch.is_none() {
                            mismatch = Some(unexpected("Value", &other));
                        }
                    }
                }
            }
            if let Some(err) = mismatch {
                return Err(err);
            }
            Ok(RemoteObject::Instance(RemoteInstance {
                name,
                class_id,
                fields: values,
            }))
        }
        other => Err(unexpected("Value or InstanceStructure", &other)),
    }
}

async fn next(conn: &mut VmConnection) -> DebugResult<Message> {
    match conn.read_next(true).await {
        Some(Message::ConnectionError) | None => Err(WireError::ConnectionClosed.into()),
        Some(message) => Ok(message),
    }
}

pub(crate) fn unexpected(expected: &'static str, actual: &Message) -> DebugError {
    tracing::error!(target: "bvm.debug", expected, actual = actual.name(), "unexpected response");
    DebugError::UnexpectedResponse {
        expected,
        actual: actual.name(),
    }
}
