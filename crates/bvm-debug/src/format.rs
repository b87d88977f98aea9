//! Human-readable text for values, exceptions, stack traces and stop events.

use std::fmt::Write as _;

use bvm_wire::{ClassId, Message, WireValue};

use crate::backtrace::{BackTrace, BackTraceFrame, FunctionRef};
use crate::config::SessionConfig;
use crate::program::{FunctionInfo, Program, Selector, SelectorKind};
use crate::state::Breakpoint;
use crate::value::{RemoteInstance, RemoteObject};

/// Printed in place of any value whose class id the program does not know.
pub const CLASS_NOT_FOUND: &str = "Class not found";

/// Class the VM raises for failed dynamic dispatch.
pub const NO_SUCH_METHOD_ERROR: &str = "NoSuchMethodError";

const BOLD: &str = "\x1b[1m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

pub struct Renderer<'a> {
    program: &'a dyn Program,
    config: &'a SessionConfig,
}

impl<'a> Renderer<'a> {
    pub fn new(program: &'a dyn Program, config: &'a SessionConfig) -> Self {
        Self { program, config }
    }

    fn paint(&self, style: &str, text: &str) -> String {
        if self.config.colors_disabled {
            text.to_owned()
        } else {
            format!("{style}{text}{RESET}")
        }
    }

    fn class_name(&self, class_id: ClassId) -> Option<&'a str> {
        self.program.class(class_id).map(|class| class.name.as_str())
    }

    pub fn function_name(&self, function: &FunctionRef) -> String {
        match function.info() {
            Some(info) => self.qualified_name(info),
            None => FunctionRef::MISSING_NAME.to_owned(),
        }
    }

    /// `Class.name` for methods, the bare name otherwise.
    pub fn qualified_name(&self, function: &FunctionInfo) -> String {
        match function.class.and_then(|class| self.class_name(class)) {
            Some(class) => format!("{class}.{}", function.name),
            None => function.name.clone(),
        }
    }

    pub fn value(&self, value: &WireValue) -> String {
        match value {
            WireValue::Null => "null".to_owned(),
            WireValue::Boolean(b) => b.to_string(),
            WireValue::Integer(i) => i.to_string(),
            WireValue::Double(d) => format!("{d:?}"),
            WireValue::String(s) => format!("'{s}'"),
            WireValue::Instance { class_id } => match self.class_name(*class_id) {
                Some(name) => format!("instance of {name}"),
                None => CLASS_NOT_FOUND.to_owned(),
            },
            WireValue::Class { class_id } => match self.class_name(*class_id) {
                Some(name) => format!("class {name}"),
                None => CLASS_NOT_FOUND.to_owned(),
            },
        }
    }

    pub fn object(&self, object: &RemoteObject) -> String {
        match object {
            RemoteObject::Value(value) => match &value.name {
                Some(name) => format!("{name}: {}", self.value(&value.value)),
                None => self.value(&value.value),
            },
            RemoteObject::Instance(instance) => self.instance(instance),
        }
    }

    fn instance(&self, instance: &RemoteInstance) -> String {
        let Some(class) = self.program.class(instance.class_id) else {
            return CLASS_NOT_FOUND.to_owned();
        };

        let mut out = String::new();
        if let Some(name) = &instance.name {
            let _ = write!(out, "{name}: ");
        }
        let _ = write!(out, "Instance of '{}'", class.name);
        if instance.fields.is_empty() {
            return out;
        }
        out.push_str(" {");
        for (index, field) in instance.fields.iter().enumerate() {
            let field_name = class
                .fields
                .get(index)
                .cloned()
                .unwrap_or_else(|| format!("field{index}"));
            let _ = write!(out, "\n  {field_name}: {}", self.object(field));
        }
        out.push_str("\n}");
        out
    }

    pub fn exception(&self, exception: &RemoteObject) -> String {
        let body = match exception {
            RemoteObject::Value(value) => self.value(&value.value),
            RemoteObject::Instance(instance) => {
                let Some(class) = self.program.class(instance.class_id) else {
                    return CLASS_NOT_FOUND.to_owned();
                };
                let no_such_method = (class.name == NO_SUCH_METHOD_ERROR)
                    .then(|| self.no_such_method(instance))
                    .flatten();
                match no_such_method {
                    Some(text) => text,
                    None => self.instance(instance),
                }
            }
        };
        format!("{} {body}", self.paint(RED, "Uncaught exception:"))
    }

    /// Formats the VM's `NoSuchMethodError(receiver, receiverClass, selector)`.
    /// Returns `None` when the fields do not have that shape.
    fn no_such_method(&self, error: &RemoteInstance) -> Option<String> {
        let [RemoteObject::Value(receiver), RemoteObject::Value(receiver_class), RemoteObject::Value(selector)] =
            error.fields.as_slice()
        else {
            return None;
        };
        let WireValue::Integer(encoded) = selector.value else {
            return None;
        };
        let selector = Selector::decode(encoded)?;

        // The declared receiver class wins; the receiver's own class is the
        // fallback when the declared one is unknown.
        let class = receiver_class
            .value
            .class_id()
            .and_then(|id| self.class_name(id))
            .or_else(|| receiver.value.class_id().and_then(|id| self.class_name(id)))
            .unwrap_or(CLASS_NOT_FOUND);
        let name = match self.program.selector_name(selector.id) {
            Some(name) => name.to_owned(),
            None => format!("#{}", selector.id),
        };

        let text = match selector.kind {
            SelectorKind::Method => {
                let noun = if selector.arity == 1 { "argument" } else { "arguments" };
                format!(
                    "{NO_SUCH_METHOD_ERROR}: Class '{class}' has no method named '{name}' that takes {} {noun}",
                    selector.arity
                )
            }
            SelectorKind::Getter => {
                format!("{NO_SUCH_METHOD_ERROR}: Class '{class}' has no getter named '{name}'")
            }
            SelectorKind::Setter => {
                format!("{NO_SUCH_METHOD_ERROR}: Class '{class}' has no setter named '{name}'")
            }
        };
        Some(text)
    }

    fn frame_summary(&self, frame: &BackTraceFrame) -> String {
        let mut out = self.function_name(&frame.function);
        if !self.config.hide_raw_ids {
            let _ = write!(out, " @{}", frame.bytecode_index);
        }
        out
    }

    /// One line per visible frame; the selected frame is starred.
    pub fn backtrace(&self, backtrace: &BackTrace, current_frame: usize, verbose: bool) -> String {
        let mut out = String::new();
        for (index, frame) in backtrace.visible_frames().enumerate() {
            let marker = if index == current_frame {
                self.paint(BOLD, "*")
            } else {
                " ".to_owned()
            };
            let _ = write!(out, "{marker}{index}: {}", self.frame_summary(frame));
            if verbose {
                if let Some(location) = frame.source_location() {
                    let _ = write!(out, " ({location})");
                }
            }
            out.push('\n');
        }
        out
    }

    pub fn breakpoint(&self, breakpoint: &Breakpoint) -> String {
        if self.config.hide_raw_ids {
            format!("{}: {}", breakpoint.id, breakpoint.function_name)
        } else {
            breakpoint.to_string()
        }
    }

    /// Text for a stop event. Uncaught exceptions only get a header here; the
    /// exception value needs a follow-up read.
    pub fn stop(
        &self,
        stop: &Message,
        top_frame: Option<&BackTraceFrame>,
        breakpoint: Option<&Breakpoint>,
    ) -> String {
        match stop {
            Message::ProcessBreakpoint { .. } => {
                let mut out = match (breakpoint, self.config.hide_raw_ids) {
                    (Some(_), true) => "Breakpoint hit: ".to_owned(),
                    (Some(breakpoint), false) => format!("Breakpoint {} hit: ", breakpoint.id),
                    (None, _) => "Paused at ".to_owned(),
                };
                if let Some(frame) = top_frame {
                    out.push_str(&self.frame_summary(frame));
                    if let Some(location) = frame.source_location() {
                        let _ = write!(out, " ({location})");
                    }
                }
                out
            }
            Message::UncaughtException { .. } => self.paint(RED, "Uncaught exception."),
            Message::ProcessCompileTimeError => self.paint(RED, "Compile-time error."),
            Message::ProcessTerminated => "Process terminated.".to_owned(),
            Message::ConnectionError => "Lost connection to the virtual machine.".to_owned(),
            other => format!("Stopped: {}", other.name()),
        }
    }
}
