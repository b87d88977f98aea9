//! Line-oriented debugger commands, as typed at the `bvm-debug debug` prompt.

use std::fmt::Write as _;

use bvm_wire::BreakpointId;

use crate::error::DebugResult;
use crate::program::ColumnSpec;
use crate::session::Session;

pub const HELP: &str = "\
Commands:
  r                              run the program under the debugger
  b <method> [bytecode-index]    break in every method with that name
  bf <file> <line> [col|text]    break at a source position
  d <id>                         delete a breakpoint
  lb                             list breakpoints
  s / n / o                      step, step over, step out
  sb                             step one bytecode
  c                              continue
  restart                        restart the selected frame
  bt                             backtrace
  f <n>                          select frame
  p [name]                       print a local, or all locals
  p *<name>                      print a local with its fields
  x                              print the uncaught exception
  fibers                         backtraces of every fiber
  t internal | t verbose         toggle display options
  q                              quit";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplCommand {
    Run,
    Break {
        method: String,
        bytecode_index: u32,
    },
    BreakAt {
        file: String,
        line: u32,
        column: ColumnSpec,
    },
    Delete(BreakpointId),
    ListBreakpoints,
    Step,
    StepOver,
    StepOut,
    StepBytecode,
    Continue,
    Restart,
    Backtrace,
    Frame(usize),
    Print(Option<String>),
    PrintStructure(String),
    Exception,
    Fibers,
    ToggleInternal,
    ToggleVerbose,
    Help,
    Quit,
}

impl ReplCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Err("empty command".to_owned());
        };
        let rest: Vec<&str> = words.collect();

        let command = match (head, rest.as_slice()) {
            ("r" | "run", []) => Self::Run,
            ("b" | "break", [method]) => Self::Break {
                method: (*method).to_owned(),
                bytecode_index: 0,
            },
            ("b" | "break", [method, index]) => Self::Break {
                method: (*method).to_owned(),
                bytecode_index: parse_number(index)?,
            },
            ("bf", [file, line]) => Self::BreakAt {
                file: (*file).to_owned(),
                line: parse_number(line)?,
                column: ColumnSpec::Column(1),
            },
            ("bf", [file, line, column @ ..]) => Self::BreakAt {
                file: (*file).to_owned(),
                line: parse_number(line)?,
                column: match column {
                    [single] => match single.parse::<u32>() {
                        Ok(column) => ColumnSpec::Column(column),
                        Err(_) => ColumnSpec::Pattern((*single).to_owned()),
                    },
                    words => ColumnSpec::Pattern(words.join(" ")),
                },
            },
            ("d" | "delete", [id]) => Self::Delete(parse_number(id)?),
            ("lb", []) => Self::ListBreakpoints,
            ("s" | "step", []) => Self::Step,
            ("n" | "next", []) => Self::StepOver,
            ("o" | "finish", []) => Self::StepOut,
            ("sb", []) => Self::StepBytecode,
            ("c" | "cont", []) => Self::Continue,
            ("restart", []) => Self::Restart,
            ("bt", []) => Self::Backtrace,
            ("f" | "frame", [index]) => Self::Frame(parse_number(index)?),
            ("p" | "print", []) => Self::Print(None),
            ("p" | "print", [name]) => match name.strip_prefix('*') {
                Some(name) if !name.is_empty() => Self::PrintStructure(name.to_owned()),
                _ => Self::Print(Some((*name).to_owned())),
            },
            ("x", []) => Self::Exception,
            ("fibers", []) => Self::Fibers,
            ("t", ["internal"]) => Self::ToggleInternal,
            ("t", ["verbose"]) => Self::ToggleVerbose,
            ("h" | "help", []) => Self::Help,
            ("q" | "quit", []) => Self::Quit,
            _ => return Err(format!("unknown command `{}`; type `help`", line.trim())),
        };
        Ok(command)
    }
}

fn parse_number<T: std::str::FromStr>(text: &str) -> Result<T, String> {
    text.parse().map_err(|_| format!("`{text}` is not a valid number"))
}

/// Runs one command against the session and returns the text to show.
pub async fn execute(session: &mut Session, command: &ReplCommand) -> DebugResult<String> {
    let output = match command {
        ReplCommand::Run => {
            let stop = session.debug_run().await?;
            session.describe_stop(&stop).await?
        }
        ReplCommand::Break {
            method,
            bytecode_index,
        } => {
            let breakpoints = session.set_breakpoint_by_name(method, *bytecode_index).await?;
            if breakpoints.is_empty() {
                format!("No method named '{method}'.")
            } else {
                let renderer = session.renderer();
                breakpoints
                    .iter()
                    .map(|breakpoint| format!("Breakpoint set: {}", renderer.breakpoint(breakpoint)))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        ReplCommand::BreakAt { file, line, column } => {
            match session.set_file_breakpoint(file, *line, column).await? {
                Some(breakpoint) => {
                    format!("Breakpoint set: {}", session.renderer().breakpoint(&breakpoint))
                }
                None => format!("No code at {file}:{line}."),
            }
        }
        ReplCommand::Delete(id) => match session.delete_breakpoint(*id).await? {
            Some(breakpoint) => {
                format!("Deleted breakpoint {}", session.renderer().breakpoint(&breakpoint))
            }
            None => format!("No breakpoint with id {id}."),
        },
        ReplCommand::ListBreakpoints => {
            let breakpoints = session.list_breakpoints();
            if breakpoints.is_empty() {
                "No breakpoints.".to_owned()
            } else {
                let renderer = session.renderer();
                breakpoints
                    .iter()
                    .map(|breakpoint| renderer.breakpoint(breakpoint))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        ReplCommand::Step => {
            let stop = session.step().await?;
            session.describe_stop(&stop).await?
        }
        ReplCommand::StepOver => {
            let stop = session.step_over().await?;
            session.describe_stop(&stop).await?
        }
        ReplCommand::StepOut => {
            let stop = session.step_out().await?;
            session.describe_stop(&stop).await?
        }
        ReplCommand::StepBytecode => {
            let stop = session.step_bytecode().await?;
            session.describe_stop(&stop).await?
        }
        ReplCommand::Continue => {
            let stop = session.cont().await?;
            session.describe_stop(&stop).await?
        }
        ReplCommand::Restart => {
            let stop = session.restart().await?;
            session.describe_stop(&stop).await?
        }
        ReplCommand::Backtrace => session.describe_backtrace().await?,
        ReplCommand::Frame(index) => {
            session.select_frame(*index).await?;
            session.describe_backtrace().await?
        }
        ReplCommand::Print(Some(name)) => {
            let local = session.read_local(name).await?;
            session.renderer().object(&local)
        }
        ReplCommand::Print(None) => {
            let locals = session.read_all_locals().await?;
            let renderer = session.renderer();
            locals
                .iter()
                .map(|local| renderer.object(local))
                .collect::<Vec<_>>()
                .join("\n")
        }
        ReplCommand::PrintStructure(name) => {
            let local = session.read_local_structure(name).await?;
            session.renderer().object(&local)
        }
        ReplCommand::Exception => {
            let exception = session.uncaught_exception().await?;
            session.renderer().exception(&exception)
        }
        ReplCommand::Fibers => {
            let fibers = session.fiber_backtraces().await?;
            let renderer = session.renderer();
            let verbose = session.state().verbose;
            let mut out = String::new();
            for (index, backtrace) in fibers.iter().enumerate() {
                let _ = writeln!(out, "fiber {index}");
                out.push_str(&renderer.backtrace(backtrace, usize::MAX, verbose));
            }
            out
        }
        ReplCommand::ToggleInternal => {
            let shown = session.toggle_internal_frames();
            format!("Internal frames {}.", if shown { "shown" } else { "hidden" })
        }
        ReplCommand::ToggleVerbose => {
            let verbose = session.toggle_verbose();
            format!("Verbose {}.", if verbose { "on" } else { "off" })
        }
        ReplCommand::Help => HELP.to_owned(),
        ReplCommand::Quit => {
            session.end_session().await?;
            String::new()
        }
    };
    Ok(output)
}
