use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use bvm_debug::program::StaticProgram;
use bvm_debug::repl::{self, ReplCommand};
use bvm_debug::{DebugConfig, Session};
use bvm_wire::OutputSinks;

/// Runs or debugs a program on a bytecode VM reachable over TCP.
#[derive(Debug, Parser)]
#[command(name = "bvm-debug", version, about)]
struct Cli {
    /// Path to a TOML config file. Falls back to `BVM_DEBUG_CONFIG`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Omit numeric ids from printed output.
    #[arg(long, global = true)]
    hide_raw_ids: bool,

    #[arg(long, global = true)]
    no_colors: bool,

    /// Suppress the program's standard output.
    #[arg(long, global = true)]
    silent: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Run the program to completion.
    Run(Target),
    /// Start an interactive debugging session.
    Debug(Target),
}

#[derive(Debug, Args)]
struct Target {
    /// VM address, e.g. `127.0.0.1:4567`.
    #[arg(long)]
    connect: String,

    /// JSON symbol table exported by the compiler.
    #[arg(long)]
    program: PathBuf,

    /// Version string sent in the handshake.
    #[arg(long, default_value = env!("CARGO_PKG_VERSION"))]
    vm_version: String,

    /// Arguments passed to the program's `main`.
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config);
    config.session.hide_raw_ids |= cli.hide_raw_ids;
    config.session.colors_disabled |= cli.no_colors;
    config.session.silent |= cli.silent;
    bvm_debug::config::init_tracing(&config.logging);

    let (target, interactive) = match cli.mode {
        Mode::Run(target) => (target, false),
        Mode::Debug(target) => (target, true),
    };

    let program = StaticProgram::load_from_path(&target.program)
        .with_context(|| format!("loading symbols from {}", target.program.display()))?;
    let mut session = Session::connect(
        target.connect.as_str(),
        OutputSinks::stdio(),
        Arc::new(program),
        config.session,
    )
    .await
    .with_context(|| format!("connecting to {}", target.connect))?;

    let (accepted, vm_version) = session.handshake(&target.vm_version).await?;
    if !accepted {
        session.kill();
        bail!(
            "virtual machine version {vm_version} does not match {}",
            target.vm_version
        );
    }

    if interactive {
        session.enable_debugging().await?;
        session.spawn_process(target.args).await?;
        debug_loop(&mut session).await?;
    } else {
        session.spawn_process(target.args).await?;
        if let Some(stop) = session.run().await? {
            if !matches!(stop, bvm_wire::Message::ProcessTerminated) {
                println!("{}", session.describe_stop(&stop).await?);
            }
        }
    }

    session.end_session().await?;
    Ok(())
}

async fn debug_loop(session: &mut Session) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if session.is_terminated() {
            return Ok(());
        }
        print!("(bvm) ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }
        let command = match ReplCommand::parse(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        match repl::execute(session, &command).await {
            Ok(output) if !output.is_empty() => println!("{output}"),
            Ok(_) => {}
            Err(err) => println!("error: {err}"),
        }
        if command == ReplCommand::Quit {
            return Ok(());
        }
    }
}

fn load_config(cli_path: Option<PathBuf>) -> DebugConfig {
    let path = cli_path.or_else(|| std::env::var_os("BVM_DEBUG_CONFIG").map(PathBuf::from));
    let Some(path) = path else {
        return DebugConfig::default();
    };

    match DebugConfig::load_from_path(&path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!(
                "bvm-debug: failed to load config from {}: {err}; continuing with defaults",
                path.display()
            );
            DebugConfig::default()
        }
    }
}
