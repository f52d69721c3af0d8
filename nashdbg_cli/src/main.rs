//! The `nashdbg` command line: attaches to a debug target and relays
//! debugger events until the target goes away.

use clap::Parser;
use nashdbg_core::cli::CliOptions;
use nashdbg_core::consts::NASHDBG_LOG;
use nashdbg_core::host::DebuggerHost;
use nashdbg_core::host::bus::DebuggerEvent;
use nashdbg_core::vm::jdwp_vm::JdwpVm;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// File logging, controlled by the `NASHDBG_LOG` environment variable.
fn init_logging() -> tracing_appender::non_blocking::WorkerGuard {
  let appender = tracing_appender::rolling::daily(".", "nashdbg.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  let filter = EnvFilter::try_from_env(NASHDBG_LOG)
    .unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();
  guard
}

#[tokio::main]
async fn main() -> ExitCode {
  let options = CliOptions::parse();
  let _log_guard = init_logging();

  let (host, port) = match options.target() {
    Ok(target) => target,
    Err(err) => {
      eprintln!("nashdbg: {err}");
      return ExitCode::from(1);
    }
  };

  let vm = match JdwpVm::connect(&host, port).await {
    Ok(vm) => vm,
    Err(err) => {
      eprintln!("nashdbg: {err}");
      return ExitCode::from(1);
    }
  };
  info!(%host, port, "attached");

  let handle = DebuggerHost::spawn(Arc::new(vm));
  let Ok(mut events) = handle.events().await else {
    eprintln!("nashdbg: debugger host went away before subscription");
    return ExitCode::from(2);
  };

  while let Some(event) = events.recv().await {
    match event {
      DebuggerEvent::InitialInitializationComplete => {
        println!("target ready");
      }
      DebuggerEvent::ScriptAdded(script) => {
        println!("script #{} {}", script.id(), script.url());
      }
      DebuggerEvent::HitBreakpoint(frames) => {
        match frames.first() {
          Some(top) => println!(
            "paused in {} at {}:{}",
            top.function_name,
            top.script_id,
            top.location.line
          ),
          None => println!("paused"),
        }
      }
      DebuggerEvent::Resumed => println!("resumed"),
      DebuggerEvent::UncaughtError(error) => {
        println!("uncaught {}: {}", error.name, error.message);
      }
    }
  }

  // Stream completion means the target disconnected; that is a normal
  // end of session.
  info!("target disconnected");
  ExitCode::SUCCESS
}
