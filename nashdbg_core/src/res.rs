//! Results and errors.

use compact_str::CompactString;
use thiserror::Error as ThisError;

// anyhow {

/// [`anyhow::Error`]
pub type AnyErr = anyhow::Error;

/// [`anyhow::Result`] with `T` if ok, [`AnyErr`]([`anyhow::Error`]) if error.
pub type AnyResult<T> = anyhow::Result<T>;

// anyhow }

// std::io {

/// [`std::io::Error`]
pub type IoErr = std::io::Error;

/// [`std::io::ErrorKind`]
pub type IoErrKind = std::io::ErrorKind;

/// [`std::io::Result`] with `T` if ok.
pub type IoResult<T> = std::io::Result<T>;

// std::io }

// Vm {

/// JDWP error code for `INVALID_SLOT`, degraded to per-variable reads.
pub const JDWP_INVALID_SLOT: u16 = 35;

/// JDWP error code for `ABSENT_INFORMATION`.
pub const JDWP_ABSENT_INFORMATION: u16 = 101;

#[derive(Debug, ThisError)]
/// Errors from the attached VM, implemented by [`thiserror::Error`].
pub enum VmErr {
  #[error("JDWP error {0}")]
  Jdwp(u16),

  #[error("malformed JDWP packet: {0}")]
  Protocol(&'static str),

  #[error("exception thrown by invoked method in target VM")]
  InvocationException(crate::vm::ObjectRef),

  #[error("debug target disconnected")]
  Disconnected,

  #[error("engine internals mismatch: {0}")]
  EngineMismatch(String),

  #[error("i/o error: {0}")]
  Io(#[from] IoErr),
}

/// [`std::result::Result`] with `T` if ok, [`VmErr`] if error.
pub type VmResult<T> = std::result::Result<T, VmErr>;

// Vm }

// Host {

#[derive(Debug, ThisError)]
/// Debugger host error code implemented by [`thiserror::Error`].
pub enum HostErr {
  #[error("cannot connect to debug target: {source}. {hint}")]
  Connect {
    source: IoErr,
    hint: &'static str,
  },

  #[error("script source not yet available")]
  SourceUnavailable,

  #[error("evaluation failed: {0}")]
  Evaluation(String),

  #[error("operation requires a paused target")]
  NotPaused,

  #[error("unknown remote object id: {0}")]
  UnknownObject(CompactString),

  #[error("invalid script url: {0}")]
  InvalidScriptUrl(String),

  #[error("unknown stack frame id: {0}")]
  UnknownStackFrame(CompactString),

  #[error("debugger host is gone")]
  HostGone,

  #[error(transparent)]
  Vm(#[from] VmErr),
}

/// [`std::result::Result`] with `T` if ok, [`HostErr`] if error.
pub type HostResult<T> = std::result::Result<T, HostErr>;

/// Hint text attached to connection failures, naming the launch arguments
/// the debug target must carry.
pub const CONNECT_HINT: &str = "Make sure the target JVM is started with \
-agentlib:jdwp=transport=dt_socket,server=y,suspend=n,address=<port>";

// Host }
