//! Messages posted onto the debugger host's mailbox.
//!
//! The host owns all state and consumes these one at a time, which is what
//! serializes VM events, timers and external commands.

use crate::brk::Breakpoint;
use crate::host::bus::DebuggerEvent;
use crate::node::EvalResult;
use crate::node::ObjectId;
use crate::node::PropertiesMap;
use crate::node::ScriptLocation;
use crate::prelude::*;
use crate::script::ScriptArc;
use crate::vm::RefType;
use crate::vm::VmEventSet;
use compact_str::CompactString;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;

/// Reply channel for a command.
pub type Reply<T> = oneshot::Sender<T>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Step granularity. Steps are realized with one-shot breakpoints since
/// script lines and JVM lines do not correspond.
pub enum StepKind {
  Into,
  Over,
  Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Which thrown script exceptions pause execution.
pub enum ExceptionPauseMode {
  #[default]
  None,
  Caught,
  Uncaught,
  All,
}

impl ExceptionPauseMode {
  pub fn pauses_caught(&self) -> bool {
    matches!(self, ExceptionPauseMode::Caught | ExceptionPauseMode::All)
  }

  pub fn pauses_uncaught(&self) -> bool {
    matches!(self, ExceptionPauseMode::Uncaught | ExceptionPauseMode::All)
  }
}

#[derive(Debug)]
/// Queue items consumed by the event pump.
pub enum HostMessage {
  /// A set of events read from the target.
  EventSet(VmEventSet),

  /// Re-attempt script registration for a class whose source was not yet
  /// reflectively populated.
  ConsiderReferenceType {
    class: RefType,
    attempts_left: u32,
  },

  /// Quiescence tick for the postponed full initialization.
  PostponeInitialize,

  /// The target went away; the pump shuts down.
  Disconnected,

  /// An external call on the host surface.
  Command(HostCommand),
}

#[derive(Debug)]
/// The host surface, as mailbox messages with reply channels.
pub enum HostCommand {
  Scripts(Reply<Vec<ScriptArc>>),

  ScriptById {
    id: CompactString,
    reply: Reply<Option<ScriptArc>>,
  },

  SetBreakpoint {
    url: String,
    location: ScriptLocation,
    reply: Reply<HostResult<Option<Breakpoint>>>,
  },

  RemoveBreakpoint {
    id: CompactString,
    reply: Reply<HostResult<()>>,
  },

  BreakpointLocations {
    script_id: CompactString,
    from: ScriptLocation,
    to: Option<ScriptLocation>,
    reply: Reply<HostResult<Vec<ScriptLocation>>>,
  },

  Resume(Reply<HostResult<()>>),

  Step {
    kind: StepKind,
    reply: Reply<HostResult<()>>,
  },

  PauseOnBreakpoints(Reply<()>),

  IgnoreBreakpoints(Reply<()>),

  PauseOnExceptions {
    mode: ExceptionPauseMode,
    reply: Reply<HostResult<()>>,
  },

  PauseAtNextStatement(Reply<HostResult<()>>),

  Reset(Reply<HostResult<()>>),

  Evaluate {
    stack_frame_id: CompactString,
    expression: String,
    named_objects: HashMap<String, ObjectId>,
    reply: Reply<HostResult<EvalResult>>,
  },

  ObjectProperties {
    id: ObjectId,
    only_own: bool,
    only_accessors: bool,
    reply: Reply<HostResult<PropertiesMap>>,
  },

  Subscribe(Reply<UnboundedReceiver<DebuggerEvent>>),
}
