//! Event bus: serialized fan-out of debugger events to subscribers.

use crate::node::ErrorValue;
use crate::node::StackFrameView;
use crate::script::ScriptArc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::mpsc::unbounded_channel;
use tracing::trace;

#[derive(Debug, Clone)]
/// Events published to the protocol layer. Delivery order matches the
/// order things happened in the target; `InitialInitializationComplete`
/// precedes the first `HitBreakpoint`, and every `HitBreakpoint` precedes
/// the `Resumed` it pairs with.
pub enum DebuggerEvent {
  ScriptAdded(ScriptArc),
  HitBreakpoint(Vec<StackFrameView>),
  Resumed,
  UncaughtError(ErrorValue),
  InitialInitializationComplete,
}

#[derive(Debug, Default)]
/// Subscribers live as long as their receiver; dropping all senders
/// completes every stream (VM disconnect).
pub struct EventBus {
  subscribers: Vec<UnboundedSender<DebuggerEvent>>,
  initialized: bool,
}

impl EventBus {
  pub fn new() -> Self {
    Self::default()
  }

  /// Subscribes. A subscriber arriving after initialization still
  /// observes a synthetic `InitialInitializationComplete` before any live
  /// event.
  pub fn subscribe(&mut self) -> UnboundedReceiver<DebuggerEvent> {
    let (tx, rx) = unbounded_channel();
    if self.initialized {
      let _ = tx.send(DebuggerEvent::InitialInitializationComplete);
    }
    self.subscribers.push(tx);
    rx
  }

  pub fn emit(&mut self, event: DebuggerEvent) {
    if matches!(event, DebuggerEvent::InitialInitializationComplete) {
      self.initialized = true;
    }
    trace!(?event, "emit debugger event");
    self
      .subscribers
      .retain(|tx| tx.send(event.clone()).is_ok());
  }

  /// Ends all subscriber streams.
  pub fn complete(&mut self) {
    self.subscribers.clear();
  }
}
