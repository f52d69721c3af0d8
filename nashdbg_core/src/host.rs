//! The debugger host: event pump, pause state machine and the command
//! surface consumed by the protocol layer.
//!
//! One task owns all host state and drains a mailbox of VM events, timers
//! and commands ([`msg::HostMessage`]), so every handler runs to
//! completion before the next item starts. External callers go through
//! [`HostHandle`], which posts commands and awaits their reply.

pub mod bus;
pub mod eval;
pub mod marshal;
pub mod msg;
pub mod pause;
pub mod props;

#[cfg(test)]
mod eval_tests;
#[cfg(test)]
mod pump_tests;

use crate::brk::Breakpoint;
use crate::brk::BreakableLocations;
use crate::consts::*;
use crate::host::bus::DebuggerEvent;
use crate::host::bus::EventBus;
use crate::host::marshal::ObjectRegistry;
use crate::host::msg::*;
use crate::host::pause::HitKind;
use crate::host::pause::PausedData;
use crate::node::EvalResult;
use crate::node::ObjectId;
use crate::node::PropertiesMap;
use crate::node::ScriptLocation;
use crate::prelude::*;
use crate::script::ScriptArc;
use crate::script::registry::Registered;
use crate::script::registry::ScriptRegistry;
use crate::script::registry::eval_url_for_class;
use crate::script::url::ScriptUrl;
use crate::vm::ClassId;
use crate::vm::RefType;
use crate::vm::RequestHandle;
use crate::vm::Vm;
use crate::vm::VmEvent;
use crate::vm::VmEventSet;
use crate::vm::VmLocation;
use crate::vm::VmValue;
use crate::vm::nashorn;
use compact_str::CompactString;
use compact_str::ToCompactString;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::mpsc::unbounded_channel;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

/// The debugger host. Owns every piece of session state; lives on one
/// task for exactly one attached target.
pub struct DebuggerHost<V: Vm> {
  pub(crate) vm: Arc<V>,
  pub(crate) tx: UnboundedSender<HostMessage>,
  rx: UnboundedReceiver<HostMessage>,
  pub(crate) bus: EventBus,
  pub(crate) scripts: ScriptRegistry,
  pub(crate) locations: BreakableLocations,
  /// Infrastructure classes captured for later method invocation.
  pub(crate) wanted: HashMap<String, ClassId>,
  pub(crate) initialized: bool,
  /// Defaults to off so the built-in `debugger` trap cannot fire before a
  /// client attaches.
  pub(crate) will_pause: bool,
  pub(crate) exception_mode: ExceptionPauseMode,
  pub(crate) exception_request: Option<RequestHandle>,
  pub(crate) debugger_trap: Option<RequestHandle>,
  pub(crate) pause_at_next: Vec<RequestHandle>,
  pub(crate) paused: Option<PausedData>,
  pub(crate) objects: ObjectRegistry,
  pub(crate) breakpoint_seq: u64,
  class_prepares_seen: u64,
  prepares_at_last_tick: Option<u64>,
  /// Script classes whose `source` field is still unpopulated, with the
  /// number of retries left for each.
  awaiting_source: HashMap<u64, (RefType, u32)>,
  registered_classes: HashSet<u64>,
  pub(crate) cancel: CancellationToken,
  /// Reader and timer tasks; drained before the host finishes.
  tracker: TaskTracker,
}

#[derive(Debug, Clone)]
/// Cloneable external handle onto the host mailbox.
pub struct HostHandle {
  tx: UnboundedSender<HostMessage>,
}

impl<V: Vm> DebuggerHost<V> {
  pub fn new(vm: Arc<V>) -> (Self, HostHandle) {
    let (tx, rx) = unbounded_channel();
    let host = Self {
      vm,
      tx: tx.clone(),
      rx,
      bus: EventBus::new(),
      scripts: ScriptRegistry::new(),
      locations: BreakableLocations::new(),
      wanted: HashMap::new(),
      initialized: false,
      will_pause: false,
      exception_mode: ExceptionPauseMode::None,
      exception_request: None,
      debugger_trap: None,
      pause_at_next: Vec::new(),
      paused: None,
      objects: ObjectRegistry::new(),
      breakpoint_seq: 0,
      class_prepares_seen: 0,
      prepares_at_last_tick: None,
      awaiting_source: HashMap::new(),
      registered_classes: HashSet::new(),
      cancel: CancellationToken::new(),
      tracker: TaskTracker::new(),
    };
    (host, HostHandle { tx })
  }

  /// Creates a host for `vm` and runs it on its own task.
  pub fn spawn(vm: Arc<V>) -> HostHandle {
    let (host, handle) = Self::new(vm);
    tokio::spawn(host.run());
    handle
  }

  /// The pump. Returns when the target disconnects or the host is
  /// cancelled; all subscriber streams complete then.
  pub async fn run(mut self) {
    self.boot();
    loop {
      tokio::select! {
        message = self.rx.recv() => {
          match message {
            Some(message) => {
              if self.process_message(message).await.is_break() {
                break;
              }
            }
            None => break,
          }
        }
        _ = self.cancel.cancelled() => break,
      }
    }
    self.cancel.cancel();
    self.tracker.close();
    self.tracker.wait().await;
    self.bus.complete();
    debug!("debugger host finished");
  }

  fn boot(&mut self) {
    // Reader task: forwards VM event sets into the mailbox and signals
    // disconnection when the stream dries up.
    let vm = self.vm.clone();
    let tx = self.tx.clone();
    let cancel = self.cancel.clone();
    self.tracker.spawn(async move {
      loop {
        tokio::select! {
          set = vm.next_event_set() => {
            match set {
              Some(set) => {
                if tx.send(HostMessage::EventSet(set)).is_err() {
                  break;
                }
              }
              None => {
                let _ = tx.send(HostMessage::Disconnected);
                break;
              }
            }
          }
          _ = cancel.cancelled() => break,
        }
      }
    });

    let vm = self.vm.clone();
    self.tracker.spawn(async move {
      if let Err(err) = vm.set_class_prepare_request().await {
        warn!("cannot observe class loading: {err}");
      }
    });

    self.schedule_postpone_initialize();
  }

  /// Posts a message back into the mailbox after a delay, giving up when
  /// the host shuts down first.
  fn schedule(&self, delay_ms: u64, message: HostMessage) {
    let tx = self.tx.clone();
    let cancel = self.cancel.clone();
    self.tracker.spawn(async move {
      tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
          let _ = tx.send(message);
        }
        _ = cancel.cancelled() => {}
      }
    });
  }

  fn schedule_postpone_initialize(&self) {
    self.schedule(POSTPONE_INITIALIZE_MS, HostMessage::PostponeInitialize);
  }

  fn schedule_consider(&self, class: RefType, attempts_left: u32) {
    self.schedule(
      SCRIPT_RESOLVE_RETRY_MS,
      HostMessage::ConsiderReferenceType {
        class,
        attempts_left,
      },
    );
  }

  async fn process_message(
    &mut self,
    message: HostMessage,
  ) -> ControlFlow<()> {
    match message {
      HostMessage::EventSet(set) => self.handle_event_set(set).await,
      HostMessage::ConsiderReferenceType {
        class,
        attempts_left,
      } => {
        self.consider_reference_type(class, attempts_left).await;
        ControlFlow::Continue(())
      }
      HostMessage::PostponeInitialize => {
        self.postpone_initialize_tick().await;
        ControlFlow::Continue(())
      }
      HostMessage::Disconnected => {
        info!("debug target disconnected");
        ControlFlow::Break(())
      }
      HostMessage::Command(command) => {
        self.handle_command(command).await;
        ControlFlow::Continue(())
      }
    }
  }

  async fn postpone_initialize_tick(&mut self) {
    if self.initialized {
      return;
    }
    if self.prepares_at_last_tick == Some(self.class_prepares_seen) {
      self.initialize().await;
    } else {
      // Classes are still streaming in; check again once loading
      // quiesces. This can go on for as long as the target keeps
      // loading.
      info!(
        prepares = self.class_prepares_seen,
        "classes still preparing, postponing initialization"
      );
      self.prepares_at_last_tick = Some(self.class_prepares_seen);
      self.schedule_postpone_initialize();
    }
  }

  async fn initialize(&mut self) {
    let vm = self.vm.clone();
    match vm.all_classes().await {
      Ok(classes) => {
        for class in classes {
          self
            .consider_reference_type(class, INITIAL_SCRIPT_RESOLVE_ATTEMPTS)
            .await;
        }
      }
      Err(err) => warn!("cannot enumerate loaded classes: {err}"),
    }

    // Fixed breakpoint realizing the JavaScript `debugger` statement.
    if let Some(&runtime) = self.wanted.get(nashorn::SCRIPT_RUNTIME) {
      match vm
        .method_location(runtime, nashorn::DEBUGGER_METHOD)
        .await
      {
        Ok(Some(location)) => match vm.set_breakpoint_request(&location).await
        {
          Ok(handle) => self.debugger_trap = Some(handle),
          Err(err) => warn!("cannot trap debugger statements: {err}"),
        },
        Ok(None) => warn!("ScriptRuntime.DEBUGGER not present in target"),
        Err(err) => warn!("cannot locate ScriptRuntime.DEBUGGER: {err}"),
      }
    } else {
      warn!("ScriptRuntime not seen among loaded classes");
    }

    self.initialized = true;
    info!(
      scripts = self.scripts.scripts().len(),
      "initial initialization complete"
    );
    self.bus.emit(DebuggerEvent::InitialInitializationComplete);
  }

  async fn handle_event_set(&mut self, set: VmEventSet) -> ControlFlow<()> {
    if set
      .events
      .iter()
      .any(|event| matches!(event, VmEvent::VmDeath))
    {
      info!("target VM died");
      return ControlFlow::Break(());
    }

    if self.paused.is_some() {
      // One debug session at a time; a set arriving mid-pause is let go.
      if let Err(err) = self.vm.resume_event_set(&set).await {
        warn!("cannot resume ignored event set: {err}");
      }
      return ControlFlow::Continue(());
    }

    // The engine often populates the reflective `source` field between
    // class-prepare and the first hit; retry stragglers before handling
    // anything that pauses.
    let pauseworthy = set.events.iter().any(|event| {
      matches!(
        event,
        VmEvent::Breakpoint { .. }
          | VmEvent::Exception { .. }
          | VmEvent::MethodEntry { .. }
          | VmEvent::MethodExit { .. }
      )
    });
    if pauseworthy && !self.awaiting_source.is_empty() {
      let pending: Vec<(RefType, u32)> =
        self.awaiting_source.drain().map(|(_, v)| v).collect();
      for (class, attempts_left) in pending {
        self.consider_reference_type(class, attempts_left).await;
      }
    }

    let mut paused = false;
    for event in &set.events {
      match event {
        VmEvent::VmStart => {}
        VmEvent::VmDeath => unreachable!("handled above"),
        VmEvent::ClassPrepare { class } => {
          if self.initialized {
            self
              .consider_reference_type(
                class.clone(),
                INITIAL_SCRIPT_RESOLVE_ATTEMPTS,
              )
              .await;
          } else {
            self.class_prepares_seen += 1;
          }
        }
        VmEvent::Breakpoint {
          request,
          thread,
          location,
        } => {
          if paused {
            continue;
          }
          let kind = if self.debugger_trap.map(|t| t.id) == Some(*request) {
            HitKind::DebuggerStatement
          } else {
            HitKind::Breakpoint
          };
          paused = self.handle_hit(*thread, *location, kind).await;
        }
        VmEvent::MethodEntry {
          thread, location, ..
        }
        | VmEvent::MethodExit {
          thread, location, ..
        } => {
          if paused || self.pause_at_next.is_empty() {
            continue;
          }
          paused = self
            .handle_hit(*thread, *location, HitKind::PauseAtNext)
            .await;
        }
        VmEvent::Exception {
          thread,
          location,
          exception,
          caught,
          ..
        } => {
          if paused || exception.class_name != nashorn::ECMA_EXCEPTION {
            continue;
          }
          let wants_pause = if *caught {
            self.exception_mode.pauses_caught()
          } else {
            self.exception_mode.pauses_uncaught()
          };
          if wants_pause {
            paused = self
              .handle_hit(*thread, *location, HitKind::Exception)
              .await;
          } else if !*caught {
            self.report_uncaught_error(*thread, exception).await;
          }
        }
      }
    }

    if !paused {
      if let Err(err) = self.vm.resume_event_set(&set).await {
        warn!("cannot resume event set: {err}");
      }
    }
    ControlFlow::Continue(())
  }

  /// Registration per loaded class: capture infrastructure classes, then
  /// recover script sources and populate registry plus location table.
  async fn consider_reference_type(
    &mut self,
    class: RefType,
    attempts_left: u32,
  ) {
    if self.registered_classes.contains(&class.id.0) {
      return;
    }
    if nashorn::is_wanted_class(&class.name) {
      trace!(class = %class.name, "captured infrastructure class");
      self.wanted.insert(class.name.clone(), class.id);
      self.registered_classes.insert(class.id.0);
      return;
    }
    if !nashorn::is_script_class(&class.name) {
      return;
    }

    let vm = self.vm.clone();
    let locations = match vm.line_locations(class.id).await {
      Ok(locations) => locations,
      Err(err) => {
        debug!(class = %class.name, "no line locations: {err}");
        return;
      }
    };
    if locations.is_empty() {
      return;
    }

    match self.recover_source(&class).await {
      Ok(source) => {
        self.awaiting_source.remove(&class.id.0);
        self.registered_classes.insert(class.id.0);
        if source.contains(EVALUATED_CODE_MARKER) {
          // Our own evaluated code resurfacing after a reconnect.
          debug!(class = %class.name, "ignoring marker-tagged script");
          return;
        }
        let url = self.script_url_for(&class).await;
        let outcome = self.scripts.register(url, source);
        let script = outcome.script().clone();
        self.add_locations(&script, &locations);
        if let Registered::New(_) = outcome {
          debug!(script = %script.url(), id = %script.id(), "script added");
          self.bus.emit(DebuggerEvent::ScriptAdded(script));
        }
      }
      Err(HostErr::SourceUnavailable) => {
        if attempts_left > 1 {
          trace!(class = %class.name, attempts_left, "source not ready");
          self
            .awaiting_source
            .insert(class.id.0, (class.clone(), attempts_left - 1));
          self.schedule_consider(class, attempts_left - 1);
        } else {
          self.awaiting_source.remove(&class.id.0);
          debug!(class = %class.name, "source never materialized, dropping");
        }
      }
      Err(err) => {
        self.awaiting_source.remove(&class.id.0);
        error!(class = %class.name, "source recovery failed: {err}");
      }
    }
  }

  /// Follows the reflective `source -> data -> array` path. A hop that is
  /// still null is transient ([`HostErr::SourceUnavailable`]); a missing
  /// field is a hard engine-layout mismatch.
  async fn recover_source(&self, class: &RefType) -> HostResult<String> {
    let vm = self.vm.clone();
    let Some(source_value) =
      vm.static_field(class.id, nashorn::SOURCE_FIELD).await?
    else {
      return Err(
        VmErr::EngineMismatch(format!(
          "script class {} has no `{}` field",
          class.name,
          nashorn::SOURCE_FIELD
        ))
        .into(),
      );
    };
    let VmValue::Object(source_obj) = source_value else {
      return Err(HostErr::SourceUnavailable);
    };

    let Some(data_value) = vm
      .instance_field(&source_obj, nashorn::SOURCE_DATA_FIELD)
      .await?
    else {
      return Err(
        VmErr::EngineMismatch(format!(
          "{} has no `{}` field",
          source_obj.class_name,
          nashorn::SOURCE_DATA_FIELD
        ))
        .into(),
      );
    };
    let VmValue::Object(data_obj) = data_value else {
      return Err(HostErr::SourceUnavailable);
    };

    let Some(array_value) = vm
      .instance_field(&data_obj, nashorn::RAW_DATA_ARRAY_FIELD)
      .await?
    else {
      return Err(
        VmErr::EngineMismatch(format!(
          "{} has no `{}` field",
          data_obj.class_name,
          nashorn::RAW_DATA_ARRAY_FIELD
        ))
        .into(),
      );
    };
    let VmValue::Object(array_obj) = array_value else {
      return Err(HostErr::SourceUnavailable);
    };

    let values = vm.array_values(&array_obj).await?;
    let utf16: Vec<u16> = values
      .iter()
      .filter_map(|value| match value {
        VmValue::Char(c) => Some(*c),
        _ => None,
      })
      .collect();
    Ok(String::from_utf16_lossy(&utf16))
  }

  /// Derives the script path: the recorded source name when it is not
  /// `<eval>`, otherwise a synthetic path from the class name.
  async fn script_url_for(&self, class: &RefType) -> ScriptUrl {
    match self.vm.source_name(class.id).await {
      Ok(Some(name)) if name != nashorn::EVAL_SOURCE_NAME => {
        match ScriptUrl::create(&name) {
          Ok(url) => url,
          Err(err) => {
            warn!(class = %class.name, "unusable source name: {err}");
            eval_url_for_class(&class.name)
          }
        }
      }
      _ => eval_url_for_class(&class.name),
    }
  }

  fn add_locations(&mut self, script: &ScriptArc, locations: &[VmLocation]) {
    let url: CompactString = script.url().as_str().to_compact_string();
    for location in locations {
      if location.line == 0 {
        continue;
      }
      self.locations.add(
        script.id().clone(),
        url.clone(),
        *location,
        ScriptLocation::new(location.line, Some(1)),
      );
    }
  }

  async fn handle_command(&mut self, command: HostCommand) {
    match command {
      HostCommand::Scripts(reply) => {
        let _ = reply.send(self.scripts.scripts());
      }
      HostCommand::ScriptById { id, reply } => {
        let _ = reply.send(self.scripts.script_by_id(&id));
      }
      HostCommand::SetBreakpoint {
        url,
        location,
        reply,
      } => {
        let _ = reply.send(self.op_set_breakpoint(&url, location).await);
      }
      HostCommand::RemoveBreakpoint { id, reply } => {
        let _ = reply.send(self.op_remove_breakpoint(&id).await);
      }
      HostCommand::BreakpointLocations {
        script_id,
        from,
        to,
        reply,
      } => {
        let _ =
          reply.send(Ok(self.locations.in_range(&script_id, from, to)));
      }
      HostCommand::Resume(reply) => {
        let _ = reply.send(self.op_resume().await);
      }
      HostCommand::Step { kind, reply } => {
        let _ = reply.send(self.op_step(kind).await);
      }
      HostCommand::PauseOnBreakpoints(reply) => {
        self.will_pause = true;
        let _ = reply.send(());
      }
      HostCommand::IgnoreBreakpoints(reply) => {
        self.will_pause = false;
        let _ = reply.send(());
      }
      HostCommand::PauseOnExceptions { mode, reply } => {
        let _ = reply.send(self.op_pause_on_exceptions(mode).await);
      }
      HostCommand::PauseAtNextStatement(reply) => {
        let _ = reply.send(self.op_pause_at_next_statement().await);
      }
      HostCommand::Reset(reply) => {
        let _ = reply.send(self.op_reset().await);
      }
      HostCommand::Evaluate {
        stack_frame_id,
        expression,
        named_objects,
        reply,
      } => {
        let _ = reply.send(
          self
            .op_evaluate(&stack_frame_id, &expression, named_objects)
            .await,
        );
      }
      HostCommand::ObjectProperties {
        id,
        only_own,
        only_accessors,
        reply,
      } => {
        let _ = reply.send(
          self
            .op_object_properties(&id, only_own, only_accessors)
            .await,
        );
      }
      HostCommand::Subscribe(reply) => {
        let _ = reply.send(self.bus.subscribe());
      }
    }
  }

  async fn op_set_breakpoint(
    &mut self,
    url: &str,
    location: ScriptLocation,
  ) -> HostResult<Option<Breakpoint>> {
    let url = ScriptUrl::create(url)?;
    let Some(idx) = self.locations.find_exact(url.as_str(), location) else {
      return Ok(None);
    };
    if let Some(existing) = self.locations.get(idx).breakpoint_id() {
      let bl = self.locations.get(idx);
      return Ok(Some(Breakpoint {
        id: existing.clone(),
        script_id: bl.script_id.clone(),
        location: bl.location,
      }));
    }
    let vm_location = self.locations.get(idx).vm_location;
    let handle = self.vm.set_breakpoint_request(&vm_location).await?;
    self.breakpoint_seq += 1;
    let id: CompactString = format!("bp-{}", self.breakpoint_seq).into();
    self.locations.mark_enabled(idx, handle, id.clone());
    let bl = self.locations.get(idx);
    debug!(%id, url = %url, line = bl.location.line, "breakpoint set");
    Ok(Some(Breakpoint {
      id,
      script_id: bl.script_id.clone(),
      location: bl.location,
    }))
  }

  async fn op_remove_breakpoint(&mut self, id: &str) -> HostResult<()> {
    let Some(idx) = self.locations.find_by_breakpoint(id) else {
      warn!(%id, "remove for unknown breakpoint id");
      return Ok(());
    };
    if let Some(request) = self.locations.mark_disabled(idx) {
      self.vm.clear_request(request).await?;
    }
    Ok(())
  }

  async fn op_reset(&mut self) -> HostResult<()> {
    for id in self.locations.breakpoint_ids() {
      self.op_remove_breakpoint(&id).await?;
    }
    if let Some(request) = self.exception_request.take() {
      let _ = self.vm.clear_request(request).await;
    }
    self.exception_mode = ExceptionPauseMode::None;
    if self.paused.is_some() {
      self.do_resume().await?;
    }
    Ok(())
  }
}

impl HostHandle {
  async fn request<T>(
    &self,
    build: impl FnOnce(oneshot::Sender<T>) -> HostCommand,
  ) -> HostResult<T> {
    let (tx, rx) = oneshot::channel();
    self
      .tx
      .send(HostMessage::Command(build(tx)))
      .map_err(|_| HostErr::HostGone)?;
    rx.await.map_err(|_| HostErr::HostGone)
  }

  pub async fn scripts(&self) -> HostResult<Vec<ScriptArc>> {
    self.request(HostCommand::Scripts).await
  }

  pub async fn script_by_id(&self, id: &str) -> HostResult<Option<ScriptArc>> {
    self
      .request(|reply| HostCommand::ScriptById {
        id: id.to_compact_string(),
        reply,
      })
      .await
  }

  pub async fn set_breakpoint(
    &self,
    url: &str,
    location: ScriptLocation,
  ) -> HostResult<Option<Breakpoint>> {
    self
      .request(|reply| HostCommand::SetBreakpoint {
        url: url.to_string(),
        location,
        reply,
      })
      .await?
  }

  pub async fn remove_breakpoint_by_id(&self, id: &str) -> HostResult<()> {
    self
      .request(|reply| HostCommand::RemoveBreakpoint {
        id: id.to_compact_string(),
        reply,
      })
      .await?
  }

  pub async fn get_breakpoint_locations(
    &self,
    script_id: &str,
    from: ScriptLocation,
    to: Option<ScriptLocation>,
  ) -> HostResult<Vec<ScriptLocation>> {
    self
      .request(|reply| HostCommand::BreakpointLocations {
        script_id: script_id.to_compact_string(),
        from,
        to,
        reply,
      })
      .await?
  }

  pub async fn resume(&self) -> HostResult<()> {
    self.request(HostCommand::Resume).await?
  }

  pub async fn step(&self, kind: StepKind) -> HostResult<()> {
    self
      .request(|reply| HostCommand::Step { kind, reply })
      .await?
  }

  pub async fn pause_on_breakpoints(&self) -> HostResult<()> {
    self.request(HostCommand::PauseOnBreakpoints).await
  }

  pub async fn ignore_breakpoints(&self) -> HostResult<()> {
    self.request(HostCommand::IgnoreBreakpoints).await
  }

  pub async fn pause_on_exceptions(
    &self,
    mode: ExceptionPauseMode,
  ) -> HostResult<()> {
    self
      .request(|reply| HostCommand::PauseOnExceptions { mode, reply })
      .await?
  }

  pub async fn pause_at_next_statement(&self) -> HostResult<()> {
    self.request(HostCommand::PauseAtNextStatement).await?
  }

  pub async fn reset(&self) -> HostResult<()> {
    self.request(HostCommand::Reset).await?
  }

  pub async fn evaluate_on_stack_frame(
    &self,
    stack_frame_id: &str,
    expression: &str,
    named_objects: HashMap<String, ObjectId>,
  ) -> HostResult<EvalResult> {
    self
      .request(|reply| HostCommand::Evaluate {
        stack_frame_id: stack_frame_id.to_compact_string(),
        expression: expression.to_string(),
        named_objects,
        reply,
      })
      .await?
  }

  pub async fn get_object_properties(
    &self,
    id: &ObjectId,
    only_own: bool,
    only_accessors: bool,
  ) -> HostResult<PropertiesMap> {
    self
      .request(|reply| HostCommand::ObjectProperties {
        id: id.clone(),
        only_own,
        only_accessors,
        reply,
      })
      .await?
  }

  /// Subscribes to the event stream; completes on VM disconnect.
  pub async fn events(
    &self,
  ) -> HostResult<UnboundedReceiver<DebuggerEvent>> {
    self.request(HostCommand::Subscribe).await
  }
}
