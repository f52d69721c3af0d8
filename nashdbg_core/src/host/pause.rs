//! Pause engine: frame snapshots, scope chains, stepping and resume.

use crate::host::DebuggerHost;
use crate::host::bus::DebuggerEvent;
use crate::host::msg::ExceptionPauseMode;
use crate::host::msg::StepKind;
use crate::node::ObjectId;
use crate::node::PropertiesMap;
use crate::node::Scope;
use crate::node::ScopeKind;
use crate::node::StackFrameView;
use crate::node::ValueNode;
use crate::prelude::*;
use crate::vm::ObjectRef;
use crate::vm::ThreadId;
use crate::vm::VariableInfo;
use crate::vm::Vm;
use crate::vm::VmLocation;
use crate::vm::VmValue;
use crate::vm::nashorn;
use compact_str::CompactString;
use compact_str::format_compact;
use tracing::debug;
use tracing::trace;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Why the VM stopped us.
pub enum HitKind {
  /// A user breakpoint or a one-shot stepping seed.
  Breakpoint,
  /// The fixed trap in `ScriptRuntime.DEBUGGER`.
  DebuggerStatement,
  /// A script exception matching the pause-on-exceptions setting.
  Exception,
  /// A seed installed by pause-at-next-statement.
  PauseAtNext,
}

#[derive(Debug)]
/// One paused script frame: the raw snapshot plus the marshalled view.
pub struct PausedFrame {
  pub id: CompactString,
  /// Recorded location; write-back after an evaluation re-locates the
  /// frame by it, since invocations invalidate raw frame handles.
  pub location: VmLocation,
  pub this_value: Option<VmValue>,
  pub scope_value: Option<VmValue>,
  pub locals: Vec<(VariableInfo, VmValue)>,
  /// Synthesized accessor-tracked scope over the locals.
  pub wrapper: Option<ObjectRef>,
  pub view: StackFrameView,
}

#[derive(Debug)]
/// State that exists only while the target is suspended by us; dropped as
/// a whole on resume, which mechanically invalidates everything derived
/// from the pause.
pub struct PausedData {
  pub thread: ThreadId,
  pub frames: Vec<PausedFrame>,
  pub props_cache: HashMap<(ObjectId, bool, bool), PropertiesMap>,
  /// In-target property extractor, compiled lazily once per pause.
  pub extractor: Option<ObjectRef>,
}

impl<V: Vm> DebuggerHost<V> {
  /// Breakpoint/exception entry point. Returns true when the host ends up
  /// paused, in which case the triggering event set must not be resumed.
  pub(crate) async fn handle_hit(
    &mut self,
    thread: ThreadId,
    location: VmLocation,
    kind: HitKind,
  ) -> bool {
    if !self.will_pause {
      trace!("breakpoint hit while pauses are off");
      return false;
    }
    // First hit burns every one-shot seed and pause-at-next request.
    self.disarm_one_shots().await;
    self.clear_pause_at_next().await;

    match self.try_pause(thread, location, kind).await {
      Ok(paused) => paused,
      Err(err) => {
        warn!("pause aborted: {err}");
        false
      }
    }
  }

  async fn try_pause(
    &mut self,
    thread: ThreadId,
    _location: VmLocation,
    kind: HitKind,
  ) -> VmResult<bool> {
    // Per-pause caches start empty.
    self.objects.clear();

    let vm = self.vm.clone();

    // Phase one: snapshot every frame's visible locals in one pass,
    // strictly before any method invocation (invoking resumes the thread
    // and invalidates the frames being read).
    let raw_frames = vm.frames(thread).await?;
    let mut snapshots = Vec::with_capacity(raw_frames.len());
    for frame in &raw_frames {
      let mut vars = vm
        .visible_variables(thread, frame.id)
        .await
        .unwrap_or_default();
      vars.retain(|var| var.name != nashorn::RETURN_LOCAL);
      let pairs = match vm.local_values(thread, frame.id, &vars).await {
        Ok(values) => vars.iter().cloned().zip(values).collect::<Vec<_>>(),
        Err(VmErr::Jdwp(JDWP_INVALID_SLOT)) => {
          // Batch read hit a stale slot; degrade to per-variable reads
          // and keep whatever works.
          warn!(
            method = %frame.method_name,
            "invalid slot in batch read, degrading to per-variable reads"
          );
          let mut pairs = Vec::with_capacity(vars.len());
          for var in &vars {
            match vm.local_value(thread, frame.id, var).await {
              Ok(value) => pairs.push((var.clone(), value)),
              Err(err) => {
                warn!(name = %var.name, "skipping unreadable local: {err}");
              }
            }
          }
          pairs
        }
        Err(err) => return Err(err),
      };
      snapshots.push((frame.clone(), pairs));
    }

    let top_recognized = snapshots
      .first()
      .map(|(frame, _)| {
        self
          .locations
          .find_by_vm_line(
            frame.location.class,
            frame.location.method,
            frame.location.line,
          )
          .is_some()
      })
      .unwrap_or(false);
    if !top_recognized && kind == HitKind::Breakpoint {
      trace!("top frame is not a known script location, ignoring hit");
      return Ok(false);
    }

    // Phase two: marshal script frames; invocations are allowed now that
    // the raw snapshot is complete.
    let mut frames: Vec<PausedFrame> = Vec::new();
    for (frame, pairs) in snapshots {
      let Some(idx) = self.locations.find_by_vm_line(
        frame.location.class,
        frame.location.method,
        frame.location.line,
      ) else {
        continue;
      };
      let (script_id, script_location) = {
        let bl = self.locations.get(idx);
        (bl.script_id.clone(), bl.location)
      };

      let this_value = pairs
        .iter()
        .find(|(var, _)| var.name == nashorn::THIS_LOCAL)
        .map(|(_, value)| value.clone());
      let scope_value = pairs
        .iter()
        .find(|(var, _)| var.name == nashorn::SCOPE_LOCAL)
        .map(|(_, value)| value.clone());
      let locals: Vec<(VariableInfo, VmValue)> = pairs
        .into_iter()
        .filter(|(var, _)| !var.name.starts_with(':'))
        .collect();

      let view_id: CompactString = format_compact!("frame-{}", frames.len());

      // The closure scope (or the receiver) becomes the prototype of the
      // synthesized locals wrapper.
      let parent = scope_value
        .as_ref()
        .and_then(VmValue::as_object)
        .or_else(|| this_value.as_ref().and_then(VmValue::as_object))
        .cloned();
      let wrapper = if locals.is_empty() {
        None
      } else {
        match self
          .build_scope_wrapper(thread, parent.as_ref(), &locals)
          .await
        {
          Ok(wrapper) => Some(wrapper),
          Err(err) => {
            warn!(frame = %view_id, "scope synthesis failed: {err}");
            None
          }
        }
      };

      let mut scope_chain: Vec<Scope> = Vec::new();
      if let Some(wrapper) = &wrapper {
        let locals_id = ObjectId(format_compact!("$$locals-{view_id}"));
        let node = ValueNode::Object {
          class_name: "Object".to_string(),
          id: locals_id.clone(),
        };
        self.objects.insert_named(
          locals_id,
          Some(VmValue::Object(wrapper.clone())),
          node.clone(),
        );
        scope_chain.push(Scope {
          kind: ScopeKind::Local,
          object: node,
        });
      }

      if let Some(scope_obj) = scope_value.as_ref().and_then(VmValue::as_object)
      {
        let mut current = scope_obj.clone();
        for _ in 0..8 {
          let kind = scope_kind_of(&current.class_name);
          let node = self
            .marshal_value(thread, &VmValue::Object(current.clone()))
            .await;
          scope_chain.push(Scope { kind, object: node });
          match self.proto_of(thread, &current).await {
            Some(next) => current = next,
            None => break,
          }
        }
      }

      if !scope_chain
        .iter()
        .any(|scope| scope.kind == ScopeKind::Global)
      {
        if let Ok(global) = self.global_object(thread).await {
          let node = self
            .marshal_value(thread, &VmValue::Object(global))
            .await;
          scope_chain.push(Scope {
            kind: ScopeKind::Global,
            object: node,
          });
        }
      }

      let this_node = match &this_value {
        Some(value) => self.marshal_value(thread, value).await,
        None => ValueNode::undefined(),
      };

      let view = StackFrameView {
        id: view_id.clone(),
        this_value: this_node,
        scope_chain,
        script_id,
        location: script_location,
        function_name: frame.method_name.clone(),
      };
      frames.push(PausedFrame {
        id: view_id,
        location: frame.location,
        this_value,
        scope_value,
        locals,
        wrapper,
        view,
      });
    }

    if frames.is_empty() {
      trace!(?kind, "no script frames to show, ignoring hit");
      return Ok(false);
    }

    let views: Vec<StackFrameView> =
      frames.iter().map(|frame| frame.view.clone()).collect();
    debug!(frames = views.len(), ?kind, "paused");
    self.paused = Some(PausedData {
      thread,
      frames,
      props_cache: HashMap::new(),
      extractor: None,
    });
    self.bus.emit(DebuggerEvent::HitBreakpoint(views));
    Ok(true)
  }

  pub(crate) async fn do_resume(&mut self) -> HostResult<()> {
    self.vm.resume_all().await?;
    self.paused = None;
    self.objects.clear();
    self.bus.emit(DebuggerEvent::Resumed);
    Ok(())
  }

  pub(crate) async fn op_resume(&mut self) -> HostResult<()> {
    if self.paused.is_none() {
      return Err(HostErr::NotPaused);
    }
    self.do_resume().await
  }

  /// Steps are faked with one-shot breakpoints: script lines and JVM
  /// lines do not correspond, so a JDWP step request is useless here.
  pub(crate) async fn op_step(&mut self, kind: StepKind) -> HostResult<()> {
    let paused = self.paused.as_ref().ok_or(HostErr::NotPaused)?;
    let top = paused.frames.first().map(|frame| frame.location);
    let parent = paused.frames.get(1).map(|frame| frame.location);

    let seeds = match kind {
      StepKind::Into => {
        // Every breakable location everywhere. Expensive but robust.
        self.locations.indices().collect::<Vec<_>>()
      }
      StepKind::Over => {
        let mut seeds = Vec::new();
        if let Some(top) = top {
          seeds.extend(self.locations.below_in_method(
            top.class,
            top.method,
            top.line,
          ));
        }
        if let Some(parent) = parent {
          seeds.extend(self.locations.below_in_method(
            parent.class,
            parent.method,
            parent.line,
          ));
        }
        seeds
      }
      StepKind::Out => match parent {
        Some(parent) => self.locations.below_in_method(
          parent.class,
          parent.method,
          parent.line,
        ),
        None => Vec::new(),
      },
    };

    for idx in seeds {
      self.arm_one_shot(idx).await;
    }
    self.do_resume().await
  }

  async fn arm_one_shot(&mut self, idx: crate::brk::BlIdx) {
    if self.locations.get(idx).is_enabled() {
      return;
    }
    let vm_location = self.locations.get(idx).vm_location;
    match self.vm.set_breakpoint_request(&vm_location).await {
      Ok(handle) => self.locations.mark_enabled_once(idx, handle),
      Err(err) => warn!("cannot arm one-shot breakpoint: {err}"),
    }
  }

  async fn disarm_one_shots(&mut self) {
    for idx in self.locations.one_shots() {
      if let Some(request) = self.locations.mark_disabled(idx) {
        if let Err(err) = self.vm.clear_request(request).await {
          warn!("cannot clear one-shot breakpoint: {err}");
        }
      }
    }
  }

  async fn clear_pause_at_next(&mut self) {
    for handle in std::mem::take(&mut self.pause_at_next) {
      if let Err(err) = self.vm.clear_request(handle).await {
        warn!("cannot clear pause-at-next request: {err}");
      }
    }
  }

  /// Recreates the single exception request according to `mode`. Uncaught
  /// exceptions are always observed when any request exists, so that
  /// non-pausing uncaught errors can still be reported.
  pub(crate) async fn op_pause_on_exceptions(
    &mut self,
    mode: ExceptionPauseMode,
  ) -> HostResult<()> {
    if let Some(request) = self.exception_request.take() {
      let _ = self.vm.clear_request(request).await;
    }
    self.exception_mode = mode;
    if mode == ExceptionPauseMode::None {
      return Ok(());
    }
    let handle = self
      .vm
      .set_exception_request(
        nashorn::SCRIPT_CLASS_PATTERN,
        mode.pauses_caught(),
        true,
      )
      .await?;
    self.exception_request = Some(handle);
    Ok(())
  }

  /// Briefly suspends the whole VM, seeds one-shot breakpoints in the
  /// innermost script frame of every live thread plus method entry/exit
  /// traps on script classes, then lets the VM run into them.
  pub(crate) async fn op_pause_at_next_statement(&mut self) -> HostResult<()> {
    if self.paused.is_some() {
      return Ok(());
    }
    let vm = self.vm.clone();
    vm.suspend_all().await?;

    match vm.all_threads().await {
      Ok(threads) => {
        for (thread, name) in threads {
          if nashorn::is_infrastructure_thread(&name) {
            continue;
          }
          let frames = vm.frames(thread).await.unwrap_or_default();
          for frame in frames {
            let in_method = self
              .locations
              .in_method(frame.location.class, frame.location.method);
            if in_method.is_empty() {
              continue;
            }
            for idx in in_method {
              self.arm_one_shot(idx).await;
            }
            break;
          }
        }
      }
      Err(err) => warn!("cannot enumerate threads: {err}"),
    }

    match vm
      .set_method_entry_request(nashorn::SCRIPT_CLASS_PATTERN)
      .await
    {
      Ok(handle) => self.pause_at_next.push(handle),
      Err(err) => warn!("cannot trap method entry: {err}"),
    }
    match vm
      .set_method_exit_request(nashorn::SCRIPT_CLASS_PATTERN)
      .await
    {
      Ok(handle) => self.pause_at_next.push(handle),
      Err(err) => warn!("cannot trap method exit: {err}"),
    }

    vm.resume_all().await?;
    Ok(())
  }

  /// `obj.getProto()`, `None` at the end of the chain.
  pub(crate) async fn proto_of(
    &self,
    thread: ThreadId,
    obj: &ObjectRef,
  ) -> Option<ObjectRef> {
    let (method, signature) = nashorn::SCRIPT_OBJECT_GET_PROTO;
    match self
      .vm
      .invoke_instance(obj, method, signature, &[], thread)
      .await
    {
      Ok(VmValue::Object(proto)) => Some(proto),
      _ => None,
    }
  }
}

fn scope_kind_of(class_name: &str) -> ScopeKind {
  if class_name.ends_with(nashorn::GLOBAL_SUFFIX) {
    ScopeKind::Global
  } else if class_name.ends_with(nashorn::WITH_OBJECT_SUFFIX) {
    ScopeKind::With
  } else {
    ScopeKind::Closure
  }
}
