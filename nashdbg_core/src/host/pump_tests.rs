use crate::host::DebuggerHost;
use crate::host::HostHandle;
use crate::host::bus::DebuggerEvent;
use crate::host::msg::ExceptionPauseMode;
use crate::node::ScriptLocation;
use crate::node::StackFrameView;
use crate::prelude::*;
use crate::test::log::init as test_log_init;
use crate::test::vm::FakeLocal;
use crate::test::vm::FakeVm;
use crate::test::vm::MAIN_THREAD;
use crate::vm::MethodId;
use crate::vm::ObjectRef;
use crate::vm::SuspendPolicy;
use crate::vm::VmEvent;
use crate::vm::VmEventSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

pub(crate) const SCRIPT_CLASS: &str =
  "jdk.nashorn.internal.scripts.Script$1$app";
pub(crate) const SCRIPT_URL: &str = "eval:///Script1app";
pub(crate) const SOURCE: &str = "function f() {\n  return 1;\n}\n";

pub(crate) async fn next_event(
  events: &mut UnboundedReceiver<DebuggerEvent>,
) -> DebuggerEvent {
  tokio::time::timeout(Duration::from_secs(10), events.recv())
    .await
    .expect("timed out waiting for a debugger event")
    .expect("event stream completed unexpectedly")
}

pub(crate) async fn wait_initialized(
  events: &mut UnboundedReceiver<DebuggerEvent>,
) -> usize {
  let mut scripts_added = 0;
  loop {
    match next_event(events).await {
      DebuggerEvent::InitialInitializationComplete => return scripts_added,
      DebuggerEvent::ScriptAdded(_) => scripts_added += 1,
      _ => {}
    }
  }
}

pub(crate) async fn wait_hit(
  events: &mut UnboundedReceiver<DebuggerEvent>,
) -> Vec<StackFrameView> {
  loop {
    if let DebuggerEvent::HitBreakpoint(frames) = next_event(events).await {
      return frames;
    }
  }
}

pub(crate) async fn boot(
  fv: &Arc<FakeVm>,
) -> (HostHandle, UnboundedReceiver<DebuggerEvent>) {
  let handle = DebuggerHost::spawn(fv.clone());
  let mut events = handle.events().await.unwrap();
  wait_initialized(&mut events).await;
  (handle, events)
}

/// Boots a host around one script class and pauses it at `line` with the
/// given locals on the top frame.
pub(crate) async fn boot_paused(
  fv: &Arc<FakeVm>,
  line: u32,
  locals: Vec<FakeLocal>,
) -> (HostHandle, UnboundedReceiver<DebuggerEvent>, Vec<StackFrameView>) {
  let class = fv.add_script_class(
    SCRIPT_CLASS,
    Some("<eval>"),
    &[10, 11, 12],
    SOURCE,
    0,
  );
  let (handle, mut events) = boot(fv).await;
  handle.pause_on_breakpoints().await.unwrap();
  handle
    .set_breakpoint(SCRIPT_URL, ScriptLocation::new(line, Some(1)))
    .await
    .unwrap()
    .expect("breakpoint location exists");

  let location = fv.location(class, MethodId(1), line);
  fv.set_frames(
    MAIN_THREAD,
    vec![fv.frame(1, location, "f", locals)],
  );
  fv.push_breakpoint_hit(MAIN_THREAD, location);
  let frames = wait_hit(&mut events).await;
  (handle, events, frames)
}

#[tokio::test(start_paused = true)]
async fn source_recovery_retries_until_populated() {
  test_log_init();
  let fv = FakeVm::new();
  // The reflective `source` field answers null three times before the
  // engine populates it.
  let class =
    fv.add_script_class(SCRIPT_CLASS, Some("<eval>"), &[10, 11], SOURCE, 3);

  let handle = DebuggerHost::spawn(fv.clone());
  let mut events = handle.events().await.unwrap();

  let mut scripts_added = 0;
  let script = loop {
    match next_event(&mut events).await {
      DebuggerEvent::ScriptAdded(script) => {
        scripts_added += 1;
        break script;
      }
      _ => {}
    }
  };
  assert_eq!(scripts_added, 1);
  assert_eq!(script.source(), SOURCE);
  assert_eq!(script.url().as_str(), SCRIPT_URL);
  // One read per attempt: three nulls, then the real object.
  assert_eq!(fv.source_reads(class), 4);
  assert_eq!(handle.scripts().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn recompiled_identical_source_is_deduplicated() {
  test_log_init();
  let fv = FakeVm::new();
  fv.add_script_class(
    "jdk.nashorn.internal.scripts.Script$1$app",
    Some("<eval>"),
    &[10],
    SOURCE,
    0,
  );
  fv.add_script_class(
    "jdk.nashorn.internal.scripts.Script$Recompilation$2$app",
    Some("<eval>"),
    &[10],
    SOURCE,
    0,
  );

  let handle = DebuggerHost::spawn(fv.clone());
  let mut events = handle.events().await.unwrap();
  let scripts_added = wait_initialized(&mut events).await;
  assert_eq!(scripts_added, 1);

  let scripts = handle.scripts().await.unwrap();
  assert_eq!(scripts.len(), 1);
  let script = &scripts[0];
  assert_eq!(
    handle
      .script_by_id(script.id())
      .await
      .unwrap()
      .unwrap()
      .contents_hash(),
    script.contents_hash()
  );
}

#[tokio::test(start_paused = true)]
async fn class_prepare_after_init_registers_script() {
  test_log_init();
  let fv = FakeVm::new();
  let (handle, mut events) = boot(&fv).await;

  let class =
    fv.add_script_class(SCRIPT_CLASS, Some("<eval>"), &[10], SOURCE, 0);
  fv.push_class_prepare(class);

  let script = loop {
    if let DebuggerEvent::ScriptAdded(script) = next_event(&mut events).await
    {
      break script;
    }
  };
  assert_eq!(script.url().as_str(), SCRIPT_URL);
  assert_eq!(handle.scripts().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn breakpoint_hit_pauses_and_resume_unpauses() {
  test_log_init();
  let fv = FakeVm::new();
  let (handle, mut events, frames) =
    boot_paused(&fv, 10, vec![]).await;

  assert_eq!(frames.len(), 1);
  assert_eq!(frames[0].location.line, 10);
  assert_eq!(frames[0].function_name, "f");
  assert!(
    frames[0]
      .scope_chain
      .iter()
      .any(|scope| scope.kind == crate::node::ScopeKind::Global)
  );

  handle.resume().await.unwrap();
  assert!(matches!(next_event(&mut events).await, DebuggerEvent::Resumed));

  // Not paused anymore: pause-requiring operations signal illegal state.
  assert!(matches!(
    handle.resume().await,
    Err(HostErr::NotPaused)
  ));
  assert!(matches!(
    handle
      .get_object_properties(
        &crate::node::ObjectId::new("$$obj-1"),
        true,
        false
      )
      .await,
    Err(HostErr::NotPaused)
  ));
}

#[tokio::test(start_paused = true)]
async fn hits_are_ignored_until_a_client_enables_pauses() {
  test_log_init();
  let fv = FakeVm::new();
  let class =
    fv.add_script_class(SCRIPT_CLASS, Some("<eval>"), &[10], SOURCE, 0);
  let (handle, mut events) = boot(&fv).await;

  let location = fv.location(class, MethodId(1), 10);
  fv.set_frames(MAIN_THREAD, vec![fv.frame(1, location, "f", vec![])]);
  fv.push_breakpoint_hit(MAIN_THREAD, location);

  // A command round-trip orders after the event: by the time it answers,
  // the hit has been processed (and must have been let go).
  let _ = handle.scripts().await.unwrap();
  assert!(events.try_recv().is_err());
  assert!(fv.resume_count() >= 1);
}

#[tokio::test(start_paused = true)]
async fn set_then_remove_breakpoint_restores_requests() {
  test_log_init();
  let fv = FakeVm::new();
  fv.add_script_class(SCRIPT_CLASS, Some("<eval>"), &[10, 11], SOURCE, 0);
  let (handle, _events) = boot(&fv).await;

  assert!(fv.armed_breakpoints().is_empty());
  let bp = handle
    .set_breakpoint(SCRIPT_URL, ScriptLocation::new(11, Some(1)))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(fv.armed_breakpoints().len(), 1);
  assert_eq!(bp.location, ScriptLocation::new(11, Some(1)));

  handle.remove_breakpoint_by_id(&bp.id).await.unwrap();
  assert!(fv.armed_breakpoints().is_empty());

  // Unknown ids are tolerated.
  handle.remove_breakpoint_by_id("bp-404").await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unknown_location_yields_no_breakpoint() {
  test_log_init();
  let fv = FakeVm::new();
  fv.add_script_class(SCRIPT_CLASS, Some("<eval>"), &[10], SOURCE, 0);
  let (handle, _events) = boot(&fv).await;

  let none = handle
    .set_breakpoint(SCRIPT_URL, ScriptLocation::new(99, Some(1)))
    .await
    .unwrap();
  assert!(none.is_none());
}

#[tokio::test(start_paused = true)]
async fn object_ids_do_not_survive_a_resume() {
  test_log_init();
  let fv = FakeVm::new();
  let object = fv.new_script_object(
    "Object",
    vec![("a", crate::test::vm::FakeProp::Data(crate::vm::VmValue::Int(1)))],
  );
  let locals = vec![FakeLocal::new("o", "Ljava/lang/Object;", 0, object)];
  let (handle, mut events, frames) = boot_paused(&fv, 10, locals).await;

  // Reach o's id through the locals scope.
  let locals_id = frames[0].scope_chain[0]
    .object
    .object_id()
    .cloned()
    .expect("locals scope is an object node");
  let props = handle
    .get_object_properties(&locals_id, true, false)
    .await
    .unwrap();
  let object_id = props
    .get("o")
    .and_then(|desc| desc.value.as_ref())
    .and_then(|node| node.object_id())
    .cloned()
    .expect("o marshals to an object node");

  handle.resume().await.unwrap();
  assert!(matches!(next_event(&mut events).await, DebuggerEvent::Resumed));

  // Pause again; the old id is from a dead pause and resolves to nothing.
  let class = fv.class_by_name(SCRIPT_CLASS);
  let location = fv.location(class, MethodId(1), 10);
  fv.push_breakpoint_hit(MAIN_THREAD, location);
  let _ = wait_hit(&mut events).await;

  let stale = handle
    .get_object_properties(&object_id, true, false)
    .await
    .unwrap();
  assert!(stale.is_empty());
}

#[tokio::test(start_paused = true)]
async fn uncaught_errors_report_without_pausing() {
  test_log_init();
  let fv = FakeVm::new();
  let class =
    fv.add_script_class(SCRIPT_CLASS, Some("<eval>"), &[10], SOURCE, 0);
  let (handle, mut events) = boot(&fv).await;
  handle.pause_on_breakpoints().await.unwrap();
  handle
    .pause_on_exceptions(ExceptionPauseMode::Caught)
    .await
    .unwrap();

  // An uncaught script error arrives while only caught ones pause.
  let location = fv.location(class, MethodId(1), 10);
  fv.set_frames(MAIN_THREAD, vec![fv.frame(1, location, "f", vec![])]);

  let thrown = fv.new_script_object(
    "Error",
    vec![
      ("name", crate::test::vm::FakeProp::Data(fv.new_string("Error"))),
      (
        "message",
        crate::test::vm::FakeProp::Data(fv.new_string("boom")),
      ),
    ],
  );
  let exception = fv.new_host_object(
    crate::vm::nashorn::ECMA_EXCEPTION,
    vec![("thrown", thrown)],
  );
  let crate::vm::VmValue::Object(exception) = exception else {
    unreachable!();
  };

  fv.push_event_set(VmEventSet {
    suspend_policy: SuspendPolicy::EventThread,
    events: vec![VmEvent::Exception {
      request: 77,
      thread: MAIN_THREAD,
      location,
      exception,
      caught: false,
    }],
  });

  let error = loop {
    match next_event(&mut events).await {
      DebuggerEvent::UncaughtError(error) => break error,
      DebuggerEvent::HitBreakpoint(_) => panic!("must not pause"),
      _ => {}
    }
  };
  assert_eq!(error.message, "boom");
  assert_eq!(error.name, "Error");
}

#[tokio::test(start_paused = true)]
async fn exception_pause_mode_all_pauses_on_script_errors() {
  test_log_init();
  let fv = FakeVm::new();
  let class =
    fv.add_script_class(SCRIPT_CLASS, Some("<eval>"), &[10], SOURCE, 0);
  let (handle, mut events) = boot(&fv).await;
  handle.pause_on_breakpoints().await.unwrap();
  handle
    .pause_on_exceptions(ExceptionPauseMode::All)
    .await
    .unwrap();

  let request = fv
    .requests()
    .into_iter()
    .find(|r| {
      r.handle.kind == crate::vm::EventRequestKind::Exception && !r.cleared
    })
    .expect("exception request installed");
  assert!(request.caught);
  assert!(request.uncaught);
  assert_eq!(
    request.class_pattern.as_deref(),
    Some("jdk.nashorn.internal.scripts.*")
  );

  let location = fv.location(class, MethodId(1), 10);
  fv.set_frames(MAIN_THREAD, vec![fv.frame(1, location, "f", vec![])]);
  let thrown = fv.new_script_object("Error", vec![]);
  let exception = fv.new_host_object(
    crate::vm::nashorn::ECMA_EXCEPTION,
    vec![("thrown", thrown)],
  );
  let crate::vm::VmValue::Object(exception_obj) = exception else {
    unreachable!();
  };
  fv.push_event_set(VmEventSet {
    suspend_policy: SuspendPolicy::EventThread,
    events: vec![VmEvent::Exception {
      request: 78,
      thread: MAIN_THREAD,
      location,
      exception: ObjectRef {
        id: exception_obj.id,
        class_name: crate::vm::nashorn::ECMA_EXCEPTION.to_string(),
      },
      caught: false,
    }],
  });

  let frames = wait_hit(&mut events).await;
  assert_eq!(frames[0].location.line, 10);
}
