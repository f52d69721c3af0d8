//! A scriptable in-memory [`Vm`] for driving the debugger host in tests.
//!
//! NOTE: This module should only be used in unit tests, not some where else.
//!
//! The fake mirrors just enough of the engine's surface that the host's
//! registration, pause, evaluation and extraction paths run unmodified:
//! classes with delayed reflective sources, threads with frames and
//! locals (optionally failing a slot), and an object store whose invoked
//! methods (`put`, `get`, `getOwnKeys`, `eval`, `apply`, `valueOf`, ...)
//! operate on fake objects.

use crate::prelude::*;
use crate::res::JDWP_ABSENT_INFORMATION;
use crate::vm::*;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::mpsc::unbounded_channel;

static FACTORY_NAMES_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"var names = (\[[^\]]*\]);").unwrap());

/// Canned behaviors for evaluated user expressions, matched by substring.
#[derive(Debug, Clone)]
pub enum CannedEval {
  /// Evaluates to the given value.
  Return(VmValue),
  /// Evaluates to the evaluated-code marker literal (what statements
  /// without a value produce).
  ReturnMarker,
  /// Writes a new value through the scope wrapper's accessor for `name`,
  /// then evaluates to that value.
  MutateLocal { name: String, value: i32 },
  /// Throws a script error with the given message.
  Throw { message: String },
}

#[derive(Debug, Clone)]
pub struct FakeMethod {
  pub id: u64,
  pub name: String,
  pub lines: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct FakeClass {
  pub id: u64,
  pub name: String,
  pub source_name: Option<String>,
  pub methods: Vec<FakeMethod>,
  pub source: Option<String>,
  /// How many `source` reads still answer null before the real object
  /// appears (the engine sets the field reflectively after prepare).
  pub source_delay: u32,
  pub source_reads: u32,
}

#[derive(Debug, Clone)]
pub struct FakeLocal {
  pub info: VariableInfo,
  pub value: VmValue,
  /// JDWP error raised when this slot is read (batch and single).
  pub fail: Option<u16>,
}

impl FakeLocal {
  pub fn new(name: &str, signature: &str, slot: u32, value: VmValue) -> Self {
    Self {
      info: VariableInfo {
        name: name.to_string(),
        slot,
        signature: signature.to_string(),
      },
      value,
      fail: None,
    }
  }

  pub fn failing(mut self, code: u16) -> Self {
    self.fail = Some(code);
    self
  }
}

#[derive(Debug, Clone)]
pub struct FakeFrame {
  pub id: u64,
  pub location: VmLocation,
  pub method_name: String,
  pub locals: Vec<FakeLocal>,
}

#[derive(Debug, Clone)]
struct FakeThread {
  id: u64,
  name: String,
  frames: Vec<FakeFrame>,
}

#[derive(Debug, Clone, PartialEq)]
/// A property on a fake script object.
pub enum FakeProp {
  Data(VmValue),
  Accessor {
    getter: Option<VmValue>,
    setter: Option<VmValue>,
  },
}

#[derive(Debug, Clone)]
enum FakeObject {
  Str(String),
  /// `java.lang.Object[]`.
  ObjectArray(Vec<VmValue>),
  /// `char[]`, backing recovered script sources.
  CharArray(String),
  /// A plain host object with named instance fields.
  Host {
    class: String,
    fields: Vec<(String, VmValue)>,
  },
  /// A script object with ordered properties and a prototype link.
  Script {
    class: String,
    js_class: String,
    props: Vec<(String, FakeProp)>,
    proto: Option<u64>,
  },
  /// A synthesized accessor-tracked scope wrapper.
  Wrapper {
    parent: Option<u64>,
    names: Vec<String>,
    shadows: Vec<(String, VmValue)>,
    changes: Vec<(String, VmValue)>,
  },
  /// A `ScriptObjectMirror`.
  Mirror(Vec<(String, VmValue)>),
  /// A `java.util.Hashtable`.
  Table(Vec<(String, VmValue)>),
  /// An enumeration over a table's keys.
  Enumeration {
    keys: Vec<(String, VmValue)>,
    pos: usize,
  },
  /// A script function: the in-target property extractor, a wrapper's
  /// `resetChanges` member, or an opaque user function.
  Function(FakeFn),
  Boxed {
    class: String,
    value: VmValue,
  },
  Undefined,
  EcmaException {
    thrown: u64,
    message: String,
  },
}

#[derive(Debug, Clone, PartialEq)]
enum FakeFn {
  PropertyExtractor,
  ResetChanges { wrapper: u64 },
  Opaque,
}

#[derive(Debug, Clone)]
/// Event requests the host installed, for assertions.
pub struct FakeRequest {
  pub handle: RequestHandle,
  pub location: Option<VmLocation>,
  pub class_pattern: Option<String>,
  pub caught: bool,
  pub uncaught: bool,
  pub cleared: bool,
}

#[derive(Debug, Default)]
struct FakeState {
  next_object: u64,
  next_request: i32,
  next_class: u64,
  classes: Vec<FakeClass>,
  threads: Vec<FakeThread>,
  objects: HashMap<u64, FakeObject>,
  requests: Vec<FakeRequest>,
  canned: Vec<(String, CannedEval)>,
  resume_count: u32,
  suspend_count: u32,
  global: u64,
  context: u64,
}

/// The fake debug target.
pub struct FakeVm {
  state: Mutex<FakeState>,
  events: tokio::sync::Mutex<UnboundedReceiver<VmEventSet>>,
  events_tx: Mutex<Option<UnboundedSender<VmEventSet>>>,
}

pub const MAIN_THREAD: ThreadId = ThreadId(1);

impl FakeVm {
  /// A fake target with the engine's infrastructure classes loaded, one
  /// `main` thread and a global object.
  pub fn new() -> Arc<Self> {
    let (tx, rx) = unbounded_channel();
    let mut state = FakeState {
      next_object: 100,
      next_request: 0,
      next_class: 10,
      ..Default::default()
    };

    state.threads.push(FakeThread {
      id: MAIN_THREAD.0,
      name: "main".to_string(),
      frames: vec![],
    });

    // Infrastructure classes the host captures during scanning.
    for name in [
      nashorn::SCRIPT_RUNTIME,
      nashorn::CONTEXT,
      "java.lang.Integer",
      "java.lang.Long",
      "java.lang.Double",
      "java.lang.Boolean",
    ] {
      let id = state.next_class;
      state.next_class += 1;
      let methods = if name == nashorn::SCRIPT_RUNTIME {
        vec![FakeMethod {
          id: 1,
          name: nashorn::DEBUGGER_METHOD.to_string(),
          lines: vec![1],
        }]
      } else {
        vec![]
      };
      state.classes.push(FakeClass {
        id,
        name: name.to_string(),
        source_name: None,
        methods,
        source: None,
        source_delay: 0,
        source_reads: 0,
      });
    }

    let global = state.alloc(FakeObject::Script {
      class: nashorn::GLOBAL.to_string(),
      js_class: "global".to_string(),
      props: vec![],
      proto: None,
    });
    let context = state.alloc(FakeObject::Host {
      class: nashorn::CONTEXT.to_string(),
      fields: vec![],
    });
    state.global = global;
    state.context = context;

    Arc::new(Self {
      state: Mutex::new(state),
      events: tokio::sync::Mutex::new(rx),
      events_tx: Mutex::new(Some(tx)),
    })
  }

  /// Adds a compiled script class with a single `:program` method
  /// covering `lines`. `source_delay` reads of the reflective `source`
  /// field answer null first.
  pub fn add_script_class(
    &self,
    name: &str,
    source_name: Option<&str>,
    lines: &[u32],
    source: &str,
    source_delay: u32,
  ) -> ClassId {
    let mut state = self.state.lock();
    let id = state.next_class;
    state.next_class += 1;
    state.classes.push(FakeClass {
      id,
      name: name.to_string(),
      source_name: source_name.map(|s| s.to_string()),
      methods: vec![FakeMethod {
        id: 1,
        name: ":program".to_string(),
        lines: lines.to_vec(),
      }],
      source: Some(source.to_string()),
      source_delay,
      source_reads: 0,
    });
    ClassId(id)
  }

  /// Adds another method to an existing script class.
  pub fn add_method(&self, class: ClassId, name: &str, lines: &[u32]) -> MethodId {
    let mut state = self.state.lock();
    let fake = state
      .classes
      .iter_mut()
      .find(|c| c.id == class.0)
      .expect("unknown fake class");
    let id = fake.methods.len() as u64 + 1;
    fake.methods.push(FakeMethod {
      id,
      name: name.to_string(),
      lines: lines.to_vec(),
    });
    MethodId(id)
  }

  pub fn class_by_name(&self, name: &str) -> ClassId {
    let state = self.state.lock();
    let fake = state
      .classes
      .iter()
      .find(|c| c.name == name)
      .expect("unknown fake class name");
    ClassId(fake.id)
  }

  pub fn ref_type(&self, class: ClassId) -> RefType {
    let state = self.state.lock();
    let fake = state
      .classes
      .iter()
      .find(|c| c.id == class.0)
      .expect("unknown fake class");
    RefType {
      id: class,
      name: fake.name.clone(),
    }
  }

  /// The canonical location for `line` of a script-class method, matching
  /// what `line_locations` hands out.
  pub fn location(&self, class: ClassId, method: MethodId, line: u32) -> VmLocation {
    VmLocation {
      class,
      method,
      code_index: line as u64 * 100,
      line,
    }
  }

  pub fn set_frames(&self, thread: ThreadId, frames: Vec<FakeFrame>) {
    let mut state = self.state.lock();
    if let Some(t) = state.threads.iter_mut().find(|t| t.id == thread.0) {
      t.frames = frames;
    }
  }

  pub fn frame(
    &self,
    id: u64,
    location: VmLocation,
    method_name: &str,
    locals: Vec<FakeLocal>,
  ) -> FakeFrame {
    FakeFrame {
      id,
      location,
      method_name: method_name.to_string(),
      locals,
    }
  }

  pub fn push_event_set(&self, set: VmEventSet) {
    if let Some(tx) = self.events_tx.lock().as_ref() {
      let _ = tx.send(set);
    }
  }

  pub fn push_breakpoint_hit(&self, thread: ThreadId, location: VmLocation) {
    self.push_event_set(VmEventSet {
      suspend_policy: SuspendPolicy::EventThread,
      events: vec![VmEvent::Breakpoint {
        request: 999,
        thread,
        location,
      }],
    });
  }

  pub fn push_class_prepare(&self, class: ClassId) {
    let class = self.ref_type(class);
    self.push_event_set(VmEventSet {
      suspend_policy: SuspendPolicy::None,
      events: vec![VmEvent::ClassPrepare { class }],
    });
  }

  /// Ends the event stream, as a closed socket would.
  pub fn disconnect(&self) {
    self.events_tx.lock().take();
  }

  pub fn add_canned_eval(&self, pattern: &str, action: CannedEval) {
    self
      .state
      .lock()
      .canned
      .push((pattern.to_string(), action));
  }

  /// Locations of breakpoint requests that are currently armed.
  pub fn armed_breakpoints(&self) -> Vec<VmLocation> {
    self
      .state
      .lock()
      .requests
      .iter()
      .filter(|r| {
        !r.cleared && r.handle.kind == EventRequestKind::Breakpoint
      })
      .filter_map(|r| r.location)
      .collect()
  }

  pub fn requests(&self) -> Vec<FakeRequest> {
    self.state.lock().requests.clone()
  }

  pub fn resume_count(&self) -> u32 {
    self.state.lock().resume_count
  }

  pub fn suspend_count(&self) -> u32 {
    self.state.lock().suspend_count
  }

  pub fn source_reads(&self, class: ClassId) -> u32 {
    self
      .state
      .lock()
      .classes
      .iter()
      .find(|c| c.id == class.0)
      .map(|c| c.source_reads)
      .unwrap_or(0)
  }

  /// Current value of a local on a fake frame, for write-back assertions.
  pub fn local_value_of(
    &self,
    thread: ThreadId,
    frame: u64,
    name: &str,
  ) -> Option<VmValue> {
    let state = self.state.lock();
    let t = state.threads.iter().find(|t| t.id == thread.0)?;
    let f = t.frames.iter().find(|f| f.id == frame)?;
    f.locals
      .iter()
      .find(|l| l.info.name == name)
      .map(|l| l.value.clone())
  }

  /// Creates a script object with data properties; returns a value usable
  /// as a frame local.
  pub fn new_script_object(
    &self,
    js_class: &str,
    props: Vec<(&str, FakeProp)>,
  ) -> VmValue {
    let mut state = self.state.lock();
    let id = state.alloc(FakeObject::Script {
      class: "jdk.nashorn.internal.scripts.JO".to_string(),
      js_class: js_class.to_string(),
      props: props
        .into_iter()
        .map(|(name, prop)| (name.to_string(), prop))
        .collect(),
      proto: None,
    });
    VmValue::Object(ObjectRef {
      id,
      class_name: "jdk.nashorn.internal.scripts.JO".to_string(),
    })
  }

  pub fn new_hashtable(&self, entries: Vec<(&str, VmValue)>) -> VmValue {
    let mut state = self.state.lock();
    let entries: Vec<(String, VmValue)> = entries
      .into_iter()
      .map(|(name, value)| {
        (name.to_string(), value)
      })
      .collect();
    let id = state.alloc(FakeObject::Table(entries));
    VmValue::Object(ObjectRef {
      id,
      class_name: nashorn::HASHTABLE.to_string(),
    })
  }

  pub fn new_host_object(
    &self,
    class: &str,
    fields: Vec<(&str, VmValue)>,
  ) -> VmValue {
    let mut state = self.state.lock();
    let id = state.alloc(FakeObject::Host {
      class: class.to_string(),
      fields: fields
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect(),
    });
    VmValue::Object(ObjectRef {
      id,
      class_name: class.to_string(),
    })
  }

  pub fn new_string(&self, text: &str) -> VmValue {
    let mut state = self.state.lock();
    let id = state.alloc(FakeObject::Str(text.to_string()));
    VmValue::Object(ObjectRef {
      id,
      class_name: nashorn::JAVA_STRING.to_string(),
    })
  }

  pub fn new_function(&self) -> VmValue {
    self
      .state
      .lock()
      .alloc_value(FakeObject::Function(FakeFn::Opaque))
  }

  pub fn new_object_array(&self, values: Vec<VmValue>) -> VmValue {
    self
      .state
      .lock()
      .alloc_value(FakeObject::ObjectArray(values))
  }

  pub fn new_mirror(&self, entries: Vec<(&str, VmValue)>) -> VmValue {
    let mut state = self.state.lock();
    let id = state.alloc(FakeObject::Mirror(
      entries
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect(),
    ));
    VmValue::Object(ObjectRef {
      id,
      class_name: nashorn::SCRIPT_OBJECT_MIRROR.to_string(),
    })
  }
}

impl FakeState {
  fn alloc(&mut self, obj: FakeObject) -> u64 {
    self.next_object += 1;
    let id = self.next_object;
    self.objects.insert(id, obj);
    id
  }

  fn class_name_of(&self, obj: &FakeObject) -> String {
    match obj {
      FakeObject::Str(_) => nashorn::JAVA_STRING.to_string(),
      FakeObject::ObjectArray(_) => "java.lang.Object[]".to_string(),
      FakeObject::CharArray(_) => "char[]".to_string(),
      FakeObject::Host { class, .. } => class.clone(),
      FakeObject::Script { class, .. } => class.clone(),
      FakeObject::Wrapper { .. } => {
        "jdk.nashorn.internal.scripts.JO".to_string()
      }
      FakeObject::Mirror(_) => nashorn::SCRIPT_OBJECT_MIRROR.to_string(),
      FakeObject::Table(_) => nashorn::HASHTABLE.to_string(),
      FakeObject::Enumeration { .. } => {
        "java.util.Hashtable$Enumerator".to_string()
      }
      FakeObject::Function(_) => {
        "jdk.nashorn.internal.runtime.ScriptFunctionImpl".to_string()
      }
      FakeObject::Boxed { class, .. } => class.clone(),
      FakeObject::Undefined => nashorn::UNDEFINED.to_string(),
      FakeObject::EcmaException { .. } => nashorn::ECMA_EXCEPTION.to_string(),
    }
  }

  fn object_value(&mut self, id: u64) -> VmValue {
    let class_name = self
      .objects
      .get(&id)
      .map(|obj| self.class_name_of(obj))
      .unwrap_or_else(|| "java.lang.Object".to_string());
    VmValue::Object(ObjectRef { id, class_name })
  }

  fn alloc_value(&mut self, obj: FakeObject) -> VmValue {
    let id = self.alloc(obj);
    self.object_value(id)
  }

  fn new_request(
    &mut self,
    kind: EventRequestKind,
    location: Option<VmLocation>,
    class_pattern: Option<String>,
    caught: bool,
    uncaught: bool,
  ) -> RequestHandle {
    self.next_request += 1;
    let handle = RequestHandle {
      kind,
      id: self.next_request,
    };
    self.requests.push(FakeRequest {
      handle,
      location,
      class_pattern,
      caught,
      uncaught,
      cleared: false,
    });
    handle
  }

  /// Applies a write through a wrapper's accessor: updates the shadow
  /// field and appends to the change log, walking down to the wrapper
  /// that actually owns the name.
  fn wrapper_write(&mut self, wrapper: u64, name: &str, value: VmValue) -> bool {
    let parent = match self.objects.get_mut(&wrapper) {
      Some(FakeObject::Wrapper {
        names,
        shadows,
        changes,
        parent,
      }) => {
        if names.iter().any(|n| n == name) {
          let shadow_key = format!("||{name}");
          if let Some(slot) =
            shadows.iter_mut().find(|(key, _)| *key == shadow_key)
          {
            slot.1 = value.clone();
          } else {
            shadows.push((shadow_key, value.clone()));
          }
          changes.push((name.to_string(), value));
          return true;
        }
        *parent
      }
      _ => None,
    };
    match parent {
      Some(parent) => self.wrapper_write(parent, name, value),
      None => false,
    }
  }

  /// The native stand-in for the in-target property extractor: walks a
  /// fake object's properties and produces the flat 5-tuple array.
  fn run_extractor(
    &mut self,
    target: u64,
    only_own: bool,
    only_accessors: bool,
  ) -> VmValue {
    let mut flat: Vec<VmValue> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut current = Some(target);
    let mut own = true;
    while let Some(id) = current {
      let obj = match self.objects.get(&id) {
        Some(obj) => obj.clone(),
        None => break,
      };
      let mut next = None;
      match obj {
        FakeObject::Script { props, proto, .. } => {
          next = proto;
          for (name, prop) in props {
            if name.starts_with("||") || !seen.insert(name.clone()) {
              continue;
            }
            let (value, getter, setter) = match prop {
              FakeProp::Data(value) => (value, None, None),
              FakeProp::Accessor { getter, setter } => {
                (VmValue::Void, getter, setter)
              }
            };
            let accessor = getter.is_some() || setter.is_some();
            if only_accessors && !accessor {
              continue;
            }
            let mut flags = String::from("ce");
            if !accessor {
              flags.push('w');
            }
            if own {
              flags.push('o');
            }
            flat.push(self.alloc_value(FakeObject::Str(name)));
            flat.push(self.alloc_value(FakeObject::Str(flags)));
            flat.push(value);
            flat.push(getter.unwrap_or(VmValue::Null));
            flat.push(setter.unwrap_or(VmValue::Null));
          }
        }
        FakeObject::Wrapper {
          names,
          shadows,
          parent,
          ..
        } => {
          next = parent;
          for name in names {
            if !seen.insert(name.clone()) {
              continue;
            }
            if only_accessors {
              continue;
            }
            let shadow_key = format!("||{name}");
            let value = shadows
              .iter()
              .find(|(key, _)| *key == shadow_key)
              .map(|(_, value)| value.clone())
              .unwrap_or(VmValue::Null);
            let mut flags = String::from("cew");
            if own {
              flags.push('o');
            }
            flat.push(self.alloc_value(FakeObject::Str(name)));
            flat.push(self.alloc_value(FakeObject::Str(flags)));
            flat.push(value);
            flat.push(VmValue::Null);
            flat.push(VmValue::Null);
          }
        }
        _ => {}
      }
      if only_own {
        break;
      }
      own = false;
      current = next;
    }
    self.alloc_value(FakeObject::ObjectArray(flat))
  }

  /// The fake `Context.eval`: recognizes the host's generated factories
  /// and otherwise consults the canned expressions.
  fn fake_eval(&mut self, scope: u64, code: &str) -> VmResult<VmValue> {
    if code.contains("Object.defineProperty(obj, name") {
      let names: Vec<String> = FACTORY_NAMES_RE
        .captures(code)
        .and_then(|c| serde_json::from_str(&c[1]).ok())
        .unwrap_or_default();
      return Ok(self.alloc_value(FakeObject::Wrapper {
        parent: Some(scope),
        names,
        shadows: vec![],
        changes: vec![],
      }));
    }
    if code.contains("Object.getOwnPropertyNames") {
      return Ok(
        self.alloc_value(FakeObject::Function(FakeFn::PropertyExtractor)),
      );
    }

    let canned = self
      .canned
      .iter()
      .find(|(pattern, _)| code.contains(pattern.as_str()))
      .map(|(_, action)| action.clone());
    match canned {
      Some(CannedEval::Return(value)) => Ok(value),
      Some(CannedEval::ReturnMarker) => Ok(self.alloc_value(
        FakeObject::Str(crate::consts::EVALUATED_CODE_MARKER.to_string()),
      )),
      Some(CannedEval::MutateLocal { name, value }) => {
        let boxed = self.alloc_value(FakeObject::Boxed {
          class: "java.lang.Integer".to_string(),
          value: VmValue::Int(value),
        });
        self.wrapper_write(scope, &name, boxed.clone());
        Ok(boxed)
      }
      Some(CannedEval::Throw { message }) => {
        let name_value =
          self.alloc_value(FakeObject::Str("Error".to_string()));
        let message_value =
          self.alloc_value(FakeObject::Str(message.clone()));
        let error = self.alloc(FakeObject::Script {
          class: "jdk.nashorn.internal.objects.NativeError".to_string(),
          js_class: "Error".to_string(),
          props: vec![
            ("name".to_string(), FakeProp::Data(name_value)),
            ("message".to_string(), FakeProp::Data(message_value)),
          ],
          proto: None,
        });
        let exception = self.alloc(FakeObject::EcmaException {
          thrown: error,
          message,
        });
        let value = self.object_value(exception);
        match value {
          VmValue::Object(obj) => Err(VmErr::InvocationException(obj)),
          _ => unreachable!(),
        }
      }
      None => Ok(self.alloc_value(FakeObject::Undefined)),
    }
  }

  fn js_member(&mut self, receiver: u64, key: &str) -> VmValue {
    let obj = match self.objects.get(&receiver) {
      Some(obj) => obj.clone(),
      None => return VmValue::Null,
    };
    match obj {
      FakeObject::Wrapper {
        parent,
        shadows,
        changes,
        names,
      } => {
        if key == "||changes" {
          let pairs: Vec<VmValue> = changes
            .iter()
            .map(|(name, value)| {
              let name_value =
                self.alloc_value(FakeObject::Str(name.clone()));
              self.alloc_value(FakeObject::ObjectArray(vec![
                name_value,
                value.clone(),
              ]))
            })
            .collect();
          return self.alloc_value(FakeObject::ObjectArray(pairs));
        }
        if key == "||resetChanges" {
          return self.alloc_value(FakeObject::Function(
            FakeFn::ResetChanges { wrapper: receiver },
          ));
        }
        if let Some((_, value)) =
          shadows.iter().find(|(name, _)| name == key)
        {
          return value.clone();
        }
        if names.iter().any(|n| n == key) {
          let shadow_key = format!("||{key}");
          return shadows
            .iter()
            .find(|(name, _)| *name == shadow_key)
            .map(|(_, value)| value.clone())
            .unwrap_or(VmValue::Null);
        }
        match parent {
          Some(parent) => self.js_member(parent, key),
          None => VmValue::Null,
        }
      }
      FakeObject::Script { props, proto, .. } => {
        if let Some((_, prop)) = props.iter().find(|(name, _)| name == key)
        {
          return match prop {
            FakeProp::Data(value) => value.clone(),
            FakeProp::Accessor { .. } => VmValue::Null,
          };
        }
        match proto {
          Some(proto) => self.js_member(proto, key),
          None => VmValue::Null,
        }
      }
      _ => VmValue::Null,
    }
  }
}

#[async_trait]
impl Vm for FakeVm {
  async fn next_event_set(&self) -> Option<VmEventSet> {
    self.events.lock().await.recv().await
  }

  async fn resume_event_set(&self, _set: &VmEventSet) -> VmResult<()> {
    self.state.lock().resume_count += 1;
    Ok(())
  }

  async fn resume_all(&self) -> VmResult<()> {
    self.state.lock().resume_count += 1;
    Ok(())
  }

  async fn suspend_all(&self) -> VmResult<()> {
    self.state.lock().suspend_count += 1;
    Ok(())
  }

  async fn all_classes(&self) -> VmResult<Vec<RefType>> {
    Ok(
      self
        .state
        .lock()
        .classes
        .iter()
        .map(|c| RefType {
          id: ClassId(c.id),
          name: c.name.clone(),
        })
        .collect(),
    )
  }

  async fn line_locations(&self, class: ClassId) -> VmResult<Vec<VmLocation>> {
    let state = self.state.lock();
    let Some(fake) = state.classes.iter().find(|c| c.id == class.0) else {
      return Err(VmErr::Jdwp(JDWP_ABSENT_INFORMATION));
    };
    Ok(
      fake
        .methods
        .iter()
        .flat_map(|m| {
          m.lines.iter().map(|line| VmLocation {
            class,
            method: MethodId(m.id),
            code_index: *line as u64 * 100,
            line: *line,
          })
        })
        .collect(),
    )
  }

  async fn source_name(&self, class: ClassId) -> VmResult<Option<String>> {
    Ok(
      self
        .state
        .lock()
        .classes
        .iter()
        .find(|c| c.id == class.0)
        .and_then(|c| c.source_name.clone()),
    )
  }

  async fn method_location(
    &self,
    class: ClassId,
    method: &str,
  ) -> VmResult<Option<VmLocation>> {
    let state = self.state.lock();
    let Some(fake) = state.classes.iter().find(|c| c.id == class.0) else {
      return Ok(None);
    };
    Ok(fake.methods.iter().find(|m| m.name == method).map(|m| {
      let line = m.lines.first().copied().unwrap_or(0);
      VmLocation {
        class,
        method: MethodId(m.id),
        code_index: line as u64 * 100,
        line,
      }
    }))
  }

  async fn static_field(
    &self,
    class: ClassId,
    name: &str,
  ) -> VmResult<Option<VmValue>> {
    let mut state = self.state.lock();
    if name == nashorn::UNDEFINED_FIELD {
      let value = state.alloc_value(FakeObject::Undefined);
      return Ok(Some(value));
    }
    if name != nashorn::SOURCE_FIELD {
      return Ok(None);
    }
    let Some(idx) = state.classes.iter().position(|c| c.id == class.0)
    else {
      return Ok(None);
    };
    state.classes[idx].source_reads += 1;
    if state.classes[idx].source.is_none() {
      return Ok(None);
    }
    if state.classes[idx].source_delay > 0 {
      state.classes[idx].source_delay -= 1;
      return Ok(Some(VmValue::Null));
    }
    let source = state.classes[idx].source.clone().unwrap_or_default();
    let array = state.alloc(FakeObject::CharArray(source));
    let raw_data = state.alloc(FakeObject::Host {
      class: "jdk.nashorn.internal.runtime.Source$RawData".to_string(),
      fields: vec![(
        nashorn::RAW_DATA_ARRAY_FIELD.to_string(),
        VmValue::Object(ObjectRef {
          id: array,
          class_name: "char[]".to_string(),
        }),
      )],
    });
    let raw_data_value = state.object_value(raw_data);
    let source_obj = state.alloc(FakeObject::Host {
      class: "jdk.nashorn.internal.runtime.Source".to_string(),
      fields: vec![(nashorn::SOURCE_DATA_FIELD.to_string(), raw_data_value)],
    });
    let value = state.object_value(source_obj);
    Ok(Some(value))
  }

  async fn instance_field(
    &self,
    object: &ObjectRef,
    name: &str,
  ) -> VmResult<Option<VmValue>> {
    let mut state = self.state.lock();
    let Some(obj) = state.objects.get(&object.id).cloned() else {
      return Ok(None);
    };
    match obj {
      FakeObject::Host { fields, .. } => Ok(
        fields
          .iter()
          .find(|(field, _)| field == name)
          .map(|(_, value)| value.clone()),
      ),
      FakeObject::Boxed { value, .. }
        if name == nashorn::BOXED_VALUE_FIELD =>
      {
        Ok(Some(value))
      }
      FakeObject::EcmaException { thrown, .. }
        if name == nashorn::ECMA_EXCEPTION_THROWN_FIELD =>
      {
        Ok(Some(state.object_value(thrown)))
      }
      _ => Ok(None),
    }
  }

  async fn instance_fields(
    &self,
    object: &ObjectRef,
  ) -> VmResult<Vec<(String, VmValue)>> {
    let state = self.state.lock();
    match state.objects.get(&object.id) {
      Some(FakeObject::Host { fields, .. }) => Ok(fields.clone()),
      _ => Ok(vec![]),
    }
  }

  async fn instance_of(
    &self,
    object: &ObjectRef,
    class_name: &str,
  ) -> VmResult<bool> {
    let state = self.state.lock();
    let Some(obj) = state.objects.get(&object.id) else {
      return Ok(false);
    };
    Ok(match obj {
      FakeObject::Script { class, .. } => {
        class_name == nashorn::SCRIPT_OBJECT || class_name == class
      }
      FakeObject::Wrapper { .. } => class_name == nashorn::SCRIPT_OBJECT,
      FakeObject::Function(_) => {
        class_name == nashorn::SCRIPT_OBJECT
          || class_name == nashorn::SCRIPT_FUNCTION
      }
      FakeObject::Mirror(_) => class_name == nashorn::SCRIPT_OBJECT_MIRROR,
      FakeObject::Table(_) => class_name == nashorn::HASHTABLE,
      other => class_name == state.class_name_of(other),
    })
  }

  async fn read_string(&self, object: &ObjectRef) -> VmResult<String> {
    let state = self.state.lock();
    match state.objects.get(&object.id) {
      Some(FakeObject::Str(text)) => Ok(text.clone()),
      _ => Err(VmErr::Protocol("not a string object")),
    }
  }

  async fn create_string(&self, text: &str) -> VmResult<VmValue> {
    Ok(
      self
        .state
        .lock()
        .alloc_value(FakeObject::Str(text.to_string())),
    )
  }

  async fn array_length(&self, array: &ObjectRef) -> VmResult<usize> {
    let state = self.state.lock();
    match state.objects.get(&array.id) {
      Some(FakeObject::ObjectArray(values)) => Ok(values.len()),
      Some(FakeObject::CharArray(text)) => {
        Ok(text.encode_utf16().count())
      }
      _ => Err(VmErr::Protocol("not an array object")),
    }
  }

  async fn array_values(&self, array: &ObjectRef) -> VmResult<Vec<VmValue>> {
    let state = self.state.lock();
    match state.objects.get(&array.id) {
      Some(FakeObject::ObjectArray(values)) => Ok(values.clone()),
      Some(FakeObject::CharArray(text)) => {
        Ok(text.encode_utf16().map(VmValue::Char).collect())
      }
      _ => Err(VmErr::Protocol("not an array object")),
    }
  }

  async fn create_object_array(&self, length: usize) -> VmResult<ObjectRef> {
    let mut state = self.state.lock();
    let id = state.alloc(FakeObject::ObjectArray(vec![VmValue::Null; length]));
    Ok(ObjectRef {
      id,
      class_name: "java.lang.Object[]".to_string(),
    })
  }

  async fn set_array_element(
    &self,
    array: &ObjectRef,
    index: usize,
    value: &VmValue,
  ) -> VmResult<()> {
    let mut state = self.state.lock();
    match state.objects.get_mut(&array.id) {
      Some(FakeObject::ObjectArray(values)) if index < values.len() => {
        values[index] = value.clone();
        Ok(())
      }
      _ => Err(VmErr::Protocol("bad array store")),
    }
  }

  async fn all_threads(&self) -> VmResult<Vec<(ThreadId, String)>> {
    Ok(
      self
        .state
        .lock()
        .threads
        .iter()
        .map(|t| (ThreadId(t.id), t.name.clone()))
        .collect(),
    )
  }

  async fn frames(&self, thread: ThreadId) -> VmResult<Vec<FrameInfo>> {
    let state = self.state.lock();
    let Some(t) = state.threads.iter().find(|t| t.id == thread.0) else {
      return Ok(vec![]);
    };
    Ok(
      t.frames
        .iter()
        .map(|f| FrameInfo {
          id: f.id,
          location: f.location,
          method_name: f.method_name.clone(),
        })
        .collect(),
    )
  }

  async fn visible_variables(
    &self,
    thread: ThreadId,
    frame: u64,
  ) -> VmResult<Vec<VariableInfo>> {
    let state = self.state.lock();
    let Some(t) = state.threads.iter().find(|t| t.id == thread.0) else {
      return Ok(vec![]);
    };
    let Some(f) = t.frames.iter().find(|f| f.id == frame) else {
      return Ok(vec![]);
    };
    Ok(f.locals.iter().map(|l| l.info.clone()).collect())
  }

  async fn local_values(
    &self,
    thread: ThreadId,
    frame: u64,
    vars: &[VariableInfo],
  ) -> VmResult<Vec<VmValue>> {
    let state = self.state.lock();
    let t = state
      .threads
      .iter()
      .find(|t| t.id == thread.0)
      .ok_or(VmErr::Protocol("unknown thread"))?;
    let f = t
      .frames
      .iter()
      .find(|f| f.id == frame)
      .ok_or(VmErr::Protocol("unknown frame"))?;
    let mut values = Vec::with_capacity(vars.len());
    for var in vars {
      let local = f
        .locals
        .iter()
        .find(|l| l.info.slot == var.slot)
        .ok_or(VmErr::Jdwp(crate::res::JDWP_INVALID_SLOT))?;
      if let Some(code) = local.fail {
        return Err(VmErr::Jdwp(code));
      }
      values.push(local.value.clone());
    }
    Ok(values)
  }

  async fn local_value(
    &self,
    thread: ThreadId,
    frame: u64,
    var: &VariableInfo,
  ) -> VmResult<VmValue> {
    let state = self.state.lock();
    let t = state
      .threads
      .iter()
      .find(|t| t.id == thread.0)
      .ok_or(VmErr::Protocol("unknown thread"))?;
    let f = t
      .frames
      .iter()
      .find(|f| f.id == frame)
      .ok_or(VmErr::Protocol("unknown frame"))?;
    let local = f
      .locals
      .iter()
      .find(|l| l.info.slot == var.slot)
      .ok_or(VmErr::Jdwp(crate::res::JDWP_INVALID_SLOT))?;
    if let Some(code) = local.fail {
      return Err(VmErr::Jdwp(code));
    }
    Ok(local.value.clone())
  }

  async fn set_local_value(
    &self,
    thread: ThreadId,
    frame: u64,
    var: &VariableInfo,
    value: &VmValue,
  ) -> VmResult<()> {
    let mut state = self.state.lock();
    let t = state
      .threads
      .iter_mut()
      .find(|t| t.id == thread.0)
      .ok_or(VmErr::Protocol("unknown thread"))?;
    let f = t
      .frames
      .iter_mut()
      .find(|f| f.id == frame)
      .ok_or(VmErr::Protocol("unknown frame"))?;
    let local = f
      .locals
      .iter_mut()
      .find(|l| l.info.slot == var.slot)
      .ok_or(VmErr::Jdwp(crate::res::JDWP_INVALID_SLOT))?;
    local.value = value.clone();
    Ok(())
  }

  async fn invoke_static(
    &self,
    class: ClassId,
    method: &str,
    _signature: &str,
    args: &[VmValue],
    _thread: ThreadId,
  ) -> VmResult<VmValue> {
    let mut state = self.state.lock();
    let class_name = state
      .classes
      .iter()
      .find(|c| c.id == class.0)
      .map(|c| c.name.clone())
      .unwrap_or_default();

    match (class_name.as_str(), method) {
      (name, "getGlobal") if name == nashorn::CONTEXT => {
        let global = state.global;
        Ok(state.object_value(global))
      }
      (name, "apply") if name == nashorn::SCRIPT_RUNTIME => {
        let func = args
          .first()
          .and_then(VmValue::as_object)
          .ok_or(VmErr::Protocol("apply without function"))?;
        let call_args: Vec<VmValue> = match args
          .get(2)
          .and_then(VmValue::as_object)
          .and_then(|arr| state.objects.get(&arr.id).cloned())
        {
          Some(FakeObject::ObjectArray(values)) => values,
          _ => vec![],
        };
        let kind = match state.objects.get(&func.id) {
          Some(FakeObject::Function(kind)) => kind.clone(),
          _ => return Err(VmErr::Protocol("apply on non-function")),
        };
        match kind {
          FakeFn::PropertyExtractor => {
            let target = call_args
              .first()
              .and_then(VmValue::as_object)
              .map(|o| o.id)
              .ok_or(VmErr::Protocol("extractor without target"))?;
            let only_own = boxed_bool(&mut state, call_args.get(1));
            let only_accessors =
              boxed_bool(&mut state, call_args.get(2));
            Ok(state.run_extractor(target, only_own, only_accessors))
          }
          FakeFn::ResetChanges { wrapper } => {
            if let Some(FakeObject::Wrapper { changes, .. }) =
              state.objects.get_mut(&wrapper)
            {
              changes.clear();
            }
            Ok(state.alloc_value(FakeObject::Undefined))
          }
          FakeFn::Opaque => Ok(state.alloc_value(FakeObject::Undefined)),
        }
      }
      (_, "valueOf") => Ok(state.alloc_value(FakeObject::Boxed {
        class: class_name,
        value: args.first().cloned().unwrap_or(VmValue::Null),
      })),
      _ => Err(VmErr::EngineMismatch(format!(
        "unexpected static invoke {class_name}.{method}"
      ))),
    }
  }

  async fn invoke_instance(
    &self,
    object: &ObjectRef,
    method: &str,
    _signature: &str,
    args: &[VmValue],
    _thread: ThreadId,
  ) -> VmResult<VmValue> {
    let mut state = self.state.lock();
    let receiver = state
      .objects
      .get(&object.id)
      .cloned()
      .ok_or(VmErr::Protocol("invoke on unknown object"))?;

    match (receiver, method) {
      (FakeObject::Script { class, .. }, "getContext")
        if class == nashorn::GLOBAL =>
      {
        let context = state.context;
        Ok(state.object_value(context))
      }
      (FakeObject::Host { class, .. }, "eval")
        if class == nashorn::CONTEXT =>
      {
        let scope = args
          .first()
          .and_then(VmValue::as_object)
          .map(|o| o.id)
          .ok_or(VmErr::Protocol("eval without scope"))?;
        let code = match args.get(1).and_then(VmValue::as_object) {
          Some(code_obj) => match state.objects.get(&code_obj.id) {
            Some(FakeObject::Str(code)) => code.clone(),
            _ => return Err(VmErr::Protocol("eval without code")),
          },
          None => return Err(VmErr::Protocol("eval without code")),
        };
        state.fake_eval(scope, &code)
      }
      (FakeObject::Wrapper { .. }, "put")
      | (FakeObject::Script { .. }, "put") => {
        let key = match args.first().and_then(VmValue::as_object) {
          Some(key_obj) => match state.objects.get(&key_obj.id) {
            Some(FakeObject::Str(key)) => key.clone(),
            _ => return Err(VmErr::Protocol("put with non-string key")),
          },
          None => return Err(VmErr::Protocol("put without key")),
        };
        let value = args.get(1).cloned().unwrap_or(VmValue::Null);
        match state.objects.get_mut(&object.id) {
          Some(FakeObject::Wrapper { shadows, .. }) => {
            if let Some(slot) =
              shadows.iter_mut().find(|(name, _)| *name == key)
            {
              slot.1 = value;
            } else {
              shadows.push((key, value));
            }
          }
          Some(FakeObject::Script { props, .. }) => {
            props.push((key, FakeProp::Data(value)));
          }
          _ => {}
        }
        Ok(VmValue::Null)
      }
      (FakeObject::Wrapper { .. }, "get")
      | (FakeObject::Script { .. }, "get") => {
        let key = match args.first().and_then(VmValue::as_object) {
          Some(key_obj) => match state.objects.get(&key_obj.id) {
            Some(FakeObject::Str(key)) => key.clone(),
            _ => return Ok(VmValue::Null),
          },
          None => return Ok(VmValue::Null),
        };
        Ok(state.js_member(object.id, &key))
      }
      (FakeObject::Table(entries), "get") => {
        let key = match args.first().and_then(VmValue::as_object) {
          Some(key_obj) => match state.objects.get(&key_obj.id) {
            Some(FakeObject::Str(key)) => key.clone(),
            _ => return Ok(VmValue::Null),
          },
          None => return Ok(VmValue::Null),
        };
        Ok(
          entries
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.clone())
            .unwrap_or(VmValue::Null),
        )
      }
      (FakeObject::Script { props, .. }, "getOwnKeys") => {
        let keys: Vec<VmValue> = props
          .iter()
          .map(|(name, _)| state.alloc_value(FakeObject::Str(name.clone())))
          .collect::<Vec<_>>();
        Ok(state.alloc_value(FakeObject::ObjectArray(keys)))
      }
      (FakeObject::Script { proto, .. }, "getProto") => Ok(match proto {
        Some(proto) => state.object_value(proto),
        None => VmValue::Null,
      }),
      (FakeObject::Wrapper { parent, .. }, "getProto") => {
        Ok(match parent {
          Some(parent) => state.object_value(parent),
          None => VmValue::Null,
        })
      }
      (FakeObject::Script { js_class, .. }, "getClassName") => {
        Ok(state.alloc_value(FakeObject::Str(js_class)))
      }
      (FakeObject::Function(_), "getName") => {
        Ok(state.alloc_value(FakeObject::Str("anonymous".to_string())))
      }
      (FakeObject::Function(_), "toSource") => {
        Ok(state.alloc_value(FakeObject::Str(
          "function anonymous() {}".to_string(),
        )))
      }
      (FakeObject::Mirror(entries), "keySet") => {
        let keys: Vec<VmValue> = entries
          .iter()
          .map(|(name, _)| state.alloc_value(FakeObject::Str(name.clone())))
          .collect::<Vec<_>>();
        // A set whose toArray answers the keys.
        Ok(state.alloc_value(FakeObject::ObjectArray(keys)))
      }
      (FakeObject::ObjectArray(values), "toArray") => {
        Ok(state.alloc_value(FakeObject::ObjectArray(values)))
      }
      (FakeObject::Mirror(entries), "getMember") => {
        let key = match args.first().and_then(VmValue::as_object) {
          Some(key_obj) => match state.objects.get(&key_obj.id) {
            Some(FakeObject::Str(key)) => key.clone(),
            _ => return Ok(VmValue::Null),
          },
          None => return Ok(VmValue::Null),
        };
        Ok(
          entries
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.clone())
            .unwrap_or(VmValue::Null),
        )
      }
      (FakeObject::Mirror(entries), "getSlot") => {
        let index = match args.first() {
          Some(VmValue::Int(i)) => *i as usize,
          _ => return Ok(VmValue::Null),
        };
        Ok(
          entries
            .get(index)
            .map(|(_, value)| value.clone())
            .unwrap_or(VmValue::Null),
        )
      }
      (FakeObject::Table(entries), "keys") => {
        Ok(state.alloc_value(FakeObject::Enumeration {
          keys: entries,
          pos: 0,
        }))
      }
      (FakeObject::Enumeration { keys, pos }, "hasMoreElements") => {
        Ok(VmValue::Boolean(pos < keys.len()))
      }
      (FakeObject::Enumeration { keys, pos }, "nextElement") => {
        let key = keys
          .get(pos)
          .map(|(name, _)| name.clone())
          .unwrap_or_default();
        if let Some(FakeObject::Enumeration { pos, .. }) =
          state.objects.get_mut(&object.id)
        {
          *pos += 1;
        }
        Ok(state.alloc_value(FakeObject::Str(key)))
      }
      (FakeObject::Boxed { value, .. }, "toString") => {
        let text = match value {
          VmValue::Int(i) => i.to_string(),
          VmValue::Long(l) => l.to_string(),
          VmValue::Double(d) => d.to_string(),
          VmValue::Boolean(b) => b.to_string(),
          _ => String::new(),
        };
        Ok(state.alloc_value(FakeObject::Str(text)))
      }
      (FakeObject::Str(text), "toString") => {
        Ok(state.alloc_value(FakeObject::Str(text)))
      }
      (FakeObject::Script { js_class, .. }, "toString") => {
        Ok(state.alloc_value(FakeObject::Str(format!(
          "[object {js_class}]"
        ))))
      }
      (FakeObject::EcmaException { message, .. }, "getMessage") => {
        Ok(state.alloc_value(FakeObject::Str(message)))
      }
      (receiver, method) => {
        let class = state.class_name_of(&receiver);
        Err(VmErr::EngineMismatch(format!(
          "unexpected instance invoke {class}.{method}"
        )))
      }
    }
  }

  async fn set_breakpoint_request(
    &self,
    location: &VmLocation,
  ) -> VmResult<RequestHandle> {
    Ok(self.state.lock().new_request(
      EventRequestKind::Breakpoint,
      Some(*location),
      None,
      false,
      false,
    ))
  }

  async fn set_class_prepare_request(&self) -> VmResult<RequestHandle> {
    Ok(self.state.lock().new_request(
      EventRequestKind::ClassPrepare,
      None,
      None,
      false,
      false,
    ))
  }

  async fn set_exception_request(
    &self,
    class_pattern: &str,
    caught: bool,
    uncaught: bool,
  ) -> VmResult<RequestHandle> {
    Ok(self.state.lock().new_request(
      EventRequestKind::Exception,
      None,
      Some(class_pattern.to_string()),
      caught,
      uncaught,
    ))
  }

  async fn set_method_entry_request(
    &self,
    class_pattern: &str,
  ) -> VmResult<RequestHandle> {
    Ok(self.state.lock().new_request(
      EventRequestKind::MethodEntry,
      None,
      Some(class_pattern.to_string()),
      false,
      false,
    ))
  }

  async fn set_method_exit_request(
    &self,
    class_pattern: &str,
  ) -> VmResult<RequestHandle> {
    Ok(self.state.lock().new_request(
      EventRequestKind::MethodExit,
      None,
      Some(class_pattern.to_string()),
      false,
      false,
    ))
  }

  async fn clear_request(&self, handle: RequestHandle) -> VmResult<()> {
    let mut state = self.state.lock();
    if let Some(request) = state
      .requests
      .iter_mut()
      .find(|r| r.handle == handle && !r.cleared)
    {
      request.cleared = true;
    }
    Ok(())
  }
}

fn boxed_bool(state: &mut FakeState, value: Option<&VmValue>) -> bool {
  match value {
    Some(VmValue::Boolean(b)) => *b,
    Some(VmValue::Object(obj)) => matches!(
      state.objects.get(&obj.id),
      Some(FakeObject::Boxed {
        value: VmValue::Boolean(true),
        ..
      })
    ),
    _ => false,
  }
}
