//! Mirror seam over the attached VM.
//!
//! The debugger host only ever talks to the target through the [`Vm`]
//! trait. The production implementation is [`jdwp_vm::JdwpVm`]; tests drive
//! the host with an in-memory fake.

use crate::res::VmResult;
use async_trait::async_trait;

pub mod jdwp_vm;
pub mod nashorn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Reference-type (class) id in the target VM.
pub struct ClassId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Method id, scoped to its declaring reference type.
pub struct MethodId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Thread object id in the target VM.
pub struct ThreadId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
/// A loaded reference type, with its binary name in dotted form.
pub struct RefType {
  pub id: ClassId,
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// An object reference together with its resolved runtime class name
/// (dotted form, arrays as `java.lang.Object[]`).
pub struct ObjectRef {
  pub id: u64,
  pub class_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// An executable position in the target VM, with the source line already
/// resolved from the method's line table.
pub struct VmLocation {
  pub class: ClassId,
  pub method: MethodId,
  pub code_index: u64,
  pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A slot in a method's local-variable table.
pub struct VariableInfo {
  pub name: String,
  pub slot: u32,
  pub signature: String,
}

#[derive(Debug, Clone)]
/// One frame of a suspended thread.
pub struct FrameInfo {
  pub id: u64,
  pub location: VmLocation,
  pub method_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Event-request kinds the host manages.
pub enum EventRequestKind {
  Breakpoint,
  ClassPrepare,
  Exception,
  MethodEntry,
  MethodExit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Handle to an installed event request; needed to clear it again.
pub struct RequestHandle {
  pub kind: EventRequestKind,
  pub id: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Suspend policy attached to a delivered event set.
pub enum SuspendPolicy {
  None,
  EventThread,
  All,
}

#[derive(Debug, Clone, PartialEq)]
/// A value read from the target VM.
pub enum VmValue {
  Void,
  Null,
  Boolean(bool),
  Byte(i8),
  Short(i16),
  Char(u16),
  Int(i32),
  Long(i64),
  Float(f32),
  Double(f64),
  Object(ObjectRef),
}

impl VmValue {
  pub fn as_object(&self) -> Option<&ObjectRef> {
    match self {
      VmValue::Object(obj) => Some(obj),
      _ => None,
    }
  }

  pub fn is_null(&self) -> bool {
    matches!(self, VmValue::Null)
  }

  /// Numeric view used when marshalling primitives to script numbers.
  pub fn as_number(&self) -> Option<f64> {
    match self {
      VmValue::Byte(v) => Some(*v as f64),
      VmValue::Short(v) => Some(*v as f64),
      VmValue::Char(v) => Some(*v as f64),
      VmValue::Int(v) => Some(*v as f64),
      VmValue::Long(v) => Some(*v as f64),
      VmValue::Float(v) => Some(*v as f64),
      VmValue::Double(v) => Some(*v),
      _ => None,
    }
  }
}

#[derive(Debug, Clone)]
/// A decoded VM event.
pub enum VmEvent {
  VmStart,
  VmDeath,
  Breakpoint {
    request: i32,
    thread: ThreadId,
    location: VmLocation,
  },
  ClassPrepare {
    class: RefType,
  },
  Exception {
    request: i32,
    thread: ThreadId,
    location: VmLocation,
    exception: ObjectRef,
    caught: bool,
  },
  MethodEntry {
    request: i32,
    thread: ThreadId,
    location: VmLocation,
  },
  MethodExit {
    request: i32,
    thread: ThreadId,
    location: VmLocation,
  },
}

#[derive(Debug, Clone)]
/// A set of events delivered together, sharing one suspend policy.
pub struct VmEventSet {
  pub suspend_policy: SuspendPolicy,
  pub events: Vec<VmEvent>,
}

#[async_trait]
/// The exact VM surface the debugger host consumes.
///
/// Every method that invokes code in the target (`invoke_*`,
/// `create_string`, array creation) requires a thread suspended by an
/// event; invocation temporarily resumes that thread, invalidating frames
/// read before it.
pub trait Vm: Send + Sync + 'static {
  /// Next event set from the target, `None` once disconnected.
  async fn next_event_set(&self) -> Option<VmEventSet>;

  /// Undoes the suspension performed by the given event set.
  async fn resume_event_set(&self, set: &VmEventSet) -> VmResult<()>;

  async fn resume_all(&self) -> VmResult<()>;

  async fn suspend_all(&self) -> VmResult<()>;

  async fn all_classes(&self) -> VmResult<Vec<RefType>>;

  /// Every executable line location of the type; empty when the class
  /// carries no line information.
  async fn line_locations(&self, class: ClassId) -> VmResult<Vec<VmLocation>>;

  /// The source file name recorded for the type, if any.
  async fn source_name(&self, class: ClassId) -> VmResult<Option<String>>;

  /// First line location of the named method, if the method exists.
  async fn method_location(
    &self,
    class: ClassId,
    method: &str,
  ) -> VmResult<Option<VmLocation>>;

  /// Reads a static field. `Ok(None)` means the field does not exist on
  /// the type (an engine-layout mismatch, distinct from a null value).
  async fn static_field(
    &self,
    class: ClassId,
    name: &str,
  ) -> VmResult<Option<VmValue>>;

  /// Reads an instance field by name, `Ok(None)` when absent on the type.
  async fn instance_field(
    &self,
    object: &ObjectRef,
    name: &str,
  ) -> VmResult<Option<VmValue>>;

  /// All declared instance fields with their current values.
  async fn instance_fields(
    &self,
    object: &ObjectRef,
  ) -> VmResult<Vec<(String, VmValue)>>;

  /// Whether the object's runtime type is, extends, or implements the
  /// named class/interface.
  async fn instance_of(
    &self,
    object: &ObjectRef,
    class_name: &str,
  ) -> VmResult<bool>;

  async fn read_string(&self, object: &ObjectRef) -> VmResult<String>;

  async fn create_string(&self, text: &str) -> VmResult<VmValue>;

  async fn array_length(&self, array: &ObjectRef) -> VmResult<usize>;

  async fn array_values(&self, array: &ObjectRef) -> VmResult<Vec<VmValue>>;

  /// Creates a `java.lang.Object[]` of the given length in the target.
  async fn create_object_array(&self, length: usize) -> VmResult<ObjectRef>;

  async fn set_array_element(
    &self,
    array: &ObjectRef,
    index: usize,
    value: &VmValue,
  ) -> VmResult<()>;

  async fn all_threads(&self) -> VmResult<Vec<(ThreadId, String)>>;

  async fn frames(&self, thread: ThreadId) -> VmResult<Vec<FrameInfo>>;

  /// Local-variable slots visible at the frame's current location.
  async fn visible_variables(
    &self,
    thread: ThreadId,
    frame: u64,
  ) -> VmResult<Vec<VariableInfo>>;

  /// Batch read of the given slots. Fails as a whole; the caller degrades
  /// to [`Vm::local_value`] on `INVALID_SLOT`.
  async fn local_values(
    &self,
    thread: ThreadId,
    frame: u64,
    vars: &[VariableInfo],
  ) -> VmResult<Vec<VmValue>>;

  async fn local_value(
    &self,
    thread: ThreadId,
    frame: u64,
    var: &VariableInfo,
  ) -> VmResult<VmValue>;

  async fn set_local_value(
    &self,
    thread: ThreadId,
    frame: u64,
    var: &VariableInfo,
    value: &VmValue,
  ) -> VmResult<()>;

  async fn invoke_static(
    &self,
    class: ClassId,
    method: &str,
    signature: &str,
    args: &[VmValue],
    thread: ThreadId,
  ) -> VmResult<VmValue>;

  async fn invoke_instance(
    &self,
    object: &ObjectRef,
    method: &str,
    signature: &str,
    args: &[VmValue],
    thread: ThreadId,
  ) -> VmResult<VmValue>;

  async fn set_breakpoint_request(
    &self,
    location: &VmLocation,
  ) -> VmResult<RequestHandle>;

  async fn set_class_prepare_request(&self) -> VmResult<RequestHandle>;

  async fn set_exception_request(
    &self,
    class_pattern: &str,
    caught: bool,
    uncaught: bool,
  ) -> VmResult<RequestHandle>;

  async fn set_method_entry_request(
    &self,
    class_pattern: &str,
  ) -> VmResult<RequestHandle>;

  async fn set_method_exit_request(
    &self,
    class_pattern: &str,
  ) -> VmResult<RequestHandle>;

  async fn clear_request(&self, handle: RequestHandle) -> VmResult<()>;
}
