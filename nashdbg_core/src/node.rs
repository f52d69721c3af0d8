//! Externally visible value model: remote object ids, value nodes and
//! property descriptors handed to the protocol layer.

use compact_str::CompactString;
use serde::Deserialize;
use serde::Serialize;

/// Process-unique script id.
pub type ScriptId = CompactString;

/// Breakpoint id handed out by `set_breakpoint`.
pub type BreakpointId = CompactString;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// Remote object id, unique within one pause session. Serializable to and
/// from JSON so the protocol layer can round-trip it.
pub struct ObjectId(pub CompactString);

impl ObjectId {
  pub fn new(value: impl Into<CompactString>) -> Self {
    Self(value.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for ObjectId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// A 1-based script position.
pub struct ScriptLocation {
  pub line: u32,
  pub column: Option<u32>,
}

impl ScriptLocation {
  pub fn new(line: u32, column: Option<u32>) -> Self {
    Self { line, column }
  }
}

#[derive(Debug, Clone, PartialEq)]
/// A scalar surfaced from the target VM.
pub enum SimpleValue {
  Undefined,
  Null,
  Bool(bool),
  Number(f64),
  Str(String),
}

#[derive(Debug, Clone, PartialEq)]
/// Error data recovered from a thrown or inspected script error.
pub struct ErrorValue {
  pub name: String,
  pub message: String,
  pub stack: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
/// A value marshalled out of the target VM. Complex variants carry a remote
/// object id; children are re-requested by id, which also breaks cycles.
pub enum ValueNode {
  Simple(SimpleValue),
  Object {
    class_name: String,
    id: ObjectId,
  },
  Array {
    length: usize,
    id: ObjectId,
  },
  Function {
    name: String,
    source: Option<String>,
    id: ObjectId,
  },
  Date {
    string_repr: String,
    id: ObjectId,
  },
  RegExp {
    string_repr: String,
    id: ObjectId,
  },
  Error {
    data: ErrorValue,
    id: ObjectId,
  },
  Empty,
}

impl ValueNode {
  pub fn undefined() -> Self {
    ValueNode::Simple(SimpleValue::Undefined)
  }

  pub fn null() -> Self {
    ValueNode::Simple(SimpleValue::Null)
  }

  /// The remote object id, if this node refers to a complex value.
  pub fn object_id(&self) -> Option<&ObjectId> {
    match self {
      ValueNode::Object { id, .. }
      | ValueNode::Array { id, .. }
      | ValueNode::Function { id, .. }
      | ValueNode::Date { id, .. }
      | ValueNode::RegExp { id, .. }
      | ValueNode::Error { id, .. } => Some(id),
      ValueNode::Simple(_) | ValueNode::Empty => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Property descriptor kind.
pub enum PropertyKind {
  Data,
  Accessor,
  Generic,
}

#[derive(Debug, Clone, PartialEq)]
/// A property descriptor extracted from a remote object.
pub struct ObjectPropertyDescriptor {
  kind: PropertyKind,
  pub configurable: bool,
  pub enumerable: bool,
  pub writable: bool,
  pub is_own: bool,
  pub value: Option<ValueNode>,
  pub getter: Option<ValueNode>,
  pub setter: Option<ValueNode>,
}

impl ObjectPropertyDescriptor {
  /// Builds a descriptor, enforcing that data descriptors carry a value and
  /// accessor descriptors carry at least one of getter/setter.
  pub fn new(
    kind: PropertyKind,
    configurable: bool,
    enumerable: bool,
    writable: bool,
    is_own: bool,
    value: Option<ValueNode>,
    getter: Option<ValueNode>,
    setter: Option<ValueNode>,
  ) -> Self {
    match kind {
      PropertyKind::Data => debug_assert!(value.is_some()),
      PropertyKind::Accessor => {
        debug_assert!(getter.is_some() || setter.is_some())
      }
      PropertyKind::Generic => {}
    }
    Self {
      kind,
      configurable,
      enumerable,
      writable,
      is_own,
      value,
      getter,
      setter,
    }
  }

  /// Shorthand for a plain data descriptor.
  pub fn data(value: ValueNode, writable: bool, is_own: bool) -> Self {
    Self::new(
      PropertyKind::Data,
      false,
      true,
      writable,
      is_own,
      Some(value),
      None,
      None,
    )
  }

  pub fn kind(&self) -> PropertyKind {
    self.kind
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Insertion-ordered `name -> descriptor` map returned by property
/// extraction.
pub struct PropertiesMap {
  entries: Vec<(CompactString, ObjectPropertyDescriptor)>,
}

impl PropertiesMap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn contains_key(&self, name: &str) -> bool {
    self.entries.iter().any(|(n, _)| n == name)
  }

  pub fn get(&self, name: &str) -> Option<&ObjectPropertyDescriptor> {
    self.entries.iter().find(|(n, _)| n == name).map(|(_, d)| d)
  }

  /// Inserts unless the name is already present. Own properties shadow
  /// prototype properties because the own level is walked first.
  pub fn insert_if_absent(
    &mut self,
    name: impl Into<CompactString>,
    descriptor: ObjectPropertyDescriptor,
  ) {
    let name = name.into();
    if !self.contains_key(&name) {
      self.entries.push((name, descriptor));
    }
  }

  pub fn iter(
    &self,
  ) -> impl Iterator<Item = &(CompactString, ObjectPropertyDescriptor)> {
    self.entries.iter()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Scope classification in a frame's scope chain.
pub enum ScopeKind {
  Local,
  Closure,
  With,
  Global,
}

#[derive(Debug, Clone, PartialEq)]
/// One entry of a stack frame's scope chain.
pub struct Scope {
  pub kind: ScopeKind,
  pub object: ValueNode,
}

#[derive(Debug, Clone, PartialEq)]
/// A paused stack frame as handed to subscribers. Evaluation against the
/// frame goes through the host surface with this frame's `id`.
pub struct StackFrameView {
  pub id: CompactString,
  pub this_value: ValueNode,
  pub scope_chain: Vec<Scope>,
  pub script_id: ScriptId,
  pub location: ScriptLocation,
  pub function_name: String,
}

#[derive(Debug, Clone, PartialEq)]
/// Outcome of evaluating an expression on a stack frame. `thrown` is set
/// when the expression terminated by throwing; the node then describes the
/// thrown value rather than a result.
pub struct EvalResult {
  pub node: ValueNode,
  pub thrown: bool,
}
