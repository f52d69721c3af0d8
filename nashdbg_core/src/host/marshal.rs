//! Remote object registry and VM-value marshalling.
//!
//! Marshalling is shallow: complex values become nodes carrying a remote
//! object id, and children are re-requested by id. That same indirection
//! breaks cycles in extracted object graphs.

use crate::host::DebuggerHost;
use crate::host::bus::DebuggerEvent;
use crate::node::ErrorValue;
use crate::node::ObjectId;
use crate::node::SimpleValue;
use crate::node::ValueNode;
use crate::prelude::*;
use crate::vm::ObjectRef;
use crate::vm::ThreadId;
use crate::vm::Vm;
use crate::vm::VmValue;
use crate::vm::nashorn;
use compact_str::format_compact;
use tracing::warn;

#[derive(Debug, Clone)]
/// What the registry remembers per handed-out object id.
pub struct ObjectEntry {
  /// The raw VM value behind the id; `None` for purely synthetic nodes.
  pub raw: Option<VmValue>,
  pub node: ValueNode,
  /// Extra descriptors merged into property extraction (error details).
  pub extra: Vec<(String, ValueNode)>,
}

#[derive(Debug, Default)]
/// Process-wide object map, valid only during a pause. The id sequence is
/// never reset, so an id from a previous pause can never resolve again.
pub struct ObjectRegistry {
  by_id: HashMap<ObjectId, ObjectEntry>,
  seq: u64,
}

impl ObjectRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  fn next_id(&mut self) -> ObjectId {
    self.seq += 1;
    ObjectId(format_compact!("$$obj-{}", self.seq))
  }

  /// Registers a value under a fresh id; `make` builds the node around it.
  pub fn insert_with(
    &mut self,
    raw: Option<VmValue>,
    make: impl FnOnce(ObjectId) -> ValueNode,
  ) -> ValueNode {
    let id = self.next_id();
    let node = make(id.clone());
    self.by_id.insert(
      id,
      ObjectEntry {
        raw,
        node: node.clone(),
        extra: vec![],
      },
    );
    node
  }

  /// Registers under a caller-chosen id (synthetic locals scopes).
  pub fn insert_named(
    &mut self,
    id: ObjectId,
    raw: Option<VmValue>,
    node: ValueNode,
  ) {
    self.by_id.insert(
      id,
      ObjectEntry {
        raw,
        node,
        extra: vec![],
      },
    );
  }

  pub fn set_extra(&mut self, id: &ObjectId, extra: Vec<(String, ValueNode)>) {
    if let Some(entry) = self.by_id.get_mut(id) {
      entry.extra = extra;
    }
  }

  pub fn get(&self, id: &ObjectId) -> Option<&ObjectEntry> {
    self.by_id.get(id)
  }

  pub fn clear(&mut self) {
    self.by_id.clear();
  }
}

impl<V: Vm> DebuggerHost<V> {
  /// Marshals a raw VM value to a node, registering complex values in the
  /// object registry. Best effort: inspection failures degrade to a plain
  /// object node rather than failing the pause.
  pub(crate) async fn marshal_value(
    &mut self,
    thread: ThreadId,
    value: &VmValue,
  ) -> ValueNode {
    match value {
      VmValue::Void => ValueNode::undefined(),
      VmValue::Null => ValueNode::null(),
      VmValue::Boolean(b) => ValueNode::Simple(SimpleValue::Bool(*b)),
      VmValue::Char(c) => ValueNode::Simple(SimpleValue::Str(
        char::from_u32(*c as u32).unwrap_or('\u{fffd}').to_string(),
      )),
      VmValue::Byte(_)
      | VmValue::Short(_)
      | VmValue::Int(_)
      | VmValue::Long(_)
      | VmValue::Float(_)
      | VmValue::Double(_) => ValueNode::Simple(SimpleValue::Number(
        value.as_number().unwrap_or(f64::NAN),
      )),
      VmValue::Object(obj) => self.marshal_object(thread, obj, 0).await,
    }
  }

  async fn marshal_object(
    &mut self,
    thread: ThreadId,
    obj: &ObjectRef,
    depth: u8,
  ) -> ValueNode {
    let vm = self.vm.clone();
    let class = obj.class_name.as_str();

    if class == nashorn::JAVA_STRING {
      return match vm.read_string(obj).await {
        Ok(text) => ValueNode::Simple(SimpleValue::Str(text)),
        Err(err) => {
          warn!("cannot read string value: {err}");
          self.plain_object_node(obj)
        }
      };
    }
    if class == nashorn::UNDEFINED {
      return ValueNode::undefined();
    }
    if nashorn::is_boxed_primitive(class) {
      if let Ok(Some(inner)) =
        vm.instance_field(obj, nashorn::BOXED_VALUE_FIELD).await
      {
        return match inner {
          VmValue::Boolean(b) => ValueNode::Simple(SimpleValue::Bool(b)),
          other => ValueNode::Simple(SimpleValue::Number(
            other.as_number().unwrap_or(f64::NAN),
          )),
        };
      }
      return self.plain_object_node(obj);
    }
    if class == nashorn::CONS_STRING {
      if let Some(text) =
        self.stringify(thread, &VmValue::Object(obj.clone())).await
      {
        return ValueNode::Simple(SimpleValue::Str(text));
      }
      return self.plain_object_node(obj);
    }
    if class.ends_with("[]") {
      let length = vm.array_length(obj).await.unwrap_or(0);
      return self.objects.insert_with(
        Some(VmValue::Object(obj.clone())),
        |id| ValueNode::Array { length, id },
      );
    }
    if class == nashorn::ECMA_EXCEPTION {
      return self.marshal_ecma_exception(thread, obj, depth).await;
    }

    if self.is_instance(obj, nashorn::SCRIPT_FUNCTION).await {
      let name = self
        .invoke_string(thread, obj, nashorn::SCRIPT_FUNCTION_GET_NAME)
        .await
        .unwrap_or_default();
      let source = self
        .invoke_string(thread, obj, nashorn::SCRIPT_FUNCTION_TO_SOURCE)
        .await;
      return self.objects.insert_with(
        Some(VmValue::Object(obj.clone())),
        |id| ValueNode::Function { name, source, id },
      );
    }

    if self.is_instance(obj, nashorn::SCRIPT_OBJECT).await {
      if class == nashorn::NATIVE_ARRAY {
        let length = match self.js_get(thread, obj, "length").await {
          Ok(value) => value.as_number().unwrap_or(0.0) as usize,
          Err(_) => 0,
        };
        return self.objects.insert_with(
          Some(VmValue::Object(obj.clone())),
          |id| ValueNode::Array { length, id },
        );
      }
      if class == nashorn::NATIVE_DATE {
        let repr = self
          .invoke_string(thread, obj, nashorn::OBJECT_TO_STRING)
          .await
          .unwrap_or_default();
        return self.objects.insert_with(
          Some(VmValue::Object(obj.clone())),
          |id| ValueNode::Date {
            string_repr: repr,
            id,
          },
        );
      }
      if class == nashorn::NATIVE_REGEXP {
        let repr = self
          .invoke_string(thread, obj, nashorn::OBJECT_TO_STRING)
          .await
          .unwrap_or_default();
        return self.objects.insert_with(
          Some(VmValue::Object(obj.clone())),
          |id| ValueNode::RegExp {
            string_repr: repr,
            id,
          },
        );
      }
      if is_native_error_class(class) {
        let data = self.script_error_value(thread, obj).await;
        let node = self.objects.insert_with(
          Some(VmValue::Object(obj.clone())),
          |id| ValueNode::Error {
            data: data.clone(),
            id,
          },
        );
        if let Some(id) = node.object_id().cloned() {
          self.objects.set_extra(&id, error_extras(&data));
        }
        return node;
      }
      let class_name = self
        .invoke_string(
          thread,
          obj,
          nashorn::SCRIPT_OBJECT_GET_CLASS_NAME,
        )
        .await
        .unwrap_or_else(|| "Object".to_string());
      return self.objects.insert_with(
        Some(VmValue::Object(obj.clone())),
        |id| ValueNode::Object { class_name, id },
      );
    }

    if self.is_instance(obj, nashorn::SCRIPT_OBJECT_MIRROR).await {
      return self.objects.insert_with(
        Some(VmValue::Object(obj.clone())),
        |id| ValueNode::Object {
          class_name: "Object".to_string(),
          id,
        },
      );
    }

    self.plain_object_node(obj)
  }

  /// Any other host object: node named by the simple Java class name.
  fn plain_object_node(&mut self, obj: &ObjectRef) -> ValueNode {
    let class_name = simple_class_name(&obj.class_name).to_string();
    self
      .objects
      .insert_with(Some(VmValue::Object(obj.clone())), |id| {
        ValueNode::Object { class_name, id }
      })
  }

  async fn marshal_ecma_exception(
    &mut self,
    thread: ThreadId,
    obj: &ObjectRef,
    depth: u8,
  ) -> ValueNode {
    if depth == 0 {
      if let Ok(Some(VmValue::Object(thrown))) = self
        .vm
        .clone()
        .instance_field(obj, nashorn::ECMA_EXCEPTION_THROWN_FIELD)
        .await
      {
        return Box::pin(self.marshal_object(thread, &thrown, depth + 1))
          .await;
      }
    }
    let message = self
      .invoke_string(thread, obj, nashorn::THROWABLE_GET_MESSAGE)
      .await
      .unwrap_or_default();
    let data = ErrorValue {
      name: "Error".to_string(),
      message,
      stack: None,
    };
    let node = self
      .objects
      .insert_with(Some(VmValue::Object(obj.clone())), |id| {
        ValueNode::Error {
          data: data.clone(),
          id,
        }
      });
    if let Some(id) = node.object_id().cloned() {
      self.objects.set_extra(&id, error_extras(&data));
    }
    node
  }

  /// Error triple read from a script error object, best effort.
  pub(crate) async fn script_error_value(
    &mut self,
    thread: ThreadId,
    obj: &ObjectRef,
  ) -> ErrorValue {
    let name = match self.js_get(thread, obj, "name").await {
      Ok(value) => self
        .stringify(thread, &value)
        .await
        .unwrap_or_else(|| "Error".to_string()),
      Err(_) => "Error".to_string(),
    };
    let message = match self.js_get(thread, obj, "message").await {
      Ok(value) => self.stringify(thread, &value).await.unwrap_or_default(),
      Err(_) => String::new(),
    };
    let stack = match self.js_get(thread, obj, "stack").await {
      Ok(value) => self.stringify(thread, &value).await,
      Err(_) => None,
    };
    ErrorValue {
      name,
      message,
      stack,
    }
  }

  /// Publishes an uncaught script error that did not pause execution.
  pub(crate) async fn report_uncaught_error(
    &mut self,
    thread: ThreadId,
    exception: &ObjectRef,
  ) {
    let data = match self
      .vm
      .clone()
      .instance_field(exception, nashorn::ECMA_EXCEPTION_THROWN_FIELD)
      .await
    {
      Ok(Some(VmValue::Object(thrown))) => {
        self.script_error_value(thread, &thrown).await
      }
      _ => ErrorValue {
        name: "Error".to_string(),
        message: self
          .invoke_string(thread, exception, nashorn::THROWABLE_GET_MESSAGE)
          .await
          .unwrap_or_default(),
        stack: None,
      },
    };
    self.bus.emit(DebuggerEvent::UncaughtError(data));
  }

  // Small invocation helpers shared by marshalling and extraction.

  pub(crate) async fn is_instance(
    &self,
    obj: &ObjectRef,
    class_name: &str,
  ) -> bool {
    self
      .vm
      .instance_of(obj, class_name)
      .await
      .unwrap_or(false)
  }

  /// `obj.get(key)` through the engine's `ScriptObject.get(Object)`.
  pub(crate) async fn js_get(
    &self,
    thread: ThreadId,
    obj: &ObjectRef,
    key: &str,
  ) -> VmResult<VmValue> {
    let vm = self.vm.clone();
    let key = vm.create_string(key).await?;
    let (method, signature) = nashorn::SCRIPT_OBJECT_GET;
    vm.invoke_instance(obj, method, signature, &[key], thread)
      .await
  }

  /// Invokes a string-returning method, flattening the result.
  pub(crate) async fn invoke_string(
    &self,
    thread: ThreadId,
    obj: &ObjectRef,
    method: (&str, &str),
  ) -> Option<String> {
    let vm = self.vm.clone();
    let value = vm
      .invoke_instance(obj, method.0, method.1, &[], thread)
      .await
      .ok()?;
    self.stringify(thread, &value).await
  }

  /// Best-effort string form of a value: strings are read, `ConsString`
  /// flattens through `toString`, primitives format.
  pub(crate) async fn stringify(
    &self,
    thread: ThreadId,
    value: &VmValue,
  ) -> Option<String> {
    let vm = self.vm.clone();
    match value {
      VmValue::Object(obj) if obj.class_name == nashorn::JAVA_STRING => {
        vm.read_string(obj).await.ok()
      }
      VmValue::Object(obj) => {
        let (method, signature) = nashorn::OBJECT_TO_STRING;
        match vm
          .invoke_instance(obj, method, signature, &[], thread)
          .await
        {
          Ok(VmValue::Object(s))
            if s.class_name == nashorn::JAVA_STRING =>
          {
            vm.read_string(&s).await.ok()
          }
          _ => None,
        }
      }
      VmValue::Boolean(b) => Some(b.to_string()),
      VmValue::Null | VmValue::Void => None,
      other => other.as_number().map(|n| {
        if n.fract() == 0.0 && n.is_finite() {
          format!("{}", n as i64)
        } else {
          n.to_string()
        }
      }),
    }
  }
}

fn error_extras(data: &ErrorValue) -> Vec<(String, ValueNode)> {
  let mut extras = vec![
    (
      "name".to_string(),
      ValueNode::Simple(SimpleValue::Str(data.name.clone())),
    ),
    (
      "message".to_string(),
      ValueNode::Simple(SimpleValue::Str(data.message.clone())),
    ),
  ];
  if let Some(stack) = &data.stack {
    extras.push((
      "stack".to_string(),
      ValueNode::Simple(SimpleValue::Str(stack.clone())),
    ));
  }
  extras
}

fn is_native_error_class(class: &str) -> bool {
  let simple = simple_class_name(class);
  simple.starts_with("Native") && simple.ends_with("Error")
}

pub(crate) fn simple_class_name(class: &str) -> &str {
  class.rsplit('.').next().unwrap_or(class)
}
