//! Expression evaluation and scope synthesis.
//!
//! Evaluation happens in the target VM through the engine's private
//! `Context.eval` entry point, against a transient scope object whose
//! accessor properties shadow the frame's locals. The accessors log every
//! write into a hidden change array, which is applied back to the real
//! JDI slots after the evaluation returns.

use crate::consts::EVALUATED_CODE_MARKER;
use crate::consts::HIDDEN_PREFIX;
use crate::consts::TOP_FRAME_ID;
use crate::host::DebuggerHost;
use crate::node::EvalResult;
use crate::node::ObjectId;
use crate::node::SimpleValue;
use crate::node::ValueNode;
use crate::prelude::*;
use crate::vm::ClassId;
use crate::vm::ObjectRef;
use crate::vm::ThreadId;
use crate::vm::VariableInfo;
use crate::vm::Vm;
use crate::vm::VmLocation;
use crate::vm::VmValue;
use crate::vm::nashorn;
use tracing::debug;
use tracing::warn;

impl<V: Vm> DebuggerHost<V> {
  pub(crate) async fn op_evaluate(
    &mut self,
    stack_frame_id: &str,
    expression: &str,
    named_objects: HashMap<String, ObjectId>,
  ) -> HostResult<EvalResult> {
    let (thread, wrapper, frame_location, locals, this_value, scope_value) = {
      let paused = self.paused.as_ref().ok_or(HostErr::NotPaused)?;
      let frame = if stack_frame_id == TOP_FRAME_ID {
        paused.frames.first()
      } else {
        paused
          .frames
          .iter()
          .find(|frame| frame.id == stack_frame_id)
      }
      .ok_or_else(|| {
        HostErr::UnknownStackFrame(stack_frame_id.into())
      })?;
      (
        paused.thread,
        frame.wrapper.clone(),
        frame.location,
        frame
          .locals
          .iter()
          .map(|(var, _)| var.clone())
          .collect::<Vec<_>>(),
        frame.this_value.clone().unwrap_or(VmValue::Null),
        frame.scope_value.clone(),
      )
    };

    // Named objects are resolved against the current pause before
    // anything mutates.
    let mut named_values: Vec<(String, VmValue)> = Vec::new();
    for (name, object_id) in named_objects {
      let raw = self
        .objects
        .get(&object_id)
        .and_then(|entry| entry.raw.clone())
        .ok_or_else(|| HostErr::UnknownObject(object_id.0.clone()))?;
      named_values.push((name, raw));
    }

    let base_scope = match wrapper.clone().or_else(|| {
      scope_value
        .as_ref()
        .and_then(VmValue::as_object)
        .cloned()
        .or_else(|| this_value.as_object().cloned())
    }) {
      Some(scope) => scope,
      None => self.global_object(thread).await?,
    };
    let eval_scope = if named_values.is_empty() {
      base_scope
    } else {
      // Ad-hoc named objects wrap the scope once more, by the same
      // accessor technique.
      self
        .synthesize_wrapper(thread, Some(&base_scope), &named_values)
        .await?
    };

    if let Some(wrapper) = &wrapper {
      self.reset_changes(thread, wrapper).await;
    }

    let outcome = self
      .context_eval(thread, &eval_scope, expression, &this_value)
      .await;
    let result = match outcome {
      Ok(value) => {
        if self.is_marker_echo(&value).await {
          // Statements like `var x = 42` evaluate to the leading marker
          // literal; that is not a result.
          EvalResult {
            node: ValueNode::Simple(SimpleValue::Undefined),
            thrown: false,
          }
        } else {
          EvalResult {
            node: self.marshal_value(thread, &value).await,
            thrown: false,
          }
        }
      }
      Err(VmErr::InvocationException(exception)) => {
        let node = self
          .marshal_value(thread, &VmValue::Object(exception))
          .await;
        EvalResult { node, thrown: true }
      }
      Err(err) => return Err(HostErr::Evaluation(err.to_string())),
    };

    if let Some(wrapper) = &wrapper {
      self
        .write_back_changes(thread, wrapper, frame_location, &locals)
        .await;
    }

    // The expression may have mutated arbitrary objects; cached property
    // extractions are no longer trustworthy.
    if let Some(paused) = self.paused.as_mut() {
      paused.props_cache.clear();
    }

    Ok(result)
  }

  async fn is_marker_echo(&self, value: &VmValue) -> bool {
    if let VmValue::Object(obj) = value {
      if obj.class_name == nashorn::JAVA_STRING {
        if let Ok(text) = self.vm.read_string(obj).await {
          return text == EVALUATED_CODE_MARKER;
        }
      }
    }
    false
  }

  /// Runs `code` through the engine's internal eval, prefixed with the
  /// evaluated-code marker so re-attached sessions can recognize and drop
  /// the synthetic script the engine compiles for it.
  pub(crate) async fn context_eval(
    &self,
    thread: ThreadId,
    scope: &ObjectRef,
    code: &str,
    this: &VmValue,
  ) -> VmResult<VmValue> {
    let vm = self.vm.clone();
    let context_class = self.wanted_class(nashorn::CONTEXT)?;
    let (method, signature) = nashorn::CONTEXT_GET_GLOBAL;
    let global = vm
      .invoke_static(context_class, method, signature, &[], thread)
      .await?;
    let VmValue::Object(global_obj) = global else {
      return Err(VmErr::EngineMismatch(
        "Context.getGlobal() returned no object".to_string(),
      ));
    };
    let (method, signature) = nashorn::GLOBAL_GET_CONTEXT;
    let context = vm
      .invoke_instance(&global_obj, method, signature, &[], thread)
      .await?;
    let VmValue::Object(context_obj) = context else {
      return Err(VmErr::EngineMismatch(
        "Global.getContext() returned no object".to_string(),
      ));
    };

    let tagged = format!("'{EVALUATED_CODE_MARKER}';{code}");
    let code_string = vm.create_string(&tagged).await?;
    let (method, signature) = nashorn::CONTEXT_EVAL;
    vm.invoke_instance(
      &context_obj,
      method,
      signature,
      &[
        VmValue::Object(scope.clone()),
        code_string,
        this.clone(),
        VmValue::Null,
      ],
      thread,
    )
    .await
  }

  /// The global object, used as the fallback scope and call receiver.
  pub(crate) async fn global_object(
    &self,
    thread: ThreadId,
  ) -> VmResult<ObjectRef> {
    let context_class = self.wanted_class(nashorn::CONTEXT)?;
    let (method, signature) = nashorn::CONTEXT_GET_GLOBAL;
    match self
      .vm
      .invoke_static(context_class, method, signature, &[], thread)
      .await?
    {
      VmValue::Object(global) => Ok(global),
      _ => Err(VmErr::EngineMismatch(
        "Context.getGlobal() returned no object".to_string(),
      )),
    }
  }

  /// Builds the accessor-tracked scope wrapper for a frame's locals.
  pub(crate) async fn build_scope_wrapper(
    &mut self,
    thread: ThreadId,
    parent: Option<&ObjectRef>,
    locals: &[(VariableInfo, VmValue)],
  ) -> VmResult<ObjectRef> {
    let pairs: Vec<(String, VmValue)> = locals
      .iter()
      .map(|(var, value)| (var.name.clone(), value.clone()))
      .collect();
    self.synthesize_wrapper(thread, parent, &pairs).await
  }

  /// Evaluates the wrapper factory in the target and initializes one
  /// shadow field per name with the boxed raw value.
  async fn synthesize_wrapper(
    &mut self,
    thread: ThreadId,
    parent: Option<&ObjectRef>,
    pairs: &[(String, VmValue)],
  ) -> VmResult<ObjectRef> {
    let vm = self.vm.clone();
    let parent_obj = match parent {
      Some(parent) => parent.clone(),
      None => self.global_object(thread).await?,
    };

    let names: Vec<&str> = pairs.iter().map(|(name, _)| name.as_str()).collect();
    let factory = wrapper_factory_source(&names);
    let result = self
      .context_eval(
        thread,
        &parent_obj,
        &factory,
        &VmValue::Object(parent_obj.clone()),
      )
      .await?;
    let VmValue::Object(wrapper) = result else {
      return Err(VmErr::EngineMismatch(
        "scope factory evaluated to no object".to_string(),
      ));
    };

    let (method, signature) = nashorn::SCRIPT_OBJECT_PUT;
    for (name, value) in pairs {
      let boxed = self.box_value(thread, value).await?;
      let key = vm.create_string(&format!("{HIDDEN_PREFIX}{name}")).await?;
      vm.invoke_instance(
        &wrapper,
        method,
        signature,
        &[key, boxed, VmValue::Boolean(false)],
        thread,
      )
      .await?;
    }
    Ok(wrapper)
  }

  /// Boxes a primitive through the engine's cached `valueOf` entry
  /// points; objects pass through, `undefined` comes from
  /// `ScriptRuntime.UNDEFINED`.
  pub(crate) async fn box_value(
    &self,
    thread: ThreadId,
    value: &VmValue,
  ) -> VmResult<VmValue> {
    let vm = self.vm.clone();
    match value {
      VmValue::Object(_) | VmValue::Null => Ok(value.clone()),
      VmValue::Boolean(b) => {
        let class = self.wanted_class("java.lang.Boolean")?;
        let (method, signature) = nashorn::BOOLEAN_VALUE_OF;
        vm.invoke_static(
          class,
          method,
          signature,
          &[VmValue::Boolean(*b)],
          thread,
        )
        .await
      }
      VmValue::Byte(_) | VmValue::Short(_) | VmValue::Int(_) => {
        let class = self.wanted_class("java.lang.Integer")?;
        let (method, signature) = nashorn::INTEGER_VALUE_OF;
        vm.invoke_static(
          class,
          method,
          signature,
          &[VmValue::Int(value.as_number().unwrap_or(0.0) as i32)],
          thread,
        )
        .await
      }
      VmValue::Long(l) => {
        let class = self.wanted_class("java.lang.Long")?;
        let (method, signature) = nashorn::LONG_VALUE_OF;
        vm.invoke_static(
          class,
          method,
          signature,
          &[VmValue::Long(*l)],
          thread,
        )
        .await
      }
      VmValue::Float(_) | VmValue::Double(_) => {
        let class = self.wanted_class("java.lang.Double")?;
        let (method, signature) = nashorn::DOUBLE_VALUE_OF;
        vm.invoke_static(
          class,
          method,
          signature,
          &[VmValue::Double(value.as_number().unwrap_or(0.0))],
          thread,
        )
        .await
      }
      VmValue::Char(c) => {
        vm.create_string(
          &char::from_u32(*c as u32).unwrap_or('\u{fffd}').to_string(),
        )
        .await
      }
      VmValue::Void => {
        let class = self.wanted_class(nashorn::SCRIPT_RUNTIME)?;
        match vm.static_field(class, nashorn::UNDEFINED_FIELD).await? {
          Some(undefined) => Ok(undefined),
          None => Err(VmErr::EngineMismatch(
            "ScriptRuntime.UNDEFINED not present".to_string(),
          )),
        }
      }
    }
  }

  /// Calls a script function through `ScriptRuntime.apply`, packing the
  /// arguments into a target-side `Object[]`.
  pub(crate) async fn call_function(
    &self,
    thread: ThreadId,
    func: &ObjectRef,
    this: &VmValue,
    args: &[VmValue],
  ) -> VmResult<VmValue> {
    let vm = self.vm.clone();
    let runtime = self.wanted_class(nashorn::SCRIPT_RUNTIME)?;
    let array = vm.create_object_array(args.len()).await?;
    for (i, arg) in args.iter().enumerate() {
      let boxed = self.box_value(thread, arg).await?;
      vm.set_array_element(&array, i, &boxed).await?;
    }
    let (method, signature) = nashorn::SCRIPT_RUNTIME_APPLY;
    vm.invoke_static(
      runtime,
      method,
      signature,
      &[
        VmValue::Object(func.clone()),
        this.clone(),
        VmValue::Object(array),
      ],
      thread,
    )
    .await
  }

  /// Reads an array-like value: a JDI array directly, a script array
  /// through `asObjectArray`.
  pub(crate) async fn read_array_like(
    &self,
    thread: ThreadId,
    obj: &ObjectRef,
  ) -> VmResult<Vec<VmValue>> {
    let vm = self.vm.clone();
    if obj.class_name.ends_with("[]") {
      return vm.array_values(obj).await;
    }
    let (method, signature) = nashorn::NATIVE_ARRAY_AS_OBJECT_ARRAY;
    match vm
      .invoke_instance(obj, method, signature, &[], thread)
      .await?
    {
      VmValue::Object(array) => vm.array_values(&array).await,
      _ => Ok(vec![]),
    }
  }

  /// Empties the wrapper's change log before an evaluation.
  async fn reset_changes(&self, thread: ThreadId, wrapper: &ObjectRef) {
    match self
      .js_get(thread, wrapper, &format!("{HIDDEN_PREFIX}resetChanges"))
      .await
    {
      Ok(VmValue::Object(func)) => {
        if let Err(err) = self
          .call_function(
            thread,
            &func,
            &VmValue::Object(wrapper.clone()),
            &[],
          )
          .await
        {
          warn!("resetChanges failed: {err}");
        }
      }
      _ => warn!("scope wrapper lacks a resetChanges member"),
    }
  }

  /// Applies `[name, value]` pairs logged by the wrapper's setters to the
  /// JDI slots of the frame that still matches the recorded location.
  async fn write_back_changes(
    &mut self,
    thread: ThreadId,
    wrapper: &ObjectRef,
    frame_location: VmLocation,
    locals: &[VariableInfo],
  ) {
    let vm = self.vm.clone();
    let changes = match self
      .js_get(thread, wrapper, &format!("{HIDDEN_PREFIX}changes"))
      .await
    {
      Ok(VmValue::Object(obj)) => obj,
      _ => return,
    };
    let entries = match self.read_array_like(thread, &changes).await {
      Ok(entries) => entries,
      Err(err) => {
        warn!("cannot read change log: {err}");
        return;
      }
    };
    if entries.is_empty() {
      return;
    }

    // Invocations above invalidated the old frame handles; re-locate the
    // frame by its recorded location.
    let frames = match vm.frames(thread).await {
      Ok(frames) => frames,
      Err(err) => {
        warn!("cannot re-read frames for write-back: {err}");
        return;
      }
    };
    let Some(frame) = frames
      .iter()
      .find(|frame| frame.location == frame_location)
    else {
      warn!("no frame matches the recorded location, dropping changes");
      return;
    };

    for entry in &entries {
      let Some(pair_obj) = entry.as_object() else {
        continue;
      };
      let pair = match self.read_array_like(thread, pair_obj).await {
        Ok(pair) => pair,
        Err(_) => continue,
      };
      if pair.len() < 2 {
        continue;
      }
      let Some(name) = self.stringify(thread, &pair[0]).await else {
        continue;
      };
      let Some(var) = locals.iter().find(|var| var.name == name) else {
        continue;
      };
      let coerced = self.coerce_for_slot(thread, var, &pair[1]).await;
      match vm.set_local_value(thread, frame.id, var, &coerced).await {
        Ok(()) => debug!(local = %name, "wrote back mutated local"),
        Err(err) => warn!(local = %name, "write-back failed: {err}"),
      }
    }
  }

  /// Adapts a scripted value to the slot's signature: primitive slots get
  /// unboxed numbers, object slots get boxed values.
  async fn coerce_for_slot(
    &self,
    thread: ThreadId,
    var: &VariableInfo,
    value: &VmValue,
  ) -> VmValue {
    let number = self.unboxed_number(value).await;
    match var.signature.as_bytes().first().copied() {
      Some(b'I') => VmValue::Int(number.unwrap_or(0.0) as i32),
      Some(b'J') => VmValue::Long(number.unwrap_or(0.0) as i64),
      Some(b'S') => VmValue::Short(number.unwrap_or(0.0) as i16),
      Some(b'B') => VmValue::Byte(number.unwrap_or(0.0) as i8),
      Some(b'F') => VmValue::Float(number.unwrap_or(0.0) as f32),
      Some(b'D') => VmValue::Double(number.unwrap_or(0.0)),
      Some(b'Z') => VmValue::Boolean(self.unboxed_bool(value).await),
      Some(b'C') => VmValue::Char(number.unwrap_or(0.0) as u16),
      _ => self
        .box_value(thread, value)
        .await
        .unwrap_or_else(|_| value.clone()),
    }
  }

  async fn unboxed_number(&self, value: &VmValue) -> Option<f64> {
    if let Some(n) = value.as_number() {
      return Some(n);
    }
    if let VmValue::Object(obj) = value {
      if nashorn::is_boxed_primitive(&obj.class_name) {
        if let Ok(Some(inner)) = self
          .vm
          .instance_field(obj, nashorn::BOXED_VALUE_FIELD)
          .await
        {
          return inner.as_number();
        }
      }
    }
    None
  }

  async fn unboxed_bool(&self, value: &VmValue) -> bool {
    match value {
      VmValue::Boolean(b) => *b,
      VmValue::Object(obj) if nashorn::is_boxed_primitive(&obj.class_name) => {
        matches!(
          self
            .vm
            .instance_field(obj, nashorn::BOXED_VALUE_FIELD)
            .await,
          Ok(Some(VmValue::Boolean(true)))
        )
      }
      _ => false,
    }
  }

  pub(crate) fn wanted_class(&self, name: &str) -> VmResult<ClassId> {
    self.wanted.get(name).copied().ok_or_else(|| {
      VmErr::EngineMismatch(format!("class {name} was never loaded"))
    })
  }
}

/// Source of the scope-wrapper factory. The object's prototype is the
/// parent scope (`this` at evaluation time); every named local becomes an
/// accessor pair over a hidden shadow field, and writes append to the
/// hidden change log.
fn wrapper_factory_source(names: &[&str]) -> String {
  let names_json =
    serde_json::to_string(names).unwrap_or_else(|_| "[]".to_string());
  format!(
    "(function() {{\n\
     \x20 var obj = Object.create(this);\n\
     \x20 var names = {names_json};\n\
     \x20 obj['||changes'] = [];\n\
     \x20 obj['||resetChanges'] = function() {{ obj['||changes'].length = 0; }};\n\
     \x20 for (var i = 0; i < names.length; i++) {{\n\
     \x20   (function(name) {{\n\
     \x20     Object.defineProperty(obj, name, {{\n\
     \x20       configurable: true,\n\
     \x20       enumerable: true,\n\
     \x20       get: function() {{ return obj['||' + name]; }},\n\
     \x20       set: function(v) {{\n\
     \x20         obj['||' + name] = v;\n\
     \x20         obj['||changes'].push([name, v]);\n\
     \x20       }}\n\
     \x20     }});\n\
     \x20   }})(names[i]);\n\
     \x20 }}\n\
     \x20 return obj;\n\
     }}).call(this)"
  )
}
