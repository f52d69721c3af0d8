//! Object property extraction.
//!
//! Dispatches on the runtime type of the raw value behind an object id:
//! script objects (preferably through an in-target helper script), mirror
//! objects, JDI arrays, hashtables and arbitrary host objects. Results are
//! cached per pause and per `(id, onlyOwn, onlyAccessors)` triple.

use crate::consts::HIDDEN_PREFIX;
use crate::host::DebuggerHost;
use crate::node::ObjectId;
use crate::node::ObjectPropertyDescriptor;
use crate::node::PropertiesMap;
use crate::node::PropertyKind;
use crate::node::SimpleValue;
use crate::node::ValueNode;
use crate::prelude::*;
use crate::vm::ObjectRef;
use crate::vm::ThreadId;
use crate::vm::Vm;
use crate::vm::VmValue;
use crate::vm::nashorn;
use itertools::Itertools;
use tracing::debug;
use tracing::warn;

/// In-target extractor: returns a flat `[name, flags, value, getter,
/// setter] x N` array, `flags` being a subset of `"cewo"`. `Java.to`
/// forces a Java array, which also flattens `ConsString` names.
const PROPERTY_EXTRACTOR_SOURCE: &str = "\
(function() {
  return function(obj, onlyOwn, onlyAccessors) {
    var result = [];
    var seen = {};
    var current = obj;
    var own = true;
    while (current !== null && current !== undefined) {
      var names = Object.getOwnPropertyNames(current);
      for (var i = 0; i < names.length; i++) {
        var name = names[i];
        if (name.indexOf('||') === 0 || seen[name]) continue;
        seen[name] = true;
        var desc = Object.getOwnPropertyDescriptor(current, name);
        if (!desc) continue;
        if (onlyAccessors && !desc.get && !desc.set) continue;
        var flags = '';
        if (desc.configurable) flags += 'c';
        if (desc.enumerable) flags += 'e';
        if (desc.writable) flags += 'w';
        if (own) flags += 'o';
        result.push(name, flags, desc.value, desc.get, desc.set);
      }
      if (onlyOwn) break;
      current = Object.getPrototypeOf(current);
      own = false;
    }
    return (typeof Java !== 'undefined' && Java.to)
      ? Java.to(result, 'java.lang.Object[]')
      : result;
  };
})()";

impl<V: Vm> DebuggerHost<V> {
  pub(crate) async fn op_object_properties(
    &mut self,
    id: &ObjectId,
    only_own: bool,
    only_accessors: bool,
  ) -> HostResult<PropertiesMap> {
    let thread = self.paused.as_ref().ok_or(HostErr::NotPaused)?.thread;

    let key = (id.clone(), only_own, only_accessors);
    if let Some(cached) = self
      .paused
      .as_ref()
      .and_then(|paused| paused.props_cache.get(&key).cloned())
    {
      return Ok(cached);
    }

    let Some(entry) = self.objects.get(id) else {
      // Unknown or from a prior pause; ids never survive a resume.
      warn!(%id, "property request for unknown object id");
      return Ok(PropertiesMap::new());
    };
    let raw = entry.raw.clone();
    let extra = entry.extra.clone();
    let is_array_node = matches!(entry.node, ValueNode::Array { .. });

    let mut map = match &raw {
      Some(VmValue::Object(obj)) => {
        self
          .extract_object(thread, obj, is_array_node, only_own, only_accessors)
          .await
      }
      _ => PropertiesMap::new(),
    };

    if !only_accessors {
      for (name, node) in extra {
        map.insert_if_absent(
          name,
          ObjectPropertyDescriptor::data(node, false, true),
        );
      }
    }

    if let Some(paused) = self.paused.as_mut() {
      paused.props_cache.insert(key, map.clone());
    }
    Ok(map)
  }

  async fn extract_object(
    &mut self,
    thread: ThreadId,
    obj: &ObjectRef,
    is_array_node: bool,
    only_own: bool,
    only_accessors: bool,
  ) -> PropertiesMap {
    if obj.class_name.ends_with("[]") {
      if only_accessors {
        return PropertiesMap::new();
      }
      return self.extract_jdi_array(thread, obj).await;
    }

    if self.is_instance(obj, nashorn::SCRIPT_OBJECT).await {
      match self
        .extract_with_helper(thread, obj, only_own, only_accessors)
        .await
      {
        Ok(map) => return map,
        Err(err) => {
          debug!("in-target extractor unavailable, walking keys: {err}");
        }
      }
      return self
        .extract_script_object(thread, obj, only_own, only_accessors)
        .await;
    }

    if self.is_instance(obj, nashorn::SCRIPT_OBJECT_MIRROR).await {
      if only_accessors {
        // The mirror surface exposes data properties only.
        return PropertiesMap::new();
      }
      return self.extract_mirror(thread, obj, is_array_node).await;
    }

    if self.is_instance(obj, nashorn::HASHTABLE).await {
      if only_accessors {
        return PropertiesMap::new();
      }
      return self.extract_hashtable(thread, obj).await;
    }

    if only_accessors {
      return PropertiesMap::new();
    }
    self.extract_host_object(thread, obj).await
  }

  /// Preferred path for script objects: one call into the pre-compiled
  /// extractor function, one flat array back.
  async fn extract_with_helper(
    &mut self,
    thread: ThreadId,
    obj: &ObjectRef,
    only_own: bool,
    only_accessors: bool,
  ) -> VmResult<PropertiesMap> {
    let extractor = self.ensure_extractor(thread).await?;
    let global = self.global_object(thread).await?;
    let result = self
      .call_function(
        thread,
        &extractor,
        &VmValue::Object(global),
        &[
          VmValue::Object(obj.clone()),
          VmValue::Boolean(only_own),
          VmValue::Boolean(only_accessors),
        ],
      )
      .await?;
    let VmValue::Object(array) = result else {
      return Err(VmErr::Protocol("extractor returned no array"));
    };
    let flat = self.read_array_like(thread, &array).await?;

    let mut map = PropertiesMap::new();
    for (name, flags, value, getter, setter) in flat.into_iter().tuples() {
      let Some(name) = self.stringify(thread, &name).await else {
        continue;
      };
      let flags = self.stringify(thread, &flags).await.unwrap_or_default();
      let getter_node = if is_undefinedish(&getter) {
        None
      } else {
        Some(self.marshal_value(thread, &getter).await)
      };
      let setter_node = if is_undefinedish(&setter) {
        None
      } else {
        Some(self.marshal_value(thread, &setter).await)
      };
      let descriptor = if getter_node.is_some() || setter_node.is_some() {
        ObjectPropertyDescriptor::new(
          PropertyKind::Accessor,
          flags.contains('c'),
          flags.contains('e'),
          false,
          flags.contains('o'),
          None,
          getter_node,
          setter_node,
        )
      } else {
        let value_node = self.marshal_value(thread, &value).await;
        ObjectPropertyDescriptor::new(
          PropertyKind::Data,
          flags.contains('c'),
          flags.contains('e'),
          flags.contains('w'),
          flags.contains('o'),
          Some(value_node),
          None,
          None,
        )
      };
      map.insert_if_absent(name, descriptor);
    }
    Ok(map)
  }

  async fn ensure_extractor(
    &mut self,
    thread: ThreadId,
  ) -> VmResult<ObjectRef> {
    if let Some(extractor) = self
      .paused
      .as_ref()
      .and_then(|paused| paused.extractor.clone())
    {
      return Ok(extractor);
    }
    let global = self.global_object(thread).await?;
    let result = self
      .context_eval(
        thread,
        &global,
        PROPERTY_EXTRACTOR_SOURCE,
        &VmValue::Object(global.clone()),
      )
      .await?;
    let VmValue::Object(func) = result else {
      return Err(VmErr::EngineMismatch(
        "property extractor evaluated to no function".to_string(),
      ));
    };
    if let Some(paused) = self.paused.as_mut() {
      paused.extractor = Some(func.clone());
    }
    Ok(func)
  }

  /// Fallback: walk own keys (or the prototype chain) with one descriptor
  /// read per key.
  async fn extract_script_object(
    &mut self,
    thread: ThreadId,
    obj: &ObjectRef,
    only_own: bool,
    only_accessors: bool,
  ) -> PropertiesMap {
    let mut map = PropertiesMap::new();
    let mut current = obj.clone();
    let mut own = true;
    for _ in 0..8 {
      let keys = self.script_own_keys(thread, &current).await;
      for key in keys {
        if key.starts_with(HIDDEN_PREFIX) || map.contains_key(&key) {
          continue;
        }
        let Some(descriptor) =
          self.script_descriptor(thread, &current, &key, own).await
        else {
          continue;
        };
        if only_accessors && descriptor.kind() != PropertyKind::Accessor {
          continue;
        }
        map.insert_if_absent(key, descriptor);
      }
      if only_own {
        break;
      }
      match self.proto_of(thread, &current).await {
        Some(proto) => {
          current = proto;
          own = false;
        }
        None => break,
      }
    }
    map
  }

  async fn script_own_keys(
    &self,
    thread: ThreadId,
    obj: &ObjectRef,
  ) -> Vec<String> {
    let vm = self.vm.clone();
    let (method, signature) = nashorn::SCRIPT_OBJECT_GET_OWN_KEYS;
    let keys = match vm
      .invoke_instance(obj, method, signature, &[VmValue::Boolean(true)], thread)
      .await
    {
      Ok(VmValue::Object(array)) => array,
      _ => return vec![],
    };
    let values = vm.array_values(&keys).await.unwrap_or_default();
    let mut names = Vec::with_capacity(values.len());
    for value in &values {
      if let Some(name) = self.stringify(thread, value).await {
        names.push(name);
      }
    }
    names
  }

  async fn script_descriptor(
    &mut self,
    thread: ThreadId,
    obj: &ObjectRef,
    key: &str,
    own: bool,
  ) -> Option<ObjectPropertyDescriptor> {
    let vm = self.vm.clone();
    let key_value = vm.create_string(key).await.ok()?;
    let (method, signature) =
      nashorn::SCRIPT_OBJECT_GET_OWN_PROPERTY_DESCRIPTOR;
    let descriptor = vm
      .invoke_instance(obj, method, signature, &[key_value], thread)
      .await;

    if let Ok(VmValue::Object(desc_obj)) = descriptor {
      let getter = self.js_get(thread, &desc_obj, "get").await.ok();
      let setter = self.js_get(thread, &desc_obj, "set").await.ok();
      let value = self.js_get(thread, &desc_obj, "value").await.ok();
      let configurable = matches!(
        self.js_get(thread, &desc_obj, "configurable").await,
        Ok(VmValue::Boolean(true))
      );
      let enumerable = matches!(
        self.js_get(thread, &desc_obj, "enumerable").await,
        Ok(VmValue::Boolean(true))
      );
      let writable = matches!(
        self.js_get(thread, &desc_obj, "writable").await,
        Ok(VmValue::Boolean(true))
      );

      let getter_node = match getter {
        Some(v) if !is_undefinedish(&v) => {
          Some(self.marshal_value(thread, &v).await)
        }
        _ => None,
      };
      let setter_node = match setter {
        Some(v) if !is_undefinedish(&v) => {
          Some(self.marshal_value(thread, &v).await)
        }
        _ => None,
      };
      if getter_node.is_some() || setter_node.is_some() {
        return Some(ObjectPropertyDescriptor::new(
          PropertyKind::Accessor,
          configurable,
          enumerable,
          false,
          own,
          None,
          getter_node,
          setter_node,
        ));
      }
      if let Some(value) = value {
        let node = self.marshal_value(thread, &value).await;
        return Some(ObjectPropertyDescriptor::new(
          PropertyKind::Data,
          configurable,
          enumerable,
          writable,
          own,
          Some(node),
          None,
          None,
        ));
      }
      return Some(ObjectPropertyDescriptor::new(
        PropertyKind::Generic,
        configurable,
        enumerable,
        false,
        own,
        None,
        None,
        None,
      ));
    }

    // No descriptor object; read the plain value.
    let value = self.js_get(thread, obj, key).await.ok()?;
    let node = self.marshal_value(thread, &value).await;
    Some(ObjectPropertyDescriptor::data(node, true, own))
  }

  /// JDI arrays: one data descriptor per index plus a synthetic `length`.
  async fn extract_jdi_array(
    &mut self,
    thread: ThreadId,
    obj: &ObjectRef,
  ) -> PropertiesMap {
    let vm = self.vm.clone();
    let mut map = PropertiesMap::new();
    let values = vm.array_values(obj).await.unwrap_or_default();
    let length = values.len();
    for (i, value) in values.into_iter().enumerate() {
      let node = self.marshal_value(thread, &value).await;
      map.insert_if_absent(
        i.to_string(),
        ObjectPropertyDescriptor::data(node, true, true),
      );
    }
    map.insert_if_absent(
      "length",
      ObjectPropertyDescriptor::data(
        ValueNode::Simple(SimpleValue::Number(length as f64)),
        false,
        true,
      ),
    );
    map
  }

  /// Mirror objects: `keySet()`, then `getMember` per key, `getSlot` for
  /// unsigned-integer keys of arrays. Data descriptors only.
  async fn extract_mirror(
    &mut self,
    thread: ThreadId,
    obj: &ObjectRef,
    is_array_node: bool,
  ) -> PropertiesMap {
    let vm = self.vm.clone();
    let mut map = PropertiesMap::new();

    let (method, signature) = nashorn::MIRROR_KEY_SET;
    let Ok(VmValue::Object(key_set)) = vm
      .invoke_instance(obj, method, signature, &[], thread)
      .await
    else {
      return map;
    };
    let (method, signature) = nashorn::SET_TO_ARRAY;
    let Ok(VmValue::Object(keys)) = vm
      .invoke_instance(&key_set, method, signature, &[], thread)
      .await
    else {
      return map;
    };
    let key_values = vm.array_values(&keys).await.unwrap_or_default();

    for key_value in &key_values {
      let Some(name) = self.stringify(thread, key_value).await else {
        continue;
      };
      let value = match name.parse::<u32>() {
        Ok(index) if is_array_node => {
          let (method, signature) = nashorn::MIRROR_GET_SLOT;
          vm.invoke_instance(
            obj,
            method,
            signature,
            &[VmValue::Int(index as i32)],
            thread,
          )
          .await
        }
        _ => {
          let key = match vm.create_string(&name).await {
            Ok(key) => key,
            Err(_) => continue,
          };
          let (method, signature) = nashorn::MIRROR_GET_MEMBER;
          vm.invoke_instance(obj, method, signature, &[key], thread).await
        }
      };
      if let Ok(value) = value {
        let node = self.marshal_value(thread, &value).await;
        map.insert_if_absent(
          name,
          ObjectPropertyDescriptor::data(node, true, true),
        );
      }
    }
    map
  }

  /// Hashtables: drive the key enumeration, stringify each key, read the
  /// mapped value.
  async fn extract_hashtable(
    &mut self,
    thread: ThreadId,
    obj: &ObjectRef,
  ) -> PropertiesMap {
    let vm = self.vm.clone();
    let mut map = PropertiesMap::new();

    let (method, signature) = nashorn::HASHTABLE_KEYS;
    let Ok(VmValue::Object(enumeration)) = vm
      .invoke_instance(obj, method, signature, &[], thread)
      .await
    else {
      return map;
    };

    // Bounded so a pathological table cannot wedge the pump.
    for _ in 0..10_000 {
      let (method, signature) = nashorn::ENUMERATION_HAS_MORE;
      match vm
        .invoke_instance(&enumeration, method, signature, &[], thread)
        .await
      {
        Ok(VmValue::Boolean(true)) => {}
        _ => break,
      }
      let (method, signature) = nashorn::ENUMERATION_NEXT;
      let Ok(key_value) = vm
        .invoke_instance(&enumeration, method, signature, &[], thread)
        .await
      else {
        break;
      };
      let Some(name) = self.stringify(thread, &key_value).await else {
        continue;
      };
      let (method, signature) = nashorn::HASHTABLE_GET;
      if let Ok(value) = vm
        .invoke_instance(obj, method, signature, &[key_value], thread)
        .await
      {
        let node = self.marshal_value(thread, &value).await;
        map.insert_if_absent(
          name,
          ObjectPropertyDescriptor::data(node, true, true),
        );
      }
    }
    map
  }

  /// Arbitrary host objects: declared instance fields as data
  /// descriptors.
  async fn extract_host_object(
    &mut self,
    thread: ThreadId,
    obj: &ObjectRef,
  ) -> PropertiesMap {
    let vm = self.vm.clone();
    let mut map = PropertiesMap::new();
    let fields = vm.instance_fields(obj).await.unwrap_or_default();
    for (name, value) in fields {
      let node = self.marshal_value(thread, &value).await;
      map.insert_if_absent(
        name,
        ObjectPropertyDescriptor::data(node, true, true),
      );
    }
    map
  }
}

fn is_undefinedish(value: &VmValue) -> bool {
  match value {
    VmValue::Null | VmValue::Void => true,
    VmValue::Object(obj) => obj.class_name == nashorn::UNDEFINED,
    _ => false,
  }
}
