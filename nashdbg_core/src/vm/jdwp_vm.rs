//! Production [`Vm`] implementation over the JDWP client.

use crate::jdwp::client::JdwpClient;
use crate::jdwp::client::JdwpComposite;
use crate::jdwp::client::JdwpEvent;
use crate::jdwp::consts::*;
use crate::jdwp::packet::JdwpLocation;
use crate::jdwp::packet::JdwpValue;
use crate::jdwp::packet::PacketReader;
use crate::jdwp::packet::signature_to_name;
use crate::prelude::*;
use crate::res::CONNECT_HINT;
use crate::vm::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::warn;

#[derive(Debug, Clone)]
struct MethodInfo {
  id: u64,
  name: String,
  signature: String,
}

#[derive(Debug, Clone)]
struct FieldInfo {
  id: u64,
  name: String,
  mod_bits: u32,
}

impl FieldInfo {
  fn is_static(&self) -> bool {
    self.mod_bits & ACC_STATIC != 0
  }
}

#[derive(Debug, Default)]
struct Caches {
  class_names: HashMap<u64, String>,
  methods: HashMap<u64, Arc<Vec<MethodInfo>>>,
  fields: HashMap<u64, Arc<Vec<FieldInfo>>>,
  line_tables: HashMap<(u64, u64), Arc<Vec<(u64, u32)>>>,
  superclasses: HashMap<u64, u64>,
  ancestors: HashMap<u64, Arc<Vec<String>>>,
  object_types: HashMap<u64, u64>,
  object_array_class: Option<u64>,
}

/// A debug target reached over JDWP.
pub struct JdwpVm {
  client: JdwpClient,
  events: tokio::sync::Mutex<UnboundedReceiver<JdwpComposite>>,
  caches: Mutex<Caches>,
}

impl JdwpVm {
  /// Attaches to `host:port`. A refused connection surfaces as
  /// [`HostErr::Connect`](crate::res::HostErr::Connect) with a hint about
  /// the target's JDWP launch arguments; there are no retries.
  pub async fn connect(host: &str, port: u16) -> HostResult<Self> {
    let (client, events) = JdwpClient::connect(host, port)
      .await
      .map_err(|source| HostErr::Connect {
        source,
        hint: CONNECT_HINT,
      })?;
    Ok(Self {
      client,
      events: tokio::sync::Mutex::new(events),
      caches: Mutex::new(Caches::default()),
    })
  }

  async fn class_name(&self, class: u64) -> VmResult<String> {
    if let Some(name) = self.caches.lock().class_names.get(&class) {
      return Ok(name.clone());
    }
    let mut w = self.client.writer();
    w.reference_id(class);
    let mut r = self
      .client
      .command(REFTYPE_SIGNATURE, w.into_bytes())
      .await?;
    let name = signature_to_name(&r.string()?);
    self.caches.lock().class_names.insert(class, name.clone());
    Ok(name)
  }

  async fn methods(&self, class: u64) -> VmResult<Arc<Vec<MethodInfo>>> {
    if let Some(methods) = self.caches.lock().methods.get(&class) {
      return Ok(methods.clone());
    }
    let mut w = self.client.writer();
    w.reference_id(class);
    let mut r = self.client.command(REFTYPE_METHODS, w.into_bytes()).await?;
    let count = r.int()?;
    let mut methods = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
      let id = r.method_id()?;
      let name = r.string()?;
      let signature = r.string()?;
      let _mod_bits = r.int()?;
      methods.push(MethodInfo {
        id,
        name,
        signature,
      });
    }
    let methods = Arc::new(methods);
    self.caches.lock().methods.insert(class, methods.clone());
    Ok(methods)
  }

  async fn fields(&self, class: u64) -> VmResult<Arc<Vec<FieldInfo>>> {
    if let Some(fields) = self.caches.lock().fields.get(&class) {
      return Ok(fields.clone());
    }
    let mut w = self.client.writer();
    w.reference_id(class);
    let mut r = self.client.command(REFTYPE_FIELDS, w.into_bytes()).await?;
    let count = r.int()?;
    let mut fields = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
      let id = r.field_id()?;
      let name = r.string()?;
      let _signature = r.string()?;
      let mod_bits = r.int()? as u32;
      fields.push(FieldInfo {
        id,
        name,
        mod_bits,
      });
    }
    let fields = Arc::new(fields);
    self.caches.lock().fields.insert(class, fields.clone());
    Ok(fields)
  }

  async fn line_table(
    &self,
    class: u64,
    method: u64,
  ) -> VmResult<Arc<Vec<(u64, u32)>>> {
    if let Some(table) = self.caches.lock().line_tables.get(&(class, method))
    {
      return Ok(table.clone());
    }
    let mut w = self.client.writer();
    w.reference_id(class).method_id(method);
    let table = match self.client.command(METHOD_LINE_TABLE, w.into_bytes()).await
    {
      Ok(mut r) => {
        let _start = r.long()?;
        let _end = r.long()?;
        let count = r.int()?;
        let mut entries = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
          let index = r.long()? as u64;
          let line = r.int()? as u32;
          entries.push((index, line));
        }
        entries.sort();
        entries
      }
      Err(VmErr::Jdwp(ERR_ABSENT_INFORMATION))
      | Err(VmErr::Jdwp(ERR_NATIVE_METHOD)) => vec![],
      Err(err) => return Err(err),
    };
    let table = Arc::new(table);
    self
      .caches
      .lock()
      .line_tables
      .insert((class, method), table.clone());
    Ok(table)
  }

  async fn line_for(&self, class: u64, method: u64, index: u64) -> u32 {
    match self.line_table(class, method).await {
      Ok(table) => table
        .iter()
        .take_while(|(i, _)| *i <= index)
        .last()
        .map(|(_, line)| *line)
        .unwrap_or(0),
      Err(_) => 0,
    }
  }

  async fn resolve_location(&self, loc: &JdwpLocation) -> VmLocation {
    VmLocation {
      class: ClassId(loc.class),
      method: MethodId(loc.method),
      code_index: loc.index,
      line: self.line_for(loc.class, loc.method, loc.index).await,
    }
  }

  fn wire_location(&self, loc: &VmLocation) -> JdwpLocation {
    JdwpLocation {
      type_tag: 1, // CLASS
      class: loc.class.0,
      method: loc.method.0,
      index: loc.code_index,
    }
  }

  async fn superclass(&self, class: u64) -> VmResult<u64> {
    if let Some(sup) = self.caches.lock().superclasses.get(&class) {
      return Ok(*sup);
    }
    let mut w = self.client.writer();
    w.reference_id(class);
    let mut r = self
      .client
      .command(CLASSTYPE_SUPERCLASS, w.into_bytes())
      .await?;
    let sup = r.reference_id()?;
    self.caches.lock().superclasses.insert(class, sup);
    Ok(sup)
  }

  async fn interfaces(&self, class: u64) -> VmResult<Vec<u64>> {
    let mut w = self.client.writer();
    w.reference_id(class);
    let mut r = self
      .client
      .command(REFTYPE_INTERFACES, w.into_bytes())
      .await?;
    let count = r.int()?;
    let mut ids = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
      ids.push(r.reference_id()?);
    }
    Ok(ids)
  }

  /// Names of the class, its superclasses and every implemented
  /// interface, transitively.
  async fn ancestors(&self, class: u64) -> VmResult<Arc<Vec<String>>> {
    if let Some(names) = self.caches.lock().ancestors.get(&class) {
      return Ok(names.clone());
    }
    let mut names = Vec::new();
    let mut pending = vec![class];
    let mut seen = HashSet::new();
    while let Some(current) = pending.pop() {
      if current == 0 || !seen.insert(current) {
        continue;
      }
      names.push(self.class_name(current).await?);
      if let Ok(sup) = self.superclass(current).await {
        pending.push(sup);
      }
      if let Ok(ifaces) = self.interfaces(current).await {
        pending.extend(ifaces);
      }
    }
    let names = Arc::new(names);
    self.caches.lock().ancestors.insert(class, names.clone());
    Ok(names)
  }

  async fn runtime_class(&self, object: u64) -> VmResult<u64> {
    if let Some(class) = self.caches.lock().object_types.get(&object) {
      return Ok(*class);
    }
    let mut w = self.client.writer();
    w.object_id(object);
    let mut r = self
      .client
      .command(OBJECT_REFERENCE_TYPE, w.into_bytes())
      .await?;
    let _tag = r.byte()?;
    let class = r.reference_id()?;
    self.caches.lock().object_types.insert(object, class);
    Ok(class)
  }

  async fn object_ref(&self, id: u64) -> VmResult<ObjectRef> {
    let class = self.runtime_class(id).await?;
    Ok(ObjectRef {
      id,
      class_name: self.class_name(class).await?,
    })
  }

  async fn to_vm_value(&self, value: JdwpValue) -> VmResult<VmValue> {
    Ok(match value {
      JdwpValue::Void => VmValue::Void,
      JdwpValue::Boolean(v) => VmValue::Boolean(v),
      JdwpValue::Byte(v) => VmValue::Byte(v),
      JdwpValue::Short(v) => VmValue::Short(v),
      JdwpValue::Char(v) => VmValue::Char(v),
      JdwpValue::Int(v) => VmValue::Int(v),
      JdwpValue::Long(v) => VmValue::Long(v),
      JdwpValue::Float(v) => VmValue::Float(v),
      JdwpValue::Double(v) => VmValue::Double(v),
      JdwpValue::Object { id: 0, .. } => VmValue::Null,
      JdwpValue::Object { tag: TAG_STRING, id } => VmValue::Object(ObjectRef {
        id,
        class_name: "java.lang.String".to_string(),
      }),
      JdwpValue::Object { id, .. } => VmValue::Object(self.object_ref(id).await?),
    })
  }

  fn to_wire_value(&self, value: &VmValue) -> JdwpValue {
    match value {
      VmValue::Void => JdwpValue::Void,
      VmValue::Null => JdwpValue::Object {
        tag: TAG_OBJECT,
        id: 0,
      },
      VmValue::Boolean(v) => JdwpValue::Boolean(*v),
      VmValue::Byte(v) => JdwpValue::Byte(*v),
      VmValue::Short(v) => JdwpValue::Short(*v),
      VmValue::Char(v) => JdwpValue::Char(*v),
      VmValue::Int(v) => JdwpValue::Int(*v),
      VmValue::Long(v) => JdwpValue::Long(*v),
      VmValue::Float(v) => JdwpValue::Float(*v),
      VmValue::Double(v) => JdwpValue::Double(*v),
      VmValue::Object(obj) => {
        let tag = if obj.class_name == "java.lang.String" {
          TAG_STRING
        } else if obj.class_name.ends_with("[]") {
          TAG_ARRAY
        } else {
          TAG_OBJECT
        };
        JdwpValue::Object { tag, id: obj.id }
      }
    }
  }

  /// Resolves a method by name (and signature, when given) on the class
  /// or one of its superclasses. Absence of a named engine entry point is
  /// a configuration error, not a transient failure.
  async fn find_method(
    &self,
    class: u64,
    name: &str,
    signature: &str,
  ) -> VmResult<(u64, u64)> {
    let mut current = class;
    while current != 0 {
      let methods = self.methods(current).await?;
      if let Some(m) = methods
        .iter()
        .find(|m| m.name == name && (signature.is_empty() || m.signature == signature))
      {
        return Ok((current, m.id));
      }
      current = self.superclass(current).await?;
    }
    Err(VmErr::EngineMismatch(format!(
      "method {name}{signature} not found on {}",
      self
        .class_name(class)
        .await
        .unwrap_or_else(|_| class.to_string())
    )))
  }

  /// Decodes the shared reply shape of both invoke commands.
  async fn decode_invoke_reply(
    &self,
    mut r: PacketReader,
  ) -> VmResult<VmValue> {
    let value = r.tagged_value()?;
    let exception = r.tagged_value()?;
    if let JdwpValue::Object { id, .. } = exception {
      if id != 0 {
        return Err(VmErr::InvocationException(self.object_ref(id).await?));
      }
    }
    self.to_vm_value(value).await
  }

  async fn event_to_vm(&self, event: JdwpEvent) -> VmResult<Option<VmEvent>> {
    Ok(match event {
      JdwpEvent::VmStart => Some(VmEvent::VmStart),
      JdwpEvent::VmDeath => Some(VmEvent::VmDeath),
      JdwpEvent::SingleStep { .. } => None,
      JdwpEvent::Breakpoint {
        request_id,
        thread,
        location,
      } => Some(VmEvent::Breakpoint {
        request: request_id,
        thread: ThreadId(thread),
        location: self.resolve_location(&location).await,
      }),
      JdwpEvent::MethodEntry {
        request_id,
        thread,
        location,
      } => Some(VmEvent::MethodEntry {
        request: request_id,
        thread: ThreadId(thread),
        location: self.resolve_location(&location).await,
      }),
      JdwpEvent::MethodExit {
        request_id,
        thread,
        location,
      } => Some(VmEvent::MethodExit {
        request: request_id,
        thread: ThreadId(thread),
        location: self.resolve_location(&location).await,
      }),
      JdwpEvent::ClassPrepare {
        type_id, signature, ..
      } => Some(VmEvent::ClassPrepare {
        class: RefType {
          id: ClassId(type_id),
          name: signature_to_name(&signature),
        },
      }),
      JdwpEvent::Exception {
        request_id,
        thread,
        location,
        exception,
        caught,
      } => Some(VmEvent::Exception {
        request: request_id,
        thread: ThreadId(thread),
        location: self.resolve_location(&location).await,
        exception: self.object_ref(exception).await?,
        caught,
      }),
    })
  }

  async fn set_event_request(
    &self,
    kind: EventRequestKind,
    suspend_policy: u8,
    modifiers: impl FnOnce(&mut crate::jdwp::packet::PacketWriter),
  ) -> VmResult<RequestHandle> {
    let mut w = self.client.writer();
    w.byte(kind_byte(kind)).byte(suspend_policy);
    modifiers(&mut w);
    let mut r = self
      .client
      .command(EVENT_REQUEST_SET, w.into_bytes())
      .await?;
    Ok(RequestHandle {
      kind,
      id: r.int()?,
    })
  }

  async fn object_array_class(&self) -> VmResult<u64> {
    if let Some(id) = self.caches.lock().object_array_class {
      return Ok(id);
    }
    let mut w = self.client.writer();
    w.string("[Ljava/lang/Object;");
    let mut r = self
      .client
      .command(VM_CLASSES_BY_SIGNATURE, w.into_bytes())
      .await?;
    let count = r.int()?;
    if count < 1 {
      return Err(VmErr::EngineMismatch(
        "java.lang.Object[] class not loaded in target".to_string(),
      ));
    }
    let _tag = r.byte()?;
    let id = r.reference_id()?;
    self.caches.lock().object_array_class = Some(id);
    Ok(id)
  }
}

impl Drop for JdwpVm {
  fn drop(&mut self) {
    // Stops the reader and fails any in-flight commands.
    self.client.shutdown();
  }
}

fn kind_byte(kind: EventRequestKind) -> u8 {
  match kind {
    EventRequestKind::Breakpoint => EVENT_BREAKPOINT,
    EventRequestKind::ClassPrepare => EVENT_CLASS_PREPARE,
    EventRequestKind::Exception => EVENT_EXCEPTION,
    EventRequestKind::MethodEntry => EVENT_METHOD_ENTRY,
    EventRequestKind::MethodExit => EVENT_METHOD_EXIT,
  }
}

fn suspend_policy(policy: u8) -> SuspendPolicy {
  match policy {
    SUSPEND_EVENT_THREAD => SuspendPolicy::EventThread,
    SUSPEND_ALL => SuspendPolicy::All,
    _ => SuspendPolicy::None,
  }
}

#[async_trait]
impl Vm for JdwpVm {
  async fn next_event_set(&self) -> Option<VmEventSet> {
    loop {
      let composite = self.events.lock().await.recv().await?;
      let mut events = Vec::with_capacity(composite.events.len());
      for event in composite.events {
        match self.event_to_vm(event).await {
          Ok(Some(event)) => events.push(event),
          Ok(None) => {}
          Err(err) => warn!("dropping undecodable VM event: {err}"),
        }
      }
      let set = VmEventSet {
        suspend_policy: suspend_policy(composite.suspend_policy),
        events,
      };
      if set.events.is_empty() && set.suspend_policy == SuspendPolicy::None {
        continue;
      }
      return Some(set);
    }
  }

  async fn resume_event_set(&self, set: &VmEventSet) -> VmResult<()> {
    match set.suspend_policy {
      SuspendPolicy::None => Ok(()),
      SuspendPolicy::All => self.resume_all().await,
      SuspendPolicy::EventThread => {
        let thread = set.events.iter().find_map(|e| match e {
          VmEvent::Breakpoint { thread, .. }
          | VmEvent::Exception { thread, .. }
          | VmEvent::MethodEntry { thread, .. }
          | VmEvent::MethodExit { thread, .. } => Some(*thread),
          _ => None,
        });
        let Some(thread) = thread else {
          return Ok(());
        };
        let mut w = self.client.writer();
        w.object_id(thread.0);
        self.client.command(THREAD_RESUME, w.into_bytes()).await?;
        Ok(())
      }
    }
  }

  async fn resume_all(&self) -> VmResult<()> {
    self.client.command(VM_RESUME, vec![]).await?;
    Ok(())
  }

  async fn suspend_all(&self) -> VmResult<()> {
    self.client.command(VM_SUSPEND, vec![]).await?;
    Ok(())
  }

  async fn all_classes(&self) -> VmResult<Vec<RefType>> {
    let mut r = self.client.command(VM_ALL_CLASSES, vec![]).await?;
    let count = r.int()?;
    let mut classes = Vec::with_capacity(count.max(0) as usize);
    let mut caches = self.caches.lock();
    for _ in 0..count {
      let _tag = r.byte()?;
      let id = r.reference_id()?;
      let name = signature_to_name(&r.string()?);
      let _status = r.int()?;
      caches.class_names.insert(id, name.clone());
      classes.push(RefType {
        id: ClassId(id),
        name,
      });
    }
    Ok(classes)
  }

  async fn line_locations(&self, class: ClassId) -> VmResult<Vec<VmLocation>> {
    let methods = self.methods(class.0).await?;
    let mut locations = Vec::new();
    for method in methods.iter() {
      let table = self.line_table(class.0, method.id).await?;
      for (index, line) in table.iter() {
        locations.push(VmLocation {
          class,
          method: MethodId(method.id),
          code_index: *index,
          line: *line,
        });
      }
    }
    Ok(locations)
  }

  async fn source_name(&self, class: ClassId) -> VmResult<Option<String>> {
    let mut w = self.client.writer();
    w.reference_id(class.0);
    match self.client.command(REFTYPE_SOURCE_FILE, w.into_bytes()).await {
      Ok(mut r) => Ok(Some(r.string()?)),
      Err(VmErr::Jdwp(ERR_ABSENT_INFORMATION)) => Ok(None),
      Err(err) => Err(err),
    }
  }

  async fn method_location(
    &self,
    class: ClassId,
    method: &str,
  ) -> VmResult<Option<VmLocation>> {
    let methods = self.methods(class.0).await?;
    let Some(info) = methods.iter().find(|m| m.name == method) else {
      return Ok(None);
    };
    let table = self.line_table(class.0, info.id).await?;
    let (code_index, line) = table.first().copied().unwrap_or((0, 0));
    Ok(Some(VmLocation {
      class,
      method: MethodId(info.id),
      code_index,
      line,
    }))
  }

  async fn static_field(
    &self,
    class: ClassId,
    name: &str,
  ) -> VmResult<Option<VmValue>> {
    let fields = self.fields(class.0).await?;
    let Some(field) = fields.iter().find(|f| f.name == name && f.is_static())
    else {
      return Ok(None);
    };
    let mut w = self.client.writer();
    w.reference_id(class.0).int(1).field_id(field.id);
    let mut r = self
      .client
      .command(REFTYPE_GET_VALUES, w.into_bytes())
      .await?;
    let _count = r.int()?;
    let value = r.tagged_value()?;
    Ok(Some(self.to_vm_value(value).await?))
  }

  async fn instance_field(
    &self,
    object: &ObjectRef,
    name: &str,
  ) -> VmResult<Option<VmValue>> {
    let mut class = self.runtime_class(object.id).await?;
    while class != 0 {
      let fields = self.fields(class).await?;
      if let Some(field) =
        fields.iter().find(|f| f.name == name && !f.is_static())
      {
        let mut w = self.client.writer();
        w.object_id(object.id).int(1).field_id(field.id);
        let mut r = self
          .client
          .command(OBJECT_GET_VALUES, w.into_bytes())
          .await?;
        let _count = r.int()?;
        let value = r.tagged_value()?;
        return Ok(Some(self.to_vm_value(value).await?));
      }
      class = self.superclass(class).await?;
    }
    Ok(None)
  }

  async fn instance_fields(
    &self,
    object: &ObjectRef,
  ) -> VmResult<Vec<(String, VmValue)>> {
    let class = self.runtime_class(object.id).await?;
    let fields = self.fields(class).await?;
    let instance: Vec<&FieldInfo> =
      fields.iter().filter(|f| !f.is_static()).collect();
    if instance.is_empty() {
      return Ok(vec![]);
    }
    let mut w = self.client.writer();
    w.object_id(object.id).int(instance.len() as i32);
    for field in &instance {
      w.field_id(field.id);
    }
    let mut r = self
      .client
      .command(OBJECT_GET_VALUES, w.into_bytes())
      .await?;
    let count = r.int()?;
    let mut values = Vec::with_capacity(count.max(0) as usize);
    for field in instance.iter().take(count.max(0) as usize) {
      let value = r.tagged_value()?;
      values.push((field.name.clone(), self.to_vm_value(value).await?));
    }
    Ok(values)
  }

  async fn instance_of(
    &self,
    object: &ObjectRef,
    class_name: &str,
  ) -> VmResult<bool> {
    let class = self.runtime_class(object.id).await?;
    let ancestors = self.ancestors(class).await?;
    Ok(ancestors.iter().any(|name| name == class_name))
  }

  async fn read_string(&self, object: &ObjectRef) -> VmResult<String> {
    let mut w = self.client.writer();
    w.object_id(object.id);
    let mut r = self.client.command(STRING_VALUE, w.into_bytes()).await?;
    r.string()
  }

  async fn create_string(&self, text: &str) -> VmResult<VmValue> {
    let mut w = self.client.writer();
    w.string(text);
    let mut r = self
      .client
      .command(VM_CREATE_STRING, w.into_bytes())
      .await?;
    let id = r.object_id()?;
    Ok(VmValue::Object(ObjectRef {
      id,
      class_name: "java.lang.String".to_string(),
    }))
  }

  async fn array_length(&self, array: &ObjectRef) -> VmResult<usize> {
    let mut w = self.client.writer();
    w.object_id(array.id);
    let mut r = self.client.command(ARRAY_LENGTH, w.into_bytes()).await?;
    Ok(r.int()?.max(0) as usize)
  }

  async fn array_values(&self, array: &ObjectRef) -> VmResult<Vec<VmValue>> {
    let length = self.array_length(array).await?;
    if length == 0 {
      return Ok(vec![]);
    }
    let mut w = self.client.writer();
    w.object_id(array.id).int(0).int(length as i32);
    let mut r = self
      .client
      .command(ARRAY_GET_VALUES, w.into_bytes())
      .await?;
    let component_tag = r.byte()?;
    let count = r.int()?;
    let tagged = matches!(
      component_tag,
      TAG_OBJECT
        | TAG_ARRAY
        | TAG_STRING
        | TAG_THREAD
        | TAG_THREAD_GROUP
        | TAG_CLASS_LOADER
        | TAG_CLASS_OBJECT
    );
    let mut values = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
      let raw = if tagged {
        r.tagged_value()?
      } else {
        r.value_of_tag(component_tag)?
      };
      values.push(self.to_vm_value(raw).await?);
    }
    Ok(values)
  }

  async fn create_object_array(&self, length: usize) -> VmResult<ObjectRef> {
    let class = self.object_array_class().await?;
    let mut w = self.client.writer();
    w.reference_id(class).int(length as i32);
    let mut r = self
      .client
      .command(ARRAYTYPE_NEW_INSTANCE, w.into_bytes())
      .await?;
    let value = r.tagged_value()?;
    match value {
      JdwpValue::Object { id, .. } => Ok(ObjectRef {
        id,
        class_name: "java.lang.Object[]".to_string(),
      }),
      _ => Err(VmErr::Protocol("array creation returned no object")),
    }
  }

  async fn set_array_element(
    &self,
    array: &ObjectRef,
    index: usize,
    value: &VmValue,
  ) -> VmResult<()> {
    let mut w = self.client.writer();
    w.object_id(array.id).int(index as i32).int(1);
    w.untagged_value(&self.to_wire_value(value));
    self.client.command(ARRAY_SET_VALUES, w.into_bytes()).await?;
    Ok(())
  }

  async fn all_threads(&self) -> VmResult<Vec<(ThreadId, String)>> {
    let mut r = self.client.command(VM_ALL_THREADS, vec![]).await?;
    let count = r.int()?;
    let mut ids = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
      ids.push(r.object_id()?);
    }
    let mut threads = Vec::with_capacity(ids.len());
    for id in ids {
      let mut w = self.client.writer();
      w.object_id(id);
      let name = match self.client.command(THREAD_NAME, w.into_bytes()).await
      {
        Ok(mut r) => r.string()?,
        Err(_) => String::new(),
      };
      threads.push((ThreadId(id), name));
    }
    Ok(threads)
  }

  async fn frames(&self, thread: ThreadId) -> VmResult<Vec<FrameInfo>> {
    let mut w = self.client.writer();
    w.object_id(thread.0).int(0).int(-1);
    let mut r = self.client.command(THREAD_FRAMES, w.into_bytes()).await?;
    let count = r.int()?;
    let mut raw = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
      let id = r.frame_id()?;
      let location = r.location()?;
      raw.push((id, location));
    }
    let mut frames = Vec::with_capacity(raw.len());
    for (id, location) in raw {
      let methods = self.methods(location.class).await?;
      let method_name = methods
        .iter()
        .find(|m| m.id == location.method)
        .map(|m| m.name.clone())
        .unwrap_or_default();
      frames.push(FrameInfo {
        id,
        location: self.resolve_location(&location).await,
        method_name,
      });
    }
    Ok(frames)
  }

  async fn visible_variables(
    &self,
    thread: ThreadId,
    frame: u64,
  ) -> VmResult<Vec<VariableInfo>> {
    let frames = self.frames(thread).await?;
    let Some(info) = frames.iter().find(|f| f.id == frame) else {
      return Ok(vec![]);
    };
    let mut w = self.client.writer();
    w.reference_id(info.location.class.0)
      .method_id(info.location.method.0);
    let mut r = match self
      .client
      .command(METHOD_VARIABLE_TABLE, w.into_bytes())
      .await
    {
      Ok(r) => r,
      Err(VmErr::Jdwp(ERR_ABSENT_INFORMATION)) => return Ok(vec![]),
      Err(err) => return Err(err),
    };
    let _arg_count = r.int()?;
    let count = r.int()?;
    let mut vars = Vec::new();
    for _ in 0..count {
      let code_index = r.long()? as u64;
      let name = r.string()?;
      let signature = r.string()?;
      let length = r.int()? as u64;
      let slot = r.int()? as u32;
      let current = info.location.code_index;
      if current >= code_index && current < code_index + length {
        vars.push(VariableInfo {
          name,
          slot,
          signature,
        });
      }
    }
    Ok(vars)
  }

  async fn local_values(
    &self,
    thread: ThreadId,
    frame: u64,
    vars: &[VariableInfo],
  ) -> VmResult<Vec<VmValue>> {
    let mut w = self.client.writer();
    w.object_id(thread.0).frame_id(frame).int(vars.len() as i32);
    for var in vars {
      w.int(var.slot as i32)
        .byte(slot_tag(&var.signature));
    }
    let mut r = self
      .client
      .command(STACKFRAME_GET_VALUES, w.into_bytes())
      .await?;
    let count = r.int()?;
    let mut values = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
      let raw = r.tagged_value()?;
      values.push(self.to_vm_value(raw).await?);
    }
    Ok(values)
  }

  async fn local_value(
    &self,
    thread: ThreadId,
    frame: u64,
    var: &VariableInfo,
  ) -> VmResult<VmValue> {
    let values = self
      .local_values(thread, frame, std::slice::from_ref(var))
      .await?;
    values
      .into_iter()
      .next()
      .ok_or(VmErr::Protocol("empty slot-value reply"))
  }

  async fn set_local_value(
    &self,
    thread: ThreadId,
    frame: u64,
    var: &VariableInfo,
    value: &VmValue,
  ) -> VmResult<()> {
    let mut w = self.client.writer();
    w.object_id(thread.0).frame_id(frame).int(1);
    w.int(var.slot as i32);
    w.tagged_value(&self.to_wire_value(value));
    self
      .client
      .command(STACKFRAME_SET_VALUES, w.into_bytes())
      .await?;
    Ok(())
  }

  async fn invoke_static(
    &self,
    class: ClassId,
    method: &str,
    signature: &str,
    args: &[VmValue],
    thread: ThreadId,
  ) -> VmResult<VmValue> {
    let (_, method_id) = self.find_method(class.0, method, signature).await?;
    let mut w = self.client.writer();
    w.reference_id(class.0)
      .object_id(thread.0)
      .method_id(method_id)
      .int(args.len() as i32);
    for arg in args {
      w.tagged_value(&self.to_wire_value(arg));
    }
    w.int(0); // options
    let r = self
      .client
      .command(CLASSTYPE_INVOKE_METHOD, w.into_bytes())
      .await?;
    self.decode_invoke_reply(r).await
  }

  async fn invoke_instance(
    &self,
    object: &ObjectRef,
    method: &str,
    signature: &str,
    args: &[VmValue],
    thread: ThreadId,
  ) -> VmResult<VmValue> {
    let class = self.runtime_class(object.id).await?;
    let (decl_class, method_id) =
      self.find_method(class, method, signature).await?;
    let mut w = self.client.writer();
    w.object_id(object.id)
      .object_id(thread.0)
      .reference_id(decl_class)
      .method_id(method_id)
      .int(args.len() as i32);
    for arg in args {
      w.tagged_value(&self.to_wire_value(arg));
    }
    w.int(0); // options
    let r = self
      .client
      .command(OBJECT_INVOKE_METHOD, w.into_bytes())
      .await?;
    self.decode_invoke_reply(r).await
  }

  async fn set_breakpoint_request(
    &self,
    location: &VmLocation,
  ) -> VmResult<RequestHandle> {
    let wire = self.wire_location(location);
    self
      .set_event_request(
        EventRequestKind::Breakpoint,
        SUSPEND_EVENT_THREAD,
        |w| {
          w.int(1).byte(MOD_LOCATION_ONLY).location(&wire);
        },
      )
      .await
  }

  async fn set_class_prepare_request(&self) -> VmResult<RequestHandle> {
    self
      .set_event_request(EventRequestKind::ClassPrepare, SUSPEND_NONE, |w| {
        w.int(0);
      })
      .await
  }

  async fn set_exception_request(
    &self,
    class_pattern: &str,
    caught: bool,
    uncaught: bool,
  ) -> VmResult<RequestHandle> {
    self
      .set_event_request(
        EventRequestKind::Exception,
        SUSPEND_EVENT_THREAD,
        |w| {
          w.int(2);
          w.byte(MOD_CLASS_MATCH).string(class_pattern);
          w.byte(MOD_EXCEPTION_ONLY)
            .reference_id(0)
            .boolean(caught)
            .boolean(uncaught);
        },
      )
      .await
  }

  async fn set_method_entry_request(
    &self,
    class_pattern: &str,
  ) -> VmResult<RequestHandle> {
    self
      .set_event_request(
        EventRequestKind::MethodEntry,
        SUSPEND_EVENT_THREAD,
        |w| {
          w.int(1).byte(MOD_CLASS_MATCH).string(class_pattern);
        },
      )
      .await
  }

  async fn set_method_exit_request(
    &self,
    class_pattern: &str,
  ) -> VmResult<RequestHandle> {
    self
      .set_event_request(
        EventRequestKind::MethodExit,
        SUSPEND_EVENT_THREAD,
        |w| {
          w.int(1).byte(MOD_CLASS_MATCH).string(class_pattern);
        },
      )
      .await
  }

  async fn clear_request(&self, handle: RequestHandle) -> VmResult<()> {
    let mut w = self.client.writer();
    w.byte(kind_byte(handle.kind)).int(handle.id);
    self
      .client
      .command(EVENT_REQUEST_CLEAR, w.into_bytes())
      .await?;
    Ok(())
  }
}

fn slot_tag(signature: &str) -> u8 {
  match signature.as_bytes().first().copied() {
    Some(b'L') | Some(b'[') | None => TAG_OBJECT,
    Some(b) => b,
  }
}
