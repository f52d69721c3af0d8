//! Engine adapter: every Nashorn-specific class name, field path and
//! method signature the host relies on lives here, so an engine upgrade
//! that moves one of them fails loudly in a single place.

/// Class-name prefix of compiled script classes.
pub const SCRIPT_CLASS_PREFIX: &str = "jdk.nashorn.internal.scripts.Script$";

/// Package prefix stripped when synthesizing eval paths.
pub const SCRIPT_PACKAGE_PREFIX: &str = "jdk.nashorn.internal.scripts.";

/// Class-match pattern covering all compiled script classes.
pub const SCRIPT_CLASS_PATTERN: &str = "jdk.nashorn.internal.scripts.*";

/// Source name the engine records for dynamically evaluated code.
pub const EVAL_SOURCE_NAME: &str = "<eval>";

pub const SCRIPT_RUNTIME: &str = "jdk.nashorn.internal.runtime.ScriptRuntime";
pub const CONTEXT: &str = "jdk.nashorn.internal.runtime.Context";
pub const SCRIPT_OBJECT: &str = "jdk.nashorn.internal.runtime.ScriptObject";
pub const SCRIPT_FUNCTION: &str =
  "jdk.nashorn.internal.runtime.ScriptFunction";
pub const ECMA_EXCEPTION: &str = "jdk.nashorn.internal.runtime.ECMAException";
pub const UNDEFINED: &str = "jdk.nashorn.internal.runtime.Undefined";
pub const CONS_STRING: &str = "jdk.nashorn.internal.runtime.ConsString";
pub const SCRIPT_OBJECT_MIRROR: &str =
  "jdk.nashorn.api.scripting.ScriptObjectMirror";
pub const NATIVE_ARRAY: &str = "jdk.nashorn.internal.objects.NativeArray";
pub const NATIVE_DATE: &str = "jdk.nashorn.internal.objects.NativeDate";
pub const NATIVE_REGEXP: &str = "jdk.nashorn.internal.objects.NativeRegExp";
pub const GLOBAL: &str = "jdk.nashorn.internal.objects.Global";
pub const HASHTABLE: &str = "java.util.Hashtable";
pub const JAVA_STRING: &str = "java.lang.String";

/// Scope-chain classification suffixes.
pub const GLOBAL_SUFFIX: &str = ".Global";
pub const WITH_OBJECT_SUFFIX: &str = ".WithObject";

/// Method on `ScriptRuntime` that realizes the JavaScript `debugger`
/// statement; the host keeps a fixed breakpoint in it.
pub const DEBUGGER_METHOD: &str = "DEBUGGER";

/// Synthetic local names the engine stores in script frames.
pub const THIS_LOCAL: &str = ":this";
pub const SCOPE_LOCAL: &str = ":scope";
pub const RETURN_LOCAL: &str = ":return";

/// Source recovery path: static field `source` on the script class, then
/// `data` on the `Source`, then `array` on the `Source$RawData`.
pub const SOURCE_FIELD: &str = "source";
pub const SOURCE_DATA_FIELD: &str = "data";
pub const RAW_DATA_ARRAY_FIELD: &str = "array";

/// `ScriptRuntime.UNDEFINED` static, used as the call receiver when
/// applying synthesized script functions.
pub const UNDEFINED_FIELD: &str = "UNDEFINED";

// Method names and JNI signatures for invocation through the wire.

pub const CONTEXT_GET_GLOBAL: (&str, &str) = (
  "getGlobal",
  "()Ljdk/nashorn/internal/objects/Global;",
);
pub const GLOBAL_GET_CONTEXT: (&str, &str) = (
  "getContext",
  "()Ljdk/nashorn/internal/runtime/Context;",
);
pub const CONTEXT_EVAL: (&str, &str) = (
  "eval",
  "(Ljdk/nashorn/internal/runtime/ScriptObject;Ljava/lang/String;Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;",
);
pub const SCRIPT_RUNTIME_APPLY: (&str, &str) = (
  "apply",
  "(Ljdk/nashorn/internal/runtime/ScriptFunction;Ljava/lang/Object;[Ljava/lang/Object;)Ljava/lang/Object;",
);
pub const SCRIPT_OBJECT_PUT: (&str, &str) = (
  "put",
  "(Ljava/lang/Object;Ljava/lang/Object;Z)Ljava/lang/Object;",
);
pub const SCRIPT_OBJECT_GET: (&str, &str) =
  ("get", "(Ljava/lang/Object;)Ljava/lang/Object;");
pub const SCRIPT_OBJECT_GET_OWN_KEYS: (&str, &str) =
  ("getOwnKeys", "(Z)[Ljava/lang/String;");
pub const SCRIPT_OBJECT_GET_PROTO: (&str, &str) =
  ("getProto", "()Ljdk/nashorn/internal/runtime/ScriptObject;");
pub const SCRIPT_OBJECT_GET_OWN_PROPERTY_DESCRIPTOR: (&str, &str) = (
  "getOwnPropertyDescriptor",
  "(Ljava/lang/String;)Ljava/lang/Object;",
);
pub const SCRIPT_OBJECT_GET_CLASS_NAME: (&str, &str) =
  ("getClassName", "()Ljava/lang/String;");
pub const SCRIPT_FUNCTION_GET_NAME: (&str, &str) =
  ("getName", "()Ljava/lang/String;");
pub const SCRIPT_FUNCTION_TO_SOURCE: (&str, &str) =
  ("toSource", "()Ljava/lang/String;");
pub const NATIVE_ARRAY_AS_OBJECT_ARRAY: (&str, &str) =
  ("asObjectArray", "()[Ljava/lang/Object;");
pub const OBJECT_TO_STRING: (&str, &str) =
  ("toString", "()Ljava/lang/String;");
pub const MIRROR_KEY_SET: (&str, &str) = ("keySet", "()Ljava/util/Set;");
pub const MIRROR_GET_MEMBER: (&str, &str) =
  ("getMember", "(Ljava/lang/String;)Ljava/lang/Object;");
pub const MIRROR_GET_SLOT: (&str, &str) =
  ("getSlot", "(I)Ljava/lang/Object;");
pub const SET_TO_ARRAY: (&str, &str) =
  ("toArray", "()[Ljava/lang/Object;");
pub const HASHTABLE_KEYS: (&str, &str) =
  ("keys", "()Ljava/util/Enumeration;");
pub const ENUMERATION_HAS_MORE: (&str, &str) =
  ("hasMoreElements", "()Z");
pub const ENUMERATION_NEXT: (&str, &str) =
  ("nextElement", "()Ljava/lang/Object;");
pub const HASHTABLE_GET: (&str, &str) =
  ("get", "(Ljava/lang/Object;)Ljava/lang/Object;");
pub const THROWABLE_GET_MESSAGE: (&str, &str) =
  ("getMessage", "()Ljava/lang/String;");
pub const ECMA_EXCEPTION_THROWN_FIELD: &str = "thrown";

/// Boxed-primitive classes cached at initialization for `valueOf` calls.
pub const BOXED_CLASSES: [&str; 4] = [
  "java.lang.Integer",
  "java.lang.Long",
  "java.lang.Double",
  "java.lang.Boolean",
];

pub const INTEGER_VALUE_OF: (&str, &str) =
  ("valueOf", "(I)Ljava/lang/Integer;");
pub const LONG_VALUE_OF: (&str, &str) = ("valueOf", "(J)Ljava/lang/Long;");
pub const DOUBLE_VALUE_OF: (&str, &str) =
  ("valueOf", "(D)Ljava/lang/Double;");
pub const BOOLEAN_VALUE_OF: (&str, &str) =
  ("valueOf", "(Z)Ljava/lang/Boolean;");

/// Instance field holding the primitive inside a boxed wrapper.
pub const BOXED_VALUE_FIELD: &str = "value";

/// Classes the host captures during class scanning for later invocation.
pub fn is_wanted_class(name: &str) -> bool {
  name == SCRIPT_RUNTIME || name == CONTEXT || BOXED_CLASSES.contains(&name)
}

/// Whether the class is a compiled script class.
pub fn is_script_class(name: &str) -> bool {
  name.starts_with(SCRIPT_CLASS_PREFIX)
}

/// Whether the runtime class name is a boxed primitive wrapper.
pub fn is_boxed_primitive(name: &str) -> bool {
  BOXED_CLASSES.contains(&name)
}

/// Threads that belong to VM infrastructure rather than script execution;
/// they are skipped when seeding pause-at-next-statement.
pub fn is_infrastructure_thread(name: &str) -> bool {
  const INFRASTRUCTURE: [&str; 6] = [
    "Finalizer",
    "Reference Handler",
    "Signal Dispatcher",
    "Attach Listener",
    "Common-Cleaner",
    "Notification Thread",
  ];
  INFRASTRUCTURE.contains(&name) || name.starts_with("JDWP")
}
