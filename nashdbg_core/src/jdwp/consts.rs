//! Protocol constants: command ids, event kinds, tags and error codes.

/// Exchanged verbatim by both sides before any packet.
pub const HANDSHAKE: &[u8; 14] = b"JDWP-Handshake";

/// Header flag marking a reply packet.
pub const FLAG_REPLY: u8 = 0x80;

pub const HEADER_LEN: usize = 11;

// Command sets and commands, as (set, command) pairs.

pub const VM_ALL_CLASSES: (u8, u8) = (1, 3);
pub const VM_ALL_THREADS: (u8, u8) = (1, 4);
pub const VM_ID_SIZES: (u8, u8) = (1, 7);
pub const VM_SUSPEND: (u8, u8) = (1, 8);
pub const VM_RESUME: (u8, u8) = (1, 9);
pub const VM_CREATE_STRING: (u8, u8) = (1, 11);
pub const VM_CLASSES_BY_SIGNATURE: (u8, u8) = (1, 2);

pub const REFTYPE_SIGNATURE: (u8, u8) = (2, 1);
pub const REFTYPE_FIELDS: (u8, u8) = (2, 4);
pub const REFTYPE_METHODS: (u8, u8) = (2, 5);
pub const REFTYPE_GET_VALUES: (u8, u8) = (2, 6);
pub const REFTYPE_SOURCE_FILE: (u8, u8) = (2, 7);
pub const REFTYPE_INTERFACES: (u8, u8) = (2, 10);

pub const CLASSTYPE_SUPERCLASS: (u8, u8) = (3, 1);
pub const CLASSTYPE_INVOKE_METHOD: (u8, u8) = (3, 3);

pub const ARRAYTYPE_NEW_INSTANCE: (u8, u8) = (4, 1);

pub const METHOD_LINE_TABLE: (u8, u8) = (6, 1);
pub const METHOD_VARIABLE_TABLE: (u8, u8) = (6, 2);

pub const OBJECT_REFERENCE_TYPE: (u8, u8) = (9, 1);
pub const OBJECT_GET_VALUES: (u8, u8) = (9, 2);
pub const OBJECT_INVOKE_METHOD: (u8, u8) = (9, 6);

pub const STRING_VALUE: (u8, u8) = (10, 1);

pub const THREAD_NAME: (u8, u8) = (11, 1);
pub const THREAD_RESUME: (u8, u8) = (11, 3);
pub const THREAD_FRAMES: (u8, u8) = (11, 6);

pub const ARRAY_LENGTH: (u8, u8) = (13, 1);
pub const ARRAY_GET_VALUES: (u8, u8) = (13, 2);
pub const ARRAY_SET_VALUES: (u8, u8) = (13, 3);

pub const EVENT_REQUEST_SET: (u8, u8) = (15, 1);
pub const EVENT_REQUEST_CLEAR: (u8, u8) = (15, 2);

pub const STACKFRAME_GET_VALUES: (u8, u8) = (16, 1);
pub const STACKFRAME_SET_VALUES: (u8, u8) = (16, 2);

pub const EVENT_COMPOSITE: (u8, u8) = (64, 100);

// Event kinds.

pub const EVENT_SINGLE_STEP: u8 = 1;
pub const EVENT_BREAKPOINT: u8 = 2;
pub const EVENT_EXCEPTION: u8 = 4;
pub const EVENT_CLASS_PREPARE: u8 = 8;
pub const EVENT_METHOD_ENTRY: u8 = 40;
pub const EVENT_METHOD_EXIT: u8 = 41;
pub const EVENT_VM_START: u8 = 90;
pub const EVENT_VM_DEATH: u8 = 99;

// Suspend policies.

pub const SUSPEND_NONE: u8 = 0;
pub const SUSPEND_EVENT_THREAD: u8 = 1;
pub const SUSPEND_ALL: u8 = 2;

// Event request modifier kinds.

pub const MOD_CLASS_MATCH: u8 = 5;
pub const MOD_LOCATION_ONLY: u8 = 7;
pub const MOD_EXCEPTION_ONLY: u8 = 8;

// Value tags.

pub const TAG_ARRAY: u8 = b'[';
pub const TAG_BYTE: u8 = b'B';
pub const TAG_CHAR: u8 = b'C';
pub const TAG_OBJECT: u8 = b'L';
pub const TAG_FLOAT: u8 = b'F';
pub const TAG_DOUBLE: u8 = b'D';
pub const TAG_INT: u8 = b'I';
pub const TAG_LONG: u8 = b'J';
pub const TAG_SHORT: u8 = b'S';
pub const TAG_VOID: u8 = b'V';
pub const TAG_BOOLEAN: u8 = b'Z';
pub const TAG_STRING: u8 = b's';
pub const TAG_THREAD: u8 = b't';
pub const TAG_THREAD_GROUP: u8 = b'g';
pub const TAG_CLASS_LOADER: u8 = b'l';
pub const TAG_CLASS_OBJECT: u8 = b'c';

// Field/method access modifiers (subset).

pub const ACC_STATIC: u32 = 0x0008;

// Error codes inspected by name; see `res` for the host-level names.

pub const ERR_NONE: u16 = 0;
pub const ERR_ABSENT_INFORMATION: u16 = 101;
pub const ERR_NATIVE_METHOD: u16 = 511;
