//! Packet framing and typed payload encoding.

use crate::jdwp::consts::*;
use crate::res::VmErr;
use crate::res::VmResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Id widths negotiated with the target via `VirtualMachine.IDSizes`.
pub struct IdSizes {
  pub field: u8,
  pub method: u8,
  pub object: u8,
  pub reference: u8,
  pub frame: u8,
}

impl Default for IdSizes {
  fn default() -> Self {
    // Hotspot answers 8 for everything; used until the real reply lands.
    Self {
      field: 8,
      method: 8,
      object: 8,
      reference: 8,
      frame: 8,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Decoded 11-byte packet header.
pub struct PacketHeader {
  pub length: u32,
  pub id: u32,
  pub flags: u8,
  /// Command-set/command for command packets, error code for replies.
  pub code: u16,
}

impl PacketHeader {
  pub fn is_reply(&self) -> bool {
    self.flags & FLAG_REPLY != 0
  }

  pub fn error_code(&self) -> u16 {
    self.code
  }

  pub fn command(&self) -> (u8, u8) {
    ((self.code >> 8) as u8, (self.code & 0xff) as u8)
  }

  pub fn decode(bytes: &[u8; HEADER_LEN]) -> Self {
    Self {
      length: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
      id: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
      flags: bytes[8],
      code: u16::from_be_bytes([bytes[9], bytes[10]]),
    }
  }
}

/// Frames a command packet: header plus payload.
pub fn encode_command(
  id: u32,
  command: (u8, u8),
  payload: &[u8],
) -> Vec<u8> {
  let length = (HEADER_LEN + payload.len()) as u32;
  let mut buf = Vec::with_capacity(length as usize);
  buf.extend_from_slice(&length.to_be_bytes());
  buf.extend_from_slice(&id.to_be_bytes());
  buf.push(0);
  buf.push(command.0);
  buf.push(command.1);
  buf.extend_from_slice(payload);
  buf
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A raw wire location: type tag, class id, method id, code index.
pub struct JdwpLocation {
  pub type_tag: u8,
  pub class: u64,
  pub method: u64,
  pub index: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// A tagged wire value. Object-kind tags all collapse to `Object`; a zero
/// object id is the null reference.
pub enum JdwpValue {
  Void,
  Boolean(bool),
  Byte(i8),
  Short(i16),
  Char(u16),
  Int(i32),
  Long(i64),
  Float(f32),
  Double(f64),
  Object { tag: u8, id: u64 },
}

impl JdwpValue {
  pub fn tag(&self) -> u8 {
    match self {
      JdwpValue::Void => TAG_VOID,
      JdwpValue::Boolean(_) => TAG_BOOLEAN,
      JdwpValue::Byte(_) => TAG_BYTE,
      JdwpValue::Short(_) => TAG_SHORT,
      JdwpValue::Char(_) => TAG_CHAR,
      JdwpValue::Int(_) => TAG_INT,
      JdwpValue::Long(_) => TAG_LONG,
      JdwpValue::Float(_) => TAG_FLOAT,
      JdwpValue::Double(_) => TAG_DOUBLE,
      JdwpValue::Object { tag, .. } => *tag,
    }
  }
}

#[derive(Debug)]
/// Big-endian payload writer honoring the negotiated id widths.
pub struct PacketWriter {
  buf: Vec<u8>,
  sizes: IdSizes,
}

impl PacketWriter {
  pub fn new(sizes: IdSizes) -> Self {
    Self {
      buf: Vec::new(),
      sizes,
    }
  }

  pub fn into_bytes(self) -> Vec<u8> {
    self.buf
  }

  pub fn byte(&mut self, v: u8) -> &mut Self {
    self.buf.push(v);
    self
  }

  pub fn boolean(&mut self, v: bool) -> &mut Self {
    self.buf.push(v as u8);
    self
  }

  pub fn int(&mut self, v: i32) -> &mut Self {
    self.buf.extend_from_slice(&v.to_be_bytes());
    self
  }

  pub fn long(&mut self, v: i64) -> &mut Self {
    self.buf.extend_from_slice(&v.to_be_bytes());
    self
  }

  pub fn string(&mut self, v: &str) -> &mut Self {
    self.int(v.len() as i32);
    self.buf.extend_from_slice(v.as_bytes());
    self
  }

  fn id(&mut self, v: u64, width: u8) -> &mut Self {
    let bytes = v.to_be_bytes();
    self.buf.extend_from_slice(&bytes[8 - width as usize..]);
    self
  }

  pub fn object_id(&mut self, v: u64) -> &mut Self {
    self.id(v, self.sizes.object)
  }

  pub fn reference_id(&mut self, v: u64) -> &mut Self {
    self.id(v, self.sizes.reference)
  }

  pub fn method_id(&mut self, v: u64) -> &mut Self {
    self.id(v, self.sizes.method)
  }

  pub fn field_id(&mut self, v: u64) -> &mut Self {
    self.id(v, self.sizes.field)
  }

  pub fn frame_id(&mut self, v: u64) -> &mut Self {
    self.id(v, self.sizes.frame)
  }

  pub fn location(&mut self, loc: &JdwpLocation) -> &mut Self {
    self.byte(loc.type_tag);
    self.reference_id(loc.class);
    self.method_id(loc.method);
    self.buf.extend_from_slice(&loc.index.to_be_bytes());
    self
  }

  pub fn tagged_value(&mut self, v: &JdwpValue) -> &mut Self {
    self.byte(v.tag());
    self.untagged_value(v)
  }

  /// Writes the value body without its tag; the receiver infers the width
  /// from context (slot signature, array component type).
  pub fn untagged_value(&mut self, v: &JdwpValue) -> &mut Self {
    match v {
      JdwpValue::Void => self,
      JdwpValue::Boolean(b) => self.boolean(*b),
      JdwpValue::Byte(b) => self.byte(*b as u8),
      JdwpValue::Short(s) => {
        self.buf.extend_from_slice(&s.to_be_bytes());
        self
      }
      JdwpValue::Char(c) => {
        self.buf.extend_from_slice(&c.to_be_bytes());
        self
      }
      JdwpValue::Int(i) => self.int(*i),
      JdwpValue::Long(l) => self.long(*l),
      JdwpValue::Float(f) => {
        self.buf.extend_from_slice(&f.to_be_bytes());
        self
      }
      JdwpValue::Double(d) => {
        self.buf.extend_from_slice(&d.to_be_bytes());
        self
      }
      JdwpValue::Object { id, .. } => self.object_id(*id),
    }
  }
}

#[derive(Debug)]
/// Big-endian payload reader honoring the negotiated id widths.
pub struct PacketReader {
  data: Vec<u8>,
  pos: usize,
  sizes: IdSizes,
}

impl PacketReader {
  pub fn new(data: Vec<u8>, sizes: IdSizes) -> Self {
    Self {
      data,
      pos: 0,
      sizes,
    }
  }

  pub fn remaining(&self) -> usize {
    self.data.len() - self.pos
  }

  fn take(&mut self, n: usize) -> VmResult<&[u8]> {
    if self.remaining() < n {
      return Err(VmErr::Protocol("truncated packet"));
    }
    let slice = &self.data[self.pos..self.pos + n];
    self.pos += n;
    Ok(slice)
  }

  pub fn byte(&mut self) -> VmResult<u8> {
    Ok(self.take(1)?[0])
  }

  pub fn boolean(&mut self) -> VmResult<bool> {
    Ok(self.byte()? != 0)
  }

  pub fn int(&mut self) -> VmResult<i32> {
    let b = self.take(4)?;
    Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
  }

  pub fn long(&mut self) -> VmResult<i64> {
    let b = self.take(8)?;
    Ok(i64::from_be_bytes([
      b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
    ]))
  }

  pub fn string(&mut self) -> VmResult<String> {
    let len = self.int()? as usize;
    let bytes = self.take(len)?;
    String::from_utf8(bytes.to_vec())
      .map_err(|_| VmErr::Protocol("invalid utf-8 string"))
  }

  fn id(&mut self, width: u8) -> VmResult<u64> {
    let bytes = self.take(width as usize)?;
    let mut v: u64 = 0;
    for b in bytes {
      v = (v << 8) | *b as u64;
    }
    Ok(v)
  }

  pub fn object_id(&mut self) -> VmResult<u64> {
    self.id(self.sizes.object)
  }

  pub fn reference_id(&mut self) -> VmResult<u64> {
    self.id(self.sizes.reference)
  }

  pub fn method_id(&mut self) -> VmResult<u64> {
    self.id(self.sizes.method)
  }

  pub fn field_id(&mut self) -> VmResult<u64> {
    self.id(self.sizes.field)
  }

  pub fn frame_id(&mut self) -> VmResult<u64> {
    self.id(self.sizes.frame)
  }

  pub fn location(&mut self) -> VmResult<JdwpLocation> {
    let type_tag = self.byte()?;
    let class = self.reference_id()?;
    let method = self.method_id()?;
    let b = self.take(8)?;
    let index = u64::from_be_bytes([
      b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
    ]);
    Ok(JdwpLocation {
      type_tag,
      class,
      method,
      index,
    })
  }

  pub fn tagged_value(&mut self) -> VmResult<JdwpValue> {
    let tag = self.byte()?;
    self.value_of_tag(tag)
  }

  /// Reads a value body whose tag is known from context.
  pub fn value_of_tag(&mut self, tag: u8) -> VmResult<JdwpValue> {
    Ok(match tag {
      TAG_VOID => JdwpValue::Void,
      TAG_BOOLEAN => JdwpValue::Boolean(self.boolean()?),
      TAG_BYTE => JdwpValue::Byte(self.byte()? as i8),
      TAG_SHORT => {
        let b = self.take(2)?;
        JdwpValue::Short(i16::from_be_bytes([b[0], b[1]]))
      }
      TAG_CHAR => {
        let b = self.take(2)?;
        JdwpValue::Char(u16::from_be_bytes([b[0], b[1]]))
      }
      TAG_INT => JdwpValue::Int(self.int()?),
      TAG_LONG => JdwpValue::Long(self.long()?),
      TAG_FLOAT => {
        let b = self.take(4)?;
        JdwpValue::Float(f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
      }
      TAG_DOUBLE => {
        let b = self.take(8)?;
        JdwpValue::Double(f64::from_be_bytes([
          b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
      }
      TAG_OBJECT | TAG_ARRAY | TAG_STRING | TAG_THREAD
      | TAG_THREAD_GROUP | TAG_CLASS_LOADER | TAG_CLASS_OBJECT => {
        JdwpValue::Object {
          tag,
          id: self.object_id()?,
        }
      }
      _ => return Err(VmErr::Protocol("unknown value tag")),
    })
  }
}

/// Converts a JNI type signature to a dotted class name
/// (`Ljava/lang/String;` becomes `java.lang.String`, arrays get `[]`).
pub fn signature_to_name(signature: &str) -> String {
  let mut dims = 0;
  let mut rest = signature;
  while let Some(stripped) = rest.strip_prefix('[') {
    dims += 1;
    rest = stripped;
  }
  let base = match rest.as_bytes().first().copied() {
    Some(b'L') => rest[1..].trim_end_matches(';').replace('/', "."),
    Some(b'B') => "byte".to_string(),
    Some(b'C') => "char".to_string(),
    Some(b'D') => "double".to_string(),
    Some(b'F') => "float".to_string(),
    Some(b'I') => "int".to_string(),
    Some(b'J') => "long".to_string(),
    Some(b'S') => "short".to_string(),
    Some(b'Z') => "boolean".to_string(),
    Some(b'V') => "void".to_string(),
    _ => rest.to_string(),
  };
  format!("{}{}", base, "[]".repeat(dims))
}
