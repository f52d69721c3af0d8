//! Script URL normalization.
//!
//! Every script path surfaced to the outside is coerced into one of
//! `file:///<abs>`, `eval:///<synthetic>`, or a passthrough `data:` /
//! `http(s)://` form. Normalization is idempotent: feeding the string form
//! back through [`ScriptUrl::create`] yields the same string.

use crate::res::HostErr;
use crate::res::HostResult;
use compact_str::CompactString;
use compact_str::ToCompactString;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// A normalized script URL.
pub struct ScriptUrl(CompactString);

impl ScriptUrl {
  /// Normalizes `input`. Relative paths are rejected.
  pub fn create(input: &str) -> HostResult<Self> {
    let input = input.trim();
    if input.is_empty() {
      return Err(HostErr::InvalidScriptUrl(input.to_string()));
    }

    if input.starts_with("data:")
      || input.starts_with("http://")
      || input.starts_with("https://")
    {
      return Ok(Self(input.to_compact_string()));
    }

    if let Some(rest) = input.strip_prefix("eval:") {
      let rest = rest.trim_start_matches('/');
      return Ok(Self(format!("eval:///{rest}").to_compact_string()));
    }

    if let Some(rest) = input.strip_prefix("file:") {
      let rest = rest.trim_start_matches('/');
      return Self::from_path(rest, input);
    }

    // Bare absolute paths, Windows (`c:\x`) or Unix (`/x`).
    if input.starts_with('/') {
      return Self::from_path(input.trim_start_matches('/'), input);
    }
    if has_drive_prefix(input) {
      return Self::from_path(input, input);
    }

    Err(HostErr::InvalidScriptUrl(input.to_string()))
  }

  /// Builds a `file:///` URL from a path with any leading slashes already
  /// stripped; `original` only feeds the error message.
  fn from_path(stripped: &str, original: &str) -> HostResult<Self> {
    let forward = stripped.replace('\\', "/");
    let path = if has_drive_prefix(&forward) {
      resolve_dot_segments(&forward)
    } else if original.starts_with('/') || original.starts_with("file:") {
      resolve_dot_segments(&format!("/{forward}"))
    } else {
      return Err(HostErr::InvalidScriptUrl(original.to_string()));
    };
    let path = path.trim_start_matches('/');
    Ok(Self(format!("file:///{path}").to_compact_string()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn is_eval(&self) -> bool {
    self.0.starts_with("eval:")
  }

  pub fn is_file(&self) -> bool {
    self.0.starts_with("file:")
  }
}

impl std::fmt::Display for ScriptUrl {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

fn has_drive_prefix(path: &str) -> bool {
  let bytes = path.as_bytes();
  bytes.len() >= 2
    && bytes[0].is_ascii_alphabetic()
    && bytes[1] == b':'
    && (bytes.len() == 2 || bytes[2] == b'/' || bytes[2] == b'\\')
}

/// Resolves `.` and `..` segments without touching the filesystem; this is
/// URL-path arithmetic, not process-relative path lookup.
fn resolve_dot_segments(path: &str) -> String {
  let absolute = path.starts_with('/');
  let mut segments: Vec<&str> = Vec::new();
  for segment in path.split('/') {
    match segment {
      "" | "." => {}
      ".." => {
        segments.pop();
      }
      other => segments.push(other),
    }
  }
  let joined = segments.join("/");
  if absolute {
    format!("/{joined}")
  } else {
    joined
  }
}
