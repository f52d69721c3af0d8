//! Script identity and source text.

pub mod registry;
pub mod url;


use crate::node::ScriptId;
use crate::script::url::ScriptUrl;
use md5::Digest;
use md5::Md5;
use once_cell::sync::Lazy;
use once_cell::sync::OnceCell;
use regex::Regex;
use std::sync::Arc;

/// Matches `//# sourceURL=...` and `//@ sourceURL=...` annotation lines.
static SOURCE_URL_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?m)^//[#@]\s*sourceURL=\s*(\S+)").unwrap());

/// Matches `//# sourceMappingURL=...` annotation lines.
static SOURCE_MAPPING_URL_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?m)^//[#@]\s*sourceMappingURL=\s*(\S+)").unwrap());

#[derive(Debug)]
/// An immutable registered script. Two VM classes whose recovered sources
/// hash identically share one `Script`; only the paths alias.
pub struct Script {
  id: ScriptId,
  url: ScriptUrl,
  source: String,
  contents_hash: OnceCell<String>,
  line_offsets: Vec<usize>,
  source_map_url: Option<String>,
  source_url: Option<String>,
}

/// Shared pointer to a registered script.
pub type ScriptArc = Arc<Script>;

impl Script {
  pub fn new(id: ScriptId, url: ScriptUrl, source: String) -> Self {
    let line_offsets = line_offsets(&source);
    let source_url = SOURCE_URL_RE
      .captures_iter(&source)
      .last()
      .map(|c| c[1].to_string());
    let source_map_url = SOURCE_MAPPING_URL_RE
      .captures_iter(&source)
      .last()
      .map(|c| c[1].to_string());
    Self {
      id,
      url,
      source,
      contents_hash: OnceCell::new(),
      line_offsets,
      source_map_url,
      source_url,
    }
  }

  pub fn id(&self) -> &ScriptId {
    &self.id
  }

  pub fn url(&self) -> &ScriptUrl {
    &self.url
  }

  pub fn source(&self) -> &str {
    &self.source
  }

  /// MD5 of the source text, hex encoded, computed on first use.
  pub fn contents_hash(&self) -> &str {
    self
      .contents_hash
      .get_or_init(|| hash_source(&self.source))
  }

  pub fn line_count(&self) -> usize {
    self.line_offsets.len()
  }

  /// 1-based line lookup.
  pub fn line(&self, line: u32) -> Option<&str> {
    let idx = (line as usize).checked_sub(1)?;
    let start = *self.line_offsets.get(idx)?;
    let end = self
      .line_offsets
      .get(idx + 1)
      .map(|offset| offset - 1)
      .unwrap_or(self.source.len());
    Some(self.source[start..end].trim_end_matches('\r'))
  }

  pub fn source_map_url(&self) -> Option<&str> {
    self.source_map_url.as_deref()
  }

  pub fn source_url(&self) -> Option<&str> {
    self.source_url.as_deref()
  }
}

/// MD5 of a source text, hex encoded.
pub fn hash_source(source: &str) -> String {
  let mut hasher = Md5::new();
  hasher.update(source.as_bytes());
  hex::encode(hasher.finalize())
}

fn line_offsets(source: &str) -> Vec<usize> {
  let mut offsets = vec![0];
  for (i, b) in source.bytes().enumerate() {
    if b == b'\n' {
      offsets.push(i + 1);
    }
  }
  offsets
}
