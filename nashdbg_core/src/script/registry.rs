//! Script registry: stable ids, content-hash deduplication, path aliases.

use crate::node::ScriptId;
use crate::prelude::*;
use crate::script::Script;
use crate::script::ScriptArc;
use crate::script::hash_source;
use crate::script::url::ScriptUrl;
use crate::vm::nashorn;
use compact_str::CompactString;
use compact_str::ToCompactString;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
/// Outcome of a registration attempt.
pub enum Registered {
  /// A script with a previously unseen URL; `ScriptAdded` should fire.
  New(ScriptArc),
  /// The URL is new but the content hash matched an existing script; the
  /// path now aliases it (engine recompilation).
  Aliased(ScriptArc),
  /// URL and content already known.
  Known(ScriptArc),
}

impl Registered {
  pub fn script(&self) -> &ScriptArc {
    match self {
      Registered::New(s) | Registered::Aliased(s) | Registered::Known(s) => s,
    }
  }
}

#[derive(Debug, Default)]
/// All scripts recovered from the target, owned by the event pump.
pub struct ScriptRegistry {
  by_id: HashMap<ScriptId, ScriptArc>,
  id_by_hash: HashMap<String, ScriptId>,
  id_by_url: HashMap<CompactString, ScriptId>,
  next_seq: u64,
}

impl ScriptRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers recovered source under `url`. Content-hash deduplication
  /// aliases recompiled classes to the script they were first seen as.
  pub fn register(&mut self, url: ScriptUrl, source: String) -> Registered {
    let hash = hash_source(&source);

    if let Some(id) = self.id_by_url.get(url.as_str()) {
      let existing = self.by_id[id].clone();
      if existing.contents_hash() == hash {
        return Registered::Known(existing);
      }
      // Same path, new content: the path moves to a fresh script.
      debug!(url = %url, "script path re-registered with new content");
    }

    if let Some(id) = self.id_by_hash.get(&hash) {
      let existing = self.by_id[id].clone();
      let url_known = self.id_by_url.contains_key(url.as_str());
      self.id_by_url.insert(url.as_str().to_compact_string(), id.clone());
      return if url_known {
        Registered::Known(existing)
      } else {
        Registered::Aliased(existing)
      };
    }

    self.next_seq += 1;
    let id: ScriptId = self.next_seq.to_compact_string();
    let script = Arc::new(Script::new(id.clone(), url.clone(), source));
    // Force the hash cell so dedup lookups stay cheap.
    debug_assert_eq!(script.contents_hash(), hash);
    self.by_id.insert(id.clone(), script.clone());
    self.id_by_hash.insert(hash, id.clone());
    self
      .id_by_url
      .insert(url.as_str().to_compact_string(), id);
    Registered::New(script)
  }

  /// Every distinct registered script.
  pub fn scripts(&self) -> Vec<ScriptArc> {
    let mut all: Vec<ScriptArc> = self.by_id.values().cloned().collect();
    all.sort_by(|a, b| a.id().cmp(b.id()));
    all
  }

  pub fn script_by_id(&self, id: &str) -> Option<ScriptArc> {
    self.by_id.get(id).cloned()
  }

  pub fn script_by_url(&self, url: &str) -> Option<ScriptArc> {
    let id = self.id_by_url.get(url)?;
    self.by_id.get(id).cloned()
  }
}

/// Synthesizes the `eval:///` URL for a dynamically evaluated script
/// class: engine package stripped, `$` `^` `_` removed, dots become
/// slashes, a trailing `/eval` segment dropped.
pub fn eval_url_for_class(class_name: &str) -> ScriptUrl {
  let stripped = class_name
    .strip_prefix(nashorn::SCRIPT_PACKAGE_PREFIX)
    .unwrap_or(class_name);
  let cleaned: String = stripped
    .chars()
    .filter(|c| !matches!(c, '$' | '^' | '_'))
    .map(|c| if c == '.' { '/' } else { c })
    .collect();
  let cleaned = cleaned.strip_suffix("/eval").unwrap_or(&cleaned);
  ScriptUrl::create(&format!("eval:/{cleaned}"))
    .expect("synthesized eval urls always normalize")
}
