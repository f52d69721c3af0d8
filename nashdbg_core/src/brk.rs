//! Breakable locations and breakpoints.
//!
//! Every executable script line gets one [`BreakableLocation`] at
//! registration time. Locations are created with the script and destroyed
//! only with it; enabling/disabling only flips state and records the VM
//! request handle managed by the host.

use crate::node::BreakpointId;
use crate::node::ScriptId;
use crate::node::ScriptLocation;
use crate::prelude::*;
use crate::vm::ClassId;
use crate::vm::MethodId;
use crate::vm::RequestHandle;
use crate::vm::VmLocation;
use compact_str::CompactString;

#[derive(Debug, Clone, PartialEq, Eq)]
/// External view of an enabled breakpoint.
pub struct Breakpoint {
  pub id: BreakpointId,
  pub script_id: ScriptId,
  pub location: ScriptLocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BlState {
  Disabled,
  /// Enabled through `set_breakpoint`, keyed by a user-visible id.
  Enabled {
    request: RequestHandle,
    breakpoint_id: BreakpointId,
  },
  /// Enabled for one hit by the stepping machinery.
  EnabledOnce {
    request: RequestHandle,
  },
}

#[derive(Debug)]
/// One breakable script position bound to a VM-level location.
pub struct BreakableLocation {
  pub script_id: ScriptId,
  pub url: CompactString,
  pub vm_location: VmLocation,
  pub location: ScriptLocation,
  state: BlState,
}

impl BreakableLocation {
  pub fn is_enabled(&self) -> bool {
    !matches!(self.state, BlState::Disabled)
  }

  pub fn is_enabled_once(&self) -> bool {
    matches!(self.state, BlState::EnabledOnce { .. })
  }

  pub fn breakpoint_id(&self) -> Option<&BreakpointId> {
    match &self.state {
      BlState::Enabled { breakpoint_id, .. } => Some(breakpoint_id),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Stable handle into the table.
pub struct BlIdx(usize);

#[derive(Debug, Default)]
/// All breakable locations, owned by the event pump.
pub struct BreakableLocations {
  locations: Vec<BreakableLocation>,
  by_url: HashMap<CompactString, Vec<BlIdx>>,
  by_script: HashMap<ScriptId, Vec<BlIdx>>,
  by_breakpoint: HashMap<BreakpointId, BlIdx>,
  by_vm_line: HashMap<(ClassId, MethodId, u32), BlIdx>,
}

impl BreakableLocations {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add(
    &mut self,
    script_id: ScriptId,
    url: CompactString,
    vm_location: VmLocation,
    location: ScriptLocation,
  ) -> BlIdx {
    let idx = BlIdx(self.locations.len());
    self
      .by_url
      .entry(url.clone())
      .or_default()
      .push(idx);
    self
      .by_script
      .entry(script_id.clone())
      .or_default()
      .push(idx);
    self.by_vm_line.insert(
      (vm_location.class, vm_location.method, vm_location.line),
      idx,
    );
    self.locations.push(BreakableLocation {
      script_id,
      url,
      vm_location,
      location,
      state: BlState::Disabled,
    });
    idx
  }

  pub fn get(&self, idx: BlIdx) -> &BreakableLocation {
    &self.locations[idx.0]
  }

  pub fn indices(&self) -> impl Iterator<Item = BlIdx> + '_ {
    (0..self.locations.len()).map(BlIdx)
  }

  /// Exact `(line, column)` match under the given URL; a missing column
  /// matches the first location on the line.
  pub fn find_exact(
    &self,
    url: &str,
    location: ScriptLocation,
  ) -> Option<BlIdx> {
    let indices = self.by_url.get(url)?;
    indices.iter().copied().find(|idx| {
      let bl = &self.locations[idx.0];
      bl.location.line == location.line
        && (location.column.is_none()
          || bl.location.column == location.column)
    })
  }

  /// The location the VM-level position maps to, matched by line.
  pub fn find_by_vm_line(
    &self,
    class: ClassId,
    method: MethodId,
    line: u32,
  ) -> Option<BlIdx> {
    self.by_vm_line.get(&(class, method, line)).copied()
  }

  pub fn find_by_breakpoint(&self, id: &str) -> Option<BlIdx> {
    self.by_breakpoint.get(id).copied()
  }

  /// Every location of the script inside `[from, to)`. The end line is
  /// inclusive while columns on the end line are exclusive; an absent end
  /// means the rest of the script, and an absent end column keeps the
  /// whole end line.
  pub fn in_range(
    &self,
    script_id: &str,
    from: ScriptLocation,
    to: Option<ScriptLocation>,
  ) -> Vec<ScriptLocation> {
    let Some(indices) = self.by_script.get(script_id) else {
      return vec![];
    };
    let from_col = from.column.unwrap_or(0);
    let mut result: Vec<ScriptLocation> = indices
      .iter()
      .map(|idx| self.locations[idx.0].location)
      .filter(|loc| {
        let col = loc.column.unwrap_or(0);
        let after_from = loc.line > from.line
          || (loc.line == from.line && col >= from_col);
        let before_to = match to {
          None => true,
          Some(to) => match to.column {
            None => loc.line <= to.line,
            Some(to_col) => {
              loc.line < to.line || (loc.line == to.line && col < to_col)
            }
          },
        };
        after_from && before_to
      })
      .collect();
    result.sort();
    result.dedup();
    result
  }

  /// Candidates for a step-over/step-out seed: locations in the given
  /// method strictly below `line`.
  pub fn below_in_method(
    &self,
    class: ClassId,
    method: MethodId,
    line: u32,
  ) -> Vec<BlIdx> {
    self
      .indices()
      .filter(|idx| {
        let bl = &self.locations[idx.0];
        bl.vm_location.class == class
          && bl.vm_location.method == method
          && bl.vm_location.line > line
      })
      .collect()
  }

  /// Every location of the given method.
  pub fn in_method(&self, class: ClassId, method: MethodId) -> Vec<BlIdx> {
    self
      .indices()
      .filter(|idx| {
        let bl = &self.locations[idx.0];
        bl.vm_location.class == class && bl.vm_location.method == method
      })
      .collect()
  }

  pub fn mark_enabled(
    &mut self,
    idx: BlIdx,
    request: RequestHandle,
    breakpoint_id: BreakpointId,
  ) {
    self.by_breakpoint.insert(breakpoint_id.clone(), idx);
    self.locations[idx.0].state = BlState::Enabled {
      request,
      breakpoint_id,
    };
  }

  pub fn mark_enabled_once(&mut self, idx: BlIdx, request: RequestHandle) {
    self.locations[idx.0].state = BlState::EnabledOnce { request };
  }

  /// Disables the location, returning the VM request to clear.
  pub fn mark_disabled(&mut self, idx: BlIdx) -> Option<RequestHandle> {
    let state =
      std::mem::replace(&mut self.locations[idx.0].state, BlState::Disabled);
    match state {
      BlState::Disabled => None,
      BlState::Enabled {
        request,
        breakpoint_id,
      } => {
        self.by_breakpoint.remove(&breakpoint_id);
        Some(request)
      }
      BlState::EnabledOnce { request } => Some(request),
    }
  }

  /// Locations currently armed for a single hit.
  pub fn one_shots(&self) -> Vec<BlIdx> {
    self
      .indices()
      .filter(|idx| self.locations[idx.0].is_enabled_once())
      .collect()
  }

  /// Number of user-enabled breakpoints.
  pub fn enabled_breakpoints(&self) -> usize {
    self.by_breakpoint.len()
  }

  /// Ids of all user-enabled breakpoints.
  pub fn breakpoint_ids(&self) -> Vec<BreakpointId> {
    self.by_breakpoint.keys().cloned().collect()
  }
}
