use crate::brk::BreakableLocations;
use crate::node::ScriptLocation;
use crate::vm::ClassId;
use crate::vm::EventRequestKind;
use crate::vm::MethodId;
use crate::vm::RequestHandle;
use crate::vm::VmLocation;
use compact_str::ToCompactString;

fn vm_loc(line: u32) -> VmLocation {
  VmLocation {
    class: ClassId(1),
    method: MethodId(1),
    code_index: line as u64 * 10,
    line,
  }
}

fn table_with_lines(lines: &[u32]) -> BreakableLocations {
  let mut table = BreakableLocations::new();
  for &line in lines {
    table.add(
      "1".to_compact_string(),
      "file:///srv/app.js".to_compact_string(),
      vm_loc(line),
      ScriptLocation::new(line, Some(1)),
    );
  }
  table
}

fn request(id: i32) -> RequestHandle {
  RequestHandle {
    kind: EventRequestKind::Breakpoint,
    id,
  }
}

#[test]
fn range_end_line_inclusive_end_column_exclusive() {
  let mut table = BreakableLocations::new();
  for (line, col) in [(1, 1), (2, 1), (2, 5), (3, 1), (4, 1)] {
    table.add(
      "1".to_compact_string(),
      "file:///srv/app.js".to_compact_string(),
      VmLocation {
        class: ClassId(1),
        method: MethodId(1),
        code_index: (line * 100 + col) as u64,
        line,
      },
      ScriptLocation::new(line, Some(col)),
    );
  }

  // End line 2 with column 5: (2,1) is in, (2,5) is out.
  let got = table.in_range(
    "1",
    ScriptLocation::new(1, None),
    Some(ScriptLocation::new(2, Some(5))),
  );
  assert_eq!(
    got,
    vec![ScriptLocation::new(1, Some(1)), ScriptLocation::new(2, Some(1))]
  );

  // No end column keeps the whole end line.
  let got = table.in_range(
    "1",
    ScriptLocation::new(2, None),
    Some(ScriptLocation::new(3, None)),
  );
  assert_eq!(
    got,
    vec![
      ScriptLocation::new(2, Some(1)),
      ScriptLocation::new(2, Some(5)),
      ScriptLocation::new(3, Some(1)),
    ]
  );

  // No end at all runs to the end of the script.
  let got = table.in_range("1", ScriptLocation::new(3, None), None);
  assert_eq!(
    got,
    vec![ScriptLocation::new(3, Some(1)), ScriptLocation::new(4, Some(1))]
  );
}

#[test]
fn exact_match_and_column_default() {
  let table = table_with_lines(&[10, 11]);
  assert!(
    table
      .find_exact("file:///srv/app.js", ScriptLocation::new(10, Some(1)))
      .is_some()
  );
  assert!(
    table
      .find_exact("file:///srv/app.js", ScriptLocation::new(10, None))
      .is_some()
  );
  assert!(
    table
      .find_exact("file:///srv/app.js", ScriptLocation::new(10, Some(2)))
      .is_none()
  );
  assert!(
    table
      .find_exact("file:///other.js", ScriptLocation::new(10, Some(1)))
      .is_none()
  );
}

#[test]
fn enable_then_disable_restores_breakpoint_count() {
  let mut table = table_with_lines(&[10, 11]);
  assert_eq!(table.enabled_breakpoints(), 0);

  let idx = table
    .find_exact("file:///srv/app.js", ScriptLocation::new(10, Some(1)))
    .unwrap();
  table.mark_enabled(idx, request(7), "bp-1".to_compact_string());
  assert_eq!(table.enabled_breakpoints(), 1);
  assert_eq!(
    table.get(idx).breakpoint_id().map(|id| id.as_str()),
    Some("bp-1")
  );

  let found = table.find_by_breakpoint("bp-1").unwrap();
  let cleared = table.mark_disabled(found).unwrap();
  assert_eq!(cleared.id, 7);
  assert_eq!(table.enabled_breakpoints(), 0);
  assert!(table.find_by_breakpoint("bp-1").is_none());
}

#[test]
fn one_shots_are_tracked_separately() {
  let mut table = table_with_lines(&[10, 11, 12]);
  let below = table.below_in_method(ClassId(1), MethodId(1), 10);
  assert_eq!(below.len(), 2);
  for (n, idx) in below.iter().enumerate() {
    table.mark_enabled_once(*idx, request(n as i32 + 100));
  }
  assert_eq!(table.one_shots().len(), 2);
  assert_eq!(table.enabled_breakpoints(), 0);
  for idx in table.one_shots() {
    table.mark_disabled(idx);
  }
  assert!(table.one_shots().is_empty());
}
