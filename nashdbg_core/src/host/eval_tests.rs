use crate::consts::TOP_FRAME_ID;
use crate::host::pump_tests::boot_paused;
use crate::node::ObjectId;
use crate::node::SimpleValue;
use crate::node::ValueNode;
use crate::prelude::*;
use crate::res::JDWP_INVALID_SLOT;
use crate::test::log::init as test_log_init;
use crate::test::vm::CannedEval;
use crate::test::vm::FakeLocal;
use crate::test::vm::FakeVm;
use crate::test::vm::MAIN_THREAD;
use crate::vm::VmValue;

#[tokio::test(start_paused = true)]
async fn mutated_local_is_written_back_to_the_slot() {
  test_log_init();
  let fv = FakeVm::new();
  let locals = vec![FakeLocal::new("x", "I", 0, VmValue::Int(1))];
  let (handle, _events, _frames) = boot_paused(&fv, 10, locals).await;

  fv.add_canned_eval(
    "x = x + 41",
    CannedEval::MutateLocal {
      name: "x".to_string(),
      value: 42,
    },
  );
  let result = handle
    .evaluate_on_stack_frame(TOP_FRAME_ID, "x = x + 41", HashMap::new())
    .await
    .unwrap();
  assert!(!result.thrown);
  assert_eq!(
    result.node,
    ValueNode::Simple(SimpleValue::Number(42.0))
  );

  // The JDI slot holds the value written through the accessor's setter.
  assert!(matches!(
    fv.local_value_of(MAIN_THREAD, 1, "x"),
    Some(VmValue::Int(42))
  ));
}

#[tokio::test(start_paused = true)]
async fn statement_result_equal_to_the_marker_is_suppressed() {
  test_log_init();
  let fv = FakeVm::new();
  let locals = vec![FakeLocal::new("x", "I", 0, VmValue::Int(1))];
  let (handle, _events, _frames) = boot_paused(&fv, 10, locals).await;

  fv.add_canned_eval("var y = 7", CannedEval::ReturnMarker);
  let result = handle
    .evaluate_on_stack_frame(TOP_FRAME_ID, "var y = 7", HashMap::new())
    .await
    .unwrap();
  assert!(!result.thrown);
  assert_eq!(result.node, ValueNode::Simple(SimpleValue::Undefined));
}

#[tokio::test(start_paused = true)]
async fn thrown_script_errors_come_back_as_thrown_nodes() {
  test_log_init();
  let fv = FakeVm::new();
  let (handle, _events, _frames) = boot_paused(&fv, 10, vec![]).await;

  fv.add_canned_eval(
    "explode()",
    CannedEval::Throw {
      message: "boom".to_string(),
    },
  );
  let result = handle
    .evaluate_on_stack_frame(TOP_FRAME_ID, "explode()", HashMap::new())
    .await
    .unwrap();
  assert!(result.thrown);
  match result.node {
    ValueNode::Error { data, .. } => {
      assert_eq!(data.message, "boom");
      assert_eq!(data.name, "Error");
    }
    other => panic!("expected an error node, got {other:?}"),
  }
}

#[tokio::test(start_paused = true)]
async fn evaluation_against_an_unknown_frame_fails() {
  test_log_init();
  let fv = FakeVm::new();
  let (handle, _events, _frames) = boot_paused(&fv, 10, vec![]).await;
  assert!(matches!(
    handle
      .evaluate_on_stack_frame("frame-9", "1 + 1", HashMap::new())
      .await,
    Err(HostErr::UnknownStackFrame(_))
  ));
}

#[tokio::test(start_paused = true)]
async fn named_objects_from_a_prior_pause_are_rejected() {
  test_log_init();
  let fv = FakeVm::new();
  let (handle, _events, _frames) = boot_paused(&fv, 10, vec![]).await;

  let mut named = HashMap::new();
  named.insert("extra".to_string(), ObjectId::new("$$obj-9999"));
  assert!(matches!(
    handle
      .evaluate_on_stack_frame(TOP_FRAME_ID, "extra", named)
      .await,
    Err(HostErr::UnknownObject(_))
  ));
}

#[tokio::test(start_paused = true)]
async fn named_objects_wrap_the_scope_for_the_evaluation() {
  test_log_init();
  let fv = FakeVm::new();
  let object = fv.new_script_object(
    "Object",
    vec![("answer", crate::test::vm::FakeProp::Data(VmValue::Int(42)))],
  );
  let locals =
    vec![FakeLocal::new("o", "Ljava/lang/Object;", 0, object)];
  let (handle, _events, frames) = boot_paused(&fv, 10, locals).await;

  let locals_id = frames[0].scope_chain[0]
    .object
    .object_id()
    .cloned()
    .unwrap();
  let props = handle
    .get_object_properties(&locals_id, true, false)
    .await
    .unwrap();
  let object_id = props
    .get("o")
    .and_then(|desc| desc.value.as_ref())
    .and_then(|node| node.object_id())
    .cloned()
    .unwrap();

  fv.add_canned_eval("extra.answer", CannedEval::Return(VmValue::Int(42)));
  let mut named = HashMap::new();
  named.insert("extra".to_string(), object_id);
  let result = handle
    .evaluate_on_stack_frame(TOP_FRAME_ID, "extra.answer", named)
    .await
    .unwrap();
  assert_eq!(
    result.node,
    ValueNode::Simple(SimpleValue::Number(42.0))
  );
}

#[tokio::test(start_paused = true)]
async fn invalid_slot_degrades_to_per_variable_reads() {
  test_log_init();
  let fv = FakeVm::new();
  let locals = vec![
    FakeLocal::new("a", "I", 0, VmValue::Int(1)),
    FakeLocal::new("b", "I", 1, VmValue::Int(2))
      .failing(JDWP_INVALID_SLOT),
    FakeLocal::new("c", "I", 2, VmValue::Int(3)),
  ];
  let (handle, _events, frames) = boot_paused(&fv, 10, locals).await;

  // The pause still happened, with the unreadable local dropped.
  let locals_id = frames[0].scope_chain[0]
    .object
    .object_id()
    .cloned()
    .expect("local scope present");
  let props = handle
    .get_object_properties(&locals_id, true, false)
    .await
    .unwrap();
  assert_eq!(
    props.get("a").unwrap().value,
    Some(ValueNode::Simple(SimpleValue::Number(1.0)))
  );
  assert_eq!(
    props.get("c").unwrap().value,
    Some(ValueNode::Simple(SimpleValue::Number(3.0)))
  );
  assert!(props.get("b").is_none());
}
