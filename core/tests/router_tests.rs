// tests/router_tests.rs
mod common;
use common::*;
use serde_json::json;
use trancode::flow::evaluate_router;
use trancode::{FlowContext, RouterDef, VarClass};

fn status_router() -> RouterDef {
  RouterDef::on(VarClass::UserSession, "status")
    .route("A", "G1")
    .route("B", "G2")
    .otherwise("Fallback")
}

#[test]
fn test_router_picks_matching_value() {
  setup_tracing();
  let router = status_router();

  let ctx = FlowContext::builder().set_user("status", "B").build();
  assert_eq!(evaluate_router(&router, &ctx), "G2");

  let ctx = FlowContext::builder().set_user("status", "C").build();
  assert_eq!(evaluate_router(&router, &ctx), "Fallback");
}

#[test]
fn test_router_first_match_wins() {
  setup_tracing();
  let router = RouterDef::on(VarClass::UserSession, "status")
    .route("A", "First")
    .route("A", "Second")
    .otherwise("Fallback");
  let ctx = FlowContext::builder().set_user("status", "A").build();
  assert_eq!(evaluate_router(&router, &ctx), "First");
}

#[test]
fn test_router_equality_is_typed() {
  setup_tracing();
  let router = RouterDef::on(VarClass::UserSession, "code")
    .route(1, "Int")
    .route("2", "Str")
    .otherwise("Fallback");

  let ctx = FlowContext::builder().set_user("code", "1").build();
  assert_eq!(evaluate_router(&router, &ctx), "Fallback");

  let ctx = FlowContext::builder().set_user("code", 2).build();
  assert_eq!(evaluate_router(&router, &ctx), "Fallback");

  let ctx = FlowContext::builder().set_user("code", 1).build();
  assert_eq!(evaluate_router(&router, &ctx), "Int");
}

#[test]
fn test_router_missing_or_null_variable_uses_default() {
  setup_tracing();
  let router = RouterDef::on(VarClass::UserSession, "status")
    .route(json!(null), "NullGroup")
    .otherwise("Fallback");

  let empty = FlowContext::default();
  assert_eq!(evaluate_router(&router, &empty), "Fallback");

  let null = FlowContext::builder().set_user("status", json!(null)).build();
  assert_eq!(evaluate_router(&router, &null), "Fallback");
}

#[test]
fn test_router_reads_system_session() {
  setup_tracing();
  let router = RouterDef::on(VarClass::SystemSession, "role").route("admin", "Admin").otherwise("User");

  let ctx = FlowContext::builder()
    .set_system("role", "admin")
    .set_user("role", "guest")
    .build();
  assert_eq!(evaluate_router(&router, &ctx), "Admin");

  // Same key in the user session is not consulted.
  let ctx = FlowContext::builder().set_user("role", "admin").build();
  assert_eq!(evaluate_router(&router, &ctx), "User");
}

#[test]
fn test_router_func_cached_two_segments() {
  setup_tracing();
  let ctx = FlowContext::builder()
    .cache_result("calcStep", json!({ "result": "OK", "nested": { "deep": "OK" } }))
    .build();

  let two = RouterDef::on(VarClass::FuncCachedVariables, "calcStep.result")
    .route("OK", "Done")
    .otherwise("Retry");
  assert_eq!(evaluate_router(&two, &ctx), "Done");

  let one = RouterDef::on(VarClass::FuncCachedVariables, "calcStep")
    .route(json!({ "result": "OK", "nested": { "deep": "OK" } }), "Done")
    .otherwise("Retry");
  assert_eq!(evaluate_router(&one, &ctx), "Retry");

  let three = RouterDef::on(VarClass::FuncCachedVariables, "calcStep.nested.deep")
    .route("OK", "Done")
    .otherwise("Retry");
  assert_eq!(evaluate_router(&three, &ctx), "Retry");

  let other_fn = RouterDef::on(VarClass::FuncCachedVariables, "otherStep.result")
    .route("OK", "Done")
    .otherwise("Retry");
  assert_eq!(evaluate_router(&other_fn, &ctx), "Retry");
}

#[test]
fn test_router_without_candidates_goes_to_default() {
  setup_tracing();
  let ctx = FlowContext::builder().set_user("status", "anything").build();
  assert_eq!(evaluate_router(&RouterDef::goto("Next"), &ctx), "Next");
  assert_eq!(evaluate_router(&RouterDef::default(), &ctx), "");
}

#[test]
fn test_router_without_var_type_uses_default() {
  setup_tracing();
  let router: RouterDef = serde_json::from_value(json!({
    "variable": "status",
    "values": ["done"],
    "nextfuncgroups": ["G2"],
    "defaultfuncgroup": "DEF"
  }))
  .unwrap();
  assert_eq!(router.var_type, None);

  let ctx = FlowContext::builder()
    .set_user("status", "done")
    .set_system("status", "done")
    .build();
  assert_eq!(evaluate_router(&router, &ctx), "DEF");
}
