// trancode/src/flow/router.rs

use crate::core::context::FlowContext;
use crate::core::value::{Value, VarClass};
use crate::definition::model::RouterDef;
use tracing::{event, Level};

/// Picks the next function group for `router` given the current snapshot.
///
/// The candidate list is scanned in order and the first value equal to the
/// variable wins. Equality is typed. A missing or null variable, a router with
/// no `vartype`, a `funcCachedVariables` path that is not exactly `<function>.<field>`, or no
/// equal candidate all yield the default group. This never fails.
pub fn evaluate_router(router: &RouterDef, ctx: &FlowContext) -> String {
  let current = lookup_variable(router, ctx).filter(|v| !v.is_null());

  let matched = current.and_then(|value| {
    router
      .values
      .iter()
      .position(|candidate| candidate == value)
      .and_then(|idx| router.next_func_groups.get(idx))
  });

  match matched {
    Some(next) => {
      event!(Level::DEBUG, variable = %router.variable, next_group = %next, "Router matched.");
      next.clone()
    }
    None => {
      event!(
        Level::DEBUG,
        variable = %router.variable,
        present = current.is_some(),
        next_group = %router.default_func_group,
        "Router fell back to default group."
      );
      router.default_func_group.clone()
    }
  }
}

fn lookup_variable<'c>(router: &RouterDef, ctx: &'c FlowContext) -> Option<&'c Value> {
  match router.var_type? {
    class @ (VarClass::SystemSession | VarClass::UserSession) => ctx.class(class).get(&router.variable),
    VarClass::FuncCachedVariables => {
      let segments: Vec<&str> = router.variable.split('.').collect();
      match segments.as_slice() {
        [function, field] => ctx.cached_field(function, field),
        _ => None,
      }
    }
  }
}
