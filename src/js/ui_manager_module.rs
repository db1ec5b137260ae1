use rquickjs::function::Rest;
use rquickjs::{Ctx, Exception, Value};
use tracing::{debug, trace};

use super::modules::{NativeModule, Trampoline};
use super::scope::JsScope;
use crate::argument::ArgumentBag;
use crate::invoker::InvocationRequest;
use crate::value::convert::{function_name, node_id, to_generic};
use crate::value::GenericValue;

pub const MODULE: NativeModule = NativeModule {
    name: "UIManagerModule",
    functions: &[("CallUIFunction", call_ui_function as Trampoline)],
};

/// `CallUIFunction(id, name, args, callback?)`
///
/// The node id and name fall back to `0` and `""`. Arguments that are not an
/// object raise a `TypeError` and nothing is sent. The callback is only armed
/// when the fourth argument is callable.
pub fn call_ui_function<'js>(
    scope: &JsScope,
    ctx: &Ctx<'js>,
    args: Rest<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    let arg = |index: usize| args.0.get(index);

    let node_id = arg(0).map(node_id).unwrap_or(0);
    let name = arg(1).map(function_name).unwrap_or_default();

    let raw_arguments = match arg(2) {
        Some(value) => to_generic(value),
        None => Ok(GenericValue::Null),
    };
    let arguments = match raw_arguments.and_then(ArgumentBag::build) {
        Ok(bag) => bag,
        Err(err) => {
            debug!(target: "bridge", node_id, name = %name, error = %err, "rejecting UI call");
            return Err(Exception::throw_type(ctx, &err.to_string()));
        }
    };

    let invoker = scope.invoker();
    if invoker.is_expired() {
        debug!(target: "bridge", node_id, name = %name, "ui manager expired, dropping call");
        return Ok(Value::new_undefined(ctx.clone()));
    }

    let callback = arg(3)
        .and_then(|value| value.as_function())
        .and_then(|function| scope.arm_callback(ctx, function.clone()));

    trace!(
        target: "bridge",
        node_id,
        name = %name,
        has_callback = callback.is_some(),
        "forwarding UI call"
    );
    invoker.invoke(InvocationRequest {
        root_id: scope.config().root_id,
        node_id,
        name,
        arguments,
        callback,
    });
    Ok(Value::new_undefined(ctx.clone()))
}
