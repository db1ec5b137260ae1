use std::rc::Weak;

use rquickjs::function::Rest;
use rquickjs::{Ctx, Function, Object, Value};

use super::scope::{JsScope, ScopeInner};
use super::ui_manager_module;

const BINDINGS_GLOBAL: &str = "__nativeBindings";

pub type Trampoline =
    for<'js> fn(&JsScope, &Ctx<'js>, Rest<Value<'js>>) -> rquickjs::Result<Value<'js>>;

/// A native module: an explicit table of exported names and the trampolines
/// behind them. Bound into every context the scope creates and reachable
/// from script through `internalBinding(name)`.
#[derive(Clone, Copy)]
pub struct NativeModule {
    pub name: &'static str,
    pub functions: &'static [(&'static str, Trampoline)],
}

pub fn default_modules() -> Vec<NativeModule> {
    vec![ui_manager_module::MODULE]
}

pub(crate) fn bind_modules<'js>(
    ctx: &Ctx<'js>,
    scope: &Weak<ScopeInner>,
    modules: &[NativeModule],
) -> rquickjs::Result<()> {
    let bindings = Object::new(ctx.clone())?;
    for module in modules {
        let object = Object::new(ctx.clone())?;
        for &(name, trampoline) in module.functions {
            object.set(name, bind_function(ctx, scope, name, trampoline)?)?;
        }
        bindings.set(module.name, object)?;
        tracing::debug!(target: "bridge", module = module.name, "bound native module");
    }

    let global = ctx.globals();
    global.set(BINDINGS_GLOBAL, bindings)?;

    let lookup = Function::new(
        ctx.clone(),
        |ctx: Ctx<'js>, name: String| -> rquickjs::Result<Value<'js>> {
            let bindings: Object<'js> = ctx.globals().get(BINDINGS_GLOBAL)?;
            bindings.get(name.as_str())
        },
    )?
    .with_name("internalBinding")?;
    global.set("internalBinding", lookup)?;
    Ok(())
}

fn bind_function<'js>(
    ctx: &Ctx<'js>,
    scope: &Weak<ScopeInner>,
    name: &'static str,
    trampoline: Trampoline,
) -> rquickjs::Result<Function<'js>> {
    let scope = scope.clone();
    Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
            let Some(inner) = scope.upgrade() else {
                return Ok(Value::new_undefined(ctx));
            };
            trampoline(&JsScope::from_inner(inner), &ctx, args)
        },
    )?
    .with_name(name)
}
