use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("CallUIFunction arguments must be an object, got {found}")]
    ArgumentCoercion { found: &'static str },
    #[error("CallUIFunction result is not an object, got {found}")]
    ResultCoercion { found: &'static str },
    #[error("value nesting exceeds {0} levels")]
    TooDeep(usize),
    #[error("script context has been torn down")]
    ContextGone,
    #[error("script context is in use")]
    ContextBusy,
    #[error("quickjs error: {0}")]
    Js(#[from] rquickjs::Error),
}
