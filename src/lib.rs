// Library exports for the binary and tests

pub mod argument;
pub mod callback;
pub mod config;
pub mod dom;
pub mod error;
pub mod invoker;
pub mod js;
pub mod runner;
pub mod value;

// Re-export commonly used types
pub use argument::ArgumentBag;
pub use callback::{CallbackHandle, CallbackState};
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use invoker::{InvocationRequest, Invoker, NodeId, UiManager};
pub use js::scope::{JsScope, PumpReport};
pub use runner::TaskRunner;
pub use value::GenericValue;
