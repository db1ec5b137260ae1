pub mod manager;

pub use manager::{ThreadedUiManager, ThreadedUiManagerBuilder, UiFunction};
