pub mod modules;
pub mod runtime;
pub mod scope;
pub mod ui_manager_module;
