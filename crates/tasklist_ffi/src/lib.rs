//! FFI bridge crate for the task list UI.
//!
//! Dart bindings are generated from [`api`] by `flutter_rust_bridge_codegen`.

pub mod api;
