//! Continuation-local storage.
//!
//! A [`ClsContext`] carries per-request state (an id and a key/value store)
//! down an async call chain. Contexts are passed explicitly rather than looked
//! up from task-local storage, so ownership of request state stays visible in
//! function signatures.

pub mod context;
pub mod service;

pub use context::ClsContext;
pub use service::{ClsOptions, ClsService, IdGenerator};
