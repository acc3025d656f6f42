//! Request-scoped identity models.

pub mod caller;

pub use caller::{Caller, Role};
