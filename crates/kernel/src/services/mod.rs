//! Kernel services.

pub mod token;

pub use token::TokenService;
