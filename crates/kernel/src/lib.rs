//! Talentdesk Kernel Library
//!
//! List endpoints for the applicant-tracking entities: query validation,
//! resource bounds, role scoping and storage. The `talentdesk` binary
//! serves [`routes::router`].

pub mod config;
pub mod db;
pub mod error;
pub mod listing;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod schema;
pub mod scope;
pub mod services;
pub mod state;
pub mod storage;
