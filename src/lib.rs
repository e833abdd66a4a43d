// plan-pdf-service/src/lib.rs

pub mod config;
pub mod error;
pub mod gcs;
pub mod models;
pub mod pipeline;
pub mod renderers;
pub mod routes;
pub mod state;
pub mod templates;
