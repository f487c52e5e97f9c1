//! Product selection request handling: request model, data transformer and
//! the HTTP handler that drives the validate → load → transform → merge →
//! respond pipeline.

pub mod handlers;
pub mod models;
pub mod transform;
