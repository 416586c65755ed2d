//! HTTP API handlers for tierwatch
//!
//! Thin layer over the inference gateway and the training coordinator.

pub mod classify;
pub mod health;
pub mod retrain;

pub use classify::inference_routes;
pub use health::health_routes;
pub use retrain::training_routes;
