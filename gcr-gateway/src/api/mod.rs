//! HTTP API handlers for gcr-gateway

pub mod callback;
pub mod generate;
pub mod health;

pub use callback::callback_routes;
pub use generate::generate_routes;
pub use health::health_routes;
