pub mod aggregate;
pub mod analyzer;
pub mod clock;
pub mod error;
pub mod extract;
pub mod goals;
pub mod models;
pub mod pipeline;
pub mod service;
pub mod store;
pub mod user;
