pub mod api;
pub mod config;
pub mod error;
pub mod gateways;
pub mod models;
pub mod notifications;
pub mod observability;
pub mod repositories;
pub mod services;
pub mod utils;
