pub mod account;
pub mod auth;
pub mod bootstrap;
pub mod configuration;
pub mod domain;
pub mod error;
pub mod logger;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
pub mod startup;
pub mod store;
pub mod telemetry;
pub mod upload_client;
pub mod validators;
