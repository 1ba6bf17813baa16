pub mod config;
pub mod gateway;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod test_support;
pub mod utils;
