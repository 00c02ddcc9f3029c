pub mod auth;
pub mod backend;
pub mod calendar;
pub mod client;
pub mod commands;
pub mod configuration;
pub mod configuration_handler;
pub mod database_interface;
pub mod error;
pub mod http;
pub mod local_store;
pub mod schema;
pub mod slot_manager;
#[cfg(test)]
mod testutils;
pub mod types;
