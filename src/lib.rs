pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod session;
pub mod store;
pub mod sync;
pub mod types;

#[cfg(test)]
pub mod testing;
