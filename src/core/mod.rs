pub(crate) mod acceptance;
pub mod config;
pub(crate) mod engine;
pub mod error;
pub mod models;
pub(crate) mod reprobe;
