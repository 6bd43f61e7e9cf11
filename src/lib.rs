pub mod archive;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod conn;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod ops;
pub mod utils;
