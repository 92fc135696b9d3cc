pub mod config;
pub mod error;
pub mod http;
pub mod installer;
pub mod lock;
pub mod package;
pub mod registry;
pub mod runtime;
pub mod staging;
