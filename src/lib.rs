pub mod aggregation;
pub mod boundary;
pub mod characterisation;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod quality;
pub mod repositories;
pub mod scheduler;
pub mod services;
pub mod window;

pub use config::Config;
pub use error::{AppError, Result};
