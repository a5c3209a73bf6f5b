pub mod error;
pub mod models;
pub mod services;

pub use error::{Result, StackError};
