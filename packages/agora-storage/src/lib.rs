pub mod db;
pub mod elastic;
pub mod models;
pub mod queries;
pub mod retry;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
