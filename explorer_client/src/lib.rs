pub mod client;
pub mod error;
pub mod types;

pub use client::{ExplorerClient, TransactionSource};
pub use error::ExplorerError;
pub use types::*;
