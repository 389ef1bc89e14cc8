pub mod etl;
pub mod export;
pub mod extract;
pub mod pipeline;
pub mod resolve;

pub use crate::domain::ports::{DocumentFetcher, Pipeline, Storage};
pub use crate::utils::error::Result;
