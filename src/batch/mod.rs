pub mod client;
pub mod error;
pub mod types;

pub use client::{BatchClient, BatchEndpoint};
pub use error::BatchApiError;
pub use types::{BatchObject, BatchPhase, Message, RequestLine, ResultLine};
