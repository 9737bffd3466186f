pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod textutil;

pub use error::{GenerationError, RoundTripError, TemplateBindingError};
