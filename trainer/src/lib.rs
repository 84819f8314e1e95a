pub mod configs;
pub mod data;
pub mod error;
mod pipeline;
pub mod synthetic;

pub use error::{Result, TrainerErr};
pub use pipeline::{TrainingReport, train};
