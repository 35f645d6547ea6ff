pub mod config;
pub mod error;
pub mod types;

pub use config::{load_tuning, Config, Credentials, Secret, ScrapeTuning};
pub use error::{Result, ScrapeError, ScrapeFailure, Stage};
pub use types::*;
