///! RadioReference listing harvester producing CHIRP channel files

pub mod config;
pub mod error;
pub mod logging;
pub mod module;

pub use config::HarvestConfig;
pub use error::{HarvestError, Result, Stage};
pub use module::cache::CountyCache;
pub use module::normalizer::{normalize, AppendContext, ModeFilter};
pub use module::pipeline::Harvester;
pub use module::writer::{write, OutputFormat};
