pub mod assemble;
pub mod boards;
pub mod config;
pub mod diagnostics;
pub mod enrich;
pub mod error;
pub mod filename;
pub mod log_sanitize;
pub mod pipeline;
pub mod promotion;
pub mod rpi_imager;
pub mod sources;
pub mod util;

pub use error::{Error, Result};
