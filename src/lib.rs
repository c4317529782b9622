pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod mirror;
pub mod parse;
pub mod recovery;
pub mod restart;
pub mod transport;
pub mod util;

pub use error::MirrorError;
