//! Utils Module
pub mod logging;
pub mod process;
pub mod truncate;

pub use logging::init_logging;
pub use truncate::clip_middle;
