//! CLI command implementations.

pub mod build;
pub mod verify;

pub use build::{build_site, BuildOverrides};
pub use verify::verify_site;
