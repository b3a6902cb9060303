// Shared modules
pub(crate) mod cli;
mod metadata;
mod run;

// Entry points
pub use run::native_main;
