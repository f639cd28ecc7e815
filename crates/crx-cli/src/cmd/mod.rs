//! Subcommand implementations

pub mod clean;
pub mod id;
pub mod keygen;
pub mod pack;
pub mod verify;
