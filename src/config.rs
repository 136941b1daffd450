//! Configuration helpers shared by the CLI.

pub mod duration;
