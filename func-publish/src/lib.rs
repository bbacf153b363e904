pub mod arm;
pub mod blob;
pub mod cli;
pub mod load_config;
pub mod prompt;

pub use cli::{run, Cli, Commands, PublishArgs};
