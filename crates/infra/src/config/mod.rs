//! Configuration loading from files and the environment

pub mod loader;

pub use loader::{find_config_paths, load, load_from_env, load_from_file, load_with_path};
