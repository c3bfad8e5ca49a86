//! Configuration loading
//!
//! Configuration comes from `BUSYSYNC_*` environment variables or a TOML/JSON
//! file, layered over the defaults in `busysync_domain::Config`.

pub mod loader;

pub use loader::{load, load_from_env, load_from_file, probe_config_paths, validate};
