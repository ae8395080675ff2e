pub mod error;
pub use error::Result;
pub use error::Error;

pub mod config;
pub use config::Config;

pub mod mod_list;
pub use mod_list::{ModDescriptor, ModList};

pub mod progress;
pub mod catalog;
pub mod relationship_resolver;
pub mod game_instance;
pub mod gap_analysis;
pub mod installation;
pub mod reconcile;
pub mod updates;
