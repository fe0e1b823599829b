pub mod catalog;
pub mod cli;
pub mod config;
pub mod expiry;
pub mod highlight;
pub mod model;
pub mod reminder;
pub mod search;
pub mod storage;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use model::Item;
pub use storage::ItemRepository;
