pub mod config;
pub mod error;
pub mod event;
pub mod output;
pub mod state;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{NexusError, Result};
pub use event::EventBus;
pub use types::*;
