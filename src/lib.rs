pub mod actions;
pub mod config;
pub mod engine;
pub mod events;
pub mod flows;
pub mod intents;
pub mod types;

// Re-export main types
pub use types::*;

// Re-export the runtime API for convenience
pub use config::RuntimeConfig;
pub use engine::Runtime;
pub use events::Event;
pub use flows::{FlowDefinition, FlowRegistry};
