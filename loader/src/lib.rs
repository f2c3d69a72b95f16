pub mod config;
pub mod engine;
pub mod reader;
pub mod reorder;
pub mod responder;
pub mod state;

pub use config::LoaderConfig;
pub use state::LoaderState;
