pub mod backend;
pub mod error;
pub mod job;
pub mod preview;
pub mod progress;
pub mod settings;
pub mod types;
