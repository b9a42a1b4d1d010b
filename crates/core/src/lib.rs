// crates/core/src/lib.rs
pub mod config;
pub mod error;
pub mod event;
pub mod job;
pub mod media;

pub use config::*;
pub use error::*;
pub use event::*;
pub use job::*;
pub use media::*;
