pub mod challenge;
pub mod config;
pub mod crypto;
pub mod derivation;
pub mod dispatch;
pub mod error;
pub mod manager;
pub mod session;

pub use error::{EngineError, VrfManagerError};
pub use manager::VrfWorkerManager;
