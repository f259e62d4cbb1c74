pub mod events;
pub mod service;

pub use service::{DispatchError, JobDispatcher};
