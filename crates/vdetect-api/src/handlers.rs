//! Request handlers.

pub mod analyze;
pub mod debug;
pub mod health;
pub mod home;

pub use analyze::{analyze, upload};
pub use debug::{debug_model, debug_model_status};
pub use health::health;
pub use home::home;
