pub mod error;
pub mod feature_flags;
pub mod models;

pub use error::*;
pub use feature_flags::*;
pub use models::*;
