pub mod clock;
pub mod error;
pub mod service;

pub use clock::*;
pub use error::*;
pub use service::*;
