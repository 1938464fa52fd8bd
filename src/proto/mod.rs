//! Wire protocol: frame types, codec, and the crate-wide error type.

pub mod codec;
pub mod error;
pub mod frame;

pub use error::{Error, Result};
pub use frame::Frame;
