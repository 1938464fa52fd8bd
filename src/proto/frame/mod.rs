//! Wire-protocol frame types.

mod types;

pub use types::Frame;
