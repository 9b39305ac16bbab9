pub mod bond;
pub mod error;
pub mod forge;
pub mod format;
pub mod util;

pub use error::{DecodeError, DecodeResult};
