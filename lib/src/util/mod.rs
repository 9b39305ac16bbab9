pub mod cursor;
pub mod file;
pub mod varint;

pub use cursor::ByteCursor;
