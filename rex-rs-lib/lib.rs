pub mod circuit;
pub mod explain;
pub mod literal;

mod error;

pub use error::Error;

pub type Result<T> = std::result::Result<T, Error>;
