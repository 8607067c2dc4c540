mod queries;
mod reasons;

pub use crate::explain::reasons::{Reason, ReasonSet};
