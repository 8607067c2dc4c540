#![allow(clippy::module_inception)]

mod circuit;

pub mod reader;

pub use crate::circuit::circuit::*;
