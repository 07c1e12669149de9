#![doc = include_str!("../README.md")]

mod bag;
mod dictionary;
mod error;
mod value;

pub use crate::bag::*;
pub use crate::dictionary::*;
pub use crate::error::*;
pub use crate::value::*;
