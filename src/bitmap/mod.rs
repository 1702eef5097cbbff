//! 位图操作

mod ops;

pub use ops::*;
