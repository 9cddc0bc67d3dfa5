//! Data models

pub mod alert;

pub use alert::*;
