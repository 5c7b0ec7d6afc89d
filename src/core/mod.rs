//! 核心类型：错误与错误种类

pub mod error;

pub use error::{ErrorKind, RunError};
