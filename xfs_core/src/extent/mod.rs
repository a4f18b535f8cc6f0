//! Extent 操作模块
//!
//! 这个模块提供 XFS extent 记录的解码，以及 extent 格式与
//! B+Tree 格式数据 fork 的块映射。

mod map;
mod tree;

pub use map::*;
pub use tree::*;
