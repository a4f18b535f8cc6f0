//! Inode 操作模块
//!
//! 这个模块提供 XFS inode 的定位、读取和验证功能。

#![allow(non_camel_case_types)]

mod read;

pub use read::*;
