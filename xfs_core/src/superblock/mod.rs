//! Superblock 操作模块
//!
//! 这个模块提供 XFS superblock 的读取和验证功能，
//! 以及目录代码需要的几何信息与特性判断。

#![allow(non_camel_case_types)]

mod read;

pub use read::*;
