//! xfs_core: 只读 XFS 目录解码与查找
//!
//! 从块设备读取 superblock 和 inode，识别目录的磁盘格式
//! （短格式、单块、叶子、节点、B+树），并提供统一的枚举和按名查找接口。

#![no_std]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod block;
pub mod bytes;
pub mod checksum;
pub mod consts;
pub mod dir;
pub mod error;
pub mod extent;
pub mod fs;
pub mod inode;
pub mod superblock;

// 重新导出常用类型
pub use block::{BlockDev, BlockDevice};
pub use consts::*;
pub use dir::{
    BlockDirectory, DirContext, DirCursor, DirEntry, DirOps, DirectoryIterator, LeafDirectory,
    NodeDirectory, ShortDirectory, TreeDirectory,
};
pub use error::{Error, ErrorKind, Result};
pub use extent::{ExtentList, ExtentMapEntry, ExtentState, ExtentTree};
pub use fs::Volume;
pub use inode::Inode;
pub use superblock::Superblock;
