//! 文件系统高级 API
//!
//! 这个模块提供只读 XFS 卷的挂载、inode 读取和目录打开接口。

mod volume;

pub use volume::Volume;
