//! 错误处理模块

use core::fmt;
use crate::consts::*;

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 内存分配失败
    NoMemory,
    /// 设备读取失败或读取不完整
    Io,
    /// 磁盘数据结构损坏（魔数、校验和、不变量）
    Corrupted,
    /// 调用者提供的名字缓冲区太小，可以换更大的缓冲区重试
    BufferTooSmall,
    /// 目录结束或名字不存在
    NotFound,
    /// 参数无效
    InvalidInput,
    /// 当前版本不支持该字段或格式
    Unsupported,
}

/// XFS 错误类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

impl Error {
    pub fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &'static str {
        self.message
    }

    /// 是否为“没有找到”（目录结束），而不是真正的故障
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// 对应的 errno
    pub fn code(&self) -> i32 {
        match self.kind {
            ErrorKind::NoMemory => ENOMEM,
            ErrorKind::Io => EIO,
            ErrorKind::Corrupted => EFSCORRUPTED,
            ErrorKind::BufferTooSmall => EOVERFLOW,
            ErrorKind::NotFound => ENOENT,
            ErrorKind::InvalidInput => EINVAL,
            ErrorKind::Unsupported => ENOTSUP,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "XfsError({:?}, code={}, msg={})", self.kind, self.code(), self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// XFS Result 类型
pub type Result<T> = core::result::Result<T, Error>;
