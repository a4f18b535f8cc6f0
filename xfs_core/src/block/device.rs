//! 块设备核心类型

use core::sync::atomic::{AtomicU64, Ordering};
use crate::error::Result;

/// 块设备接口
///
/// 实现此 trait 以提供底层只读设备访问。读取使用 `&self`，
/// 同一设备上可以同时存在多个目录会话。
///
/// # 示例
///
/// ```rust,ignore
/// use xfs_core::{BlockDevice, Result};
///
/// struct MyDevice {
///     image: Vec<u8>,
/// }
///
/// impl BlockDevice for MyDevice {
///     fn sector_size(&self) -> u32 {
///         512
///     }
///
///     fn total_sectors(&self) -> u64 {
///         self.image.len() as u64 / 512
///     }
///
///     fn read_sectors(&self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize> {
///         // 实现扇区读取
///         Ok(count as usize * 512)
///     }
/// }
/// ```
pub trait BlockDevice {
    /// 物理扇区大小（通常 512）
    fn sector_size(&self) -> u32;

    /// 总扇区数
    fn total_sectors(&self) -> u64;

    /// 读取扇区
    ///
    /// # 参数
    ///
    /// * `lba` - 起始扇区号
    /// * `count` - 要读取的扇区数
    /// * `buf` - 目标缓冲区（大小至少为 count * sector_size）
    ///
    /// # 返回
    ///
    /// 成功返回实际读取的字节数，设备末尾可能少于请求的长度
    fn read_sectors(&self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize>;
}

/// 块设备包装器
///
/// 在扇区接口之上提供任意字节偏移的读取，并统计读取次数。
pub struct BlockDev<D> {
    /// 底层设备
    device: D,
    /// 读取次数
    read_count: AtomicU64,
}

impl<D: BlockDevice> BlockDev<D> {
    /// 创建新的块设备包装器
    pub fn new(device: D) -> Self {
        Self {
            device,
            read_count: AtomicU64::new(0),
        }
    }

    /// 获取底层设备的引用
    pub fn device(&self) -> &D {
        &self.device
    }

    /// 获取物理扇区大小
    pub fn sector_size(&self) -> u32 {
        self.device.sector_size()
    }

    /// 设备总字节数
    pub fn total_bytes(&self) -> u64 {
        self.device
            .total_sectors()
            .saturating_mul(self.device.sector_size() as u64)
    }

    /// 获取读取次数
    pub fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::Relaxed)
    }

    // 内部辅助方法

    /// 增加读计数
    pub(super) fn inc_read_count(&self) {
        self.read_count.fetch_add(1, Ordering::Relaxed);
    }
}
