//! 块 I/O 操作实现

use super::{BlockDev, BlockDevice};
use crate::error::{Error, ErrorKind, Result};
use alloc::vec::Vec;
use log::trace;

impl<D: BlockDevice> BlockDev<D> {
    /// 读取字节
    ///
    /// 从任意字节偏移读取，自动处理扇区对齐。
    ///
    /// # 参数
    ///
    /// * `offset` - 设备上的字节偏移量
    /// * `buf` - 目标缓冲区
    ///
    /// # 返回
    ///
    /// 成功返回实际得到的字节数。设备读取不完整时返回值小于
    /// `buf.len()`，由调用者决定是否视为 I/O 错误。
    pub fn read_bytes(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let len = buf.len();
        if len == 0 {
            return Ok(0);
        }

        let sector_size = self.sector_size() as u64;
        if sector_size == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "device sector size is zero"));
        }

        // 计算起始扇区和扇区内偏移
        let start_sector = offset / sector_size;
        let sector_offset = (offset % sector_size) as usize;

        // 对齐时直接读入目标缓冲区
        if sector_offset == 0 && len as u64 % sector_size == 0 {
            let count = u32::try_from(len as u64 / sector_size)
                .map_err(|_| Error::new(ErrorKind::InvalidInput, "read too large"))?;
            self.inc_read_count();
            trace!("read_bytes: lba={} count={}", start_sector, count);
            let n = self.device().read_sectors(start_sector, count, buf)?;
            return Ok(n.min(len));
        }

        // 非对齐读取：先读入临时缓冲区
        let total_size = sector_offset + len;
        let sector_count = (total_size as u64).div_ceil(sector_size);
        let temp_len = (sector_count * sector_size) as usize;

        let mut temp = Vec::new();
        temp.try_reserve_exact(temp_len)
            .map_err(|_| Error::new(ErrorKind::NoMemory, "bounce buffer allocation failed"))?;
        temp.resize(temp_len, 0);

        let count = u32::try_from(sector_count)
            .map_err(|_| Error::new(ErrorKind::InvalidInput, "read too large"))?;
        self.inc_read_count();
        trace!("read_bytes: lba={} count={} (unaligned)", start_sector, count);
        let n = self.device().read_sectors(start_sector, count, &mut temp)?;

        // 复制所需字节
        let available = n.min(temp_len).saturating_sub(sector_offset).min(len);
        buf[..available].copy_from_slice(&temp[sector_offset..sector_offset + available]);

        Ok(available)
    }

    /// 读取恰好 `buf.len()` 字节，读取不完整视为 I/O 错误
    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let n = self.read_bytes(offset, buf)?;
        if n != buf.len() {
            return Err(Error::new(ErrorKind::Io, "short read from device"));
        }
        Ok(())
    }
}
