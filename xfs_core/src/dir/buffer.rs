//! 目录块缓冲区加载

use super::DirContext;
use crate::{
    block::BlockDevice,
    error::{Error, ErrorKind, Result},
    extent::ExtentList,
};
use alloc::vec::Vec;
use log::{debug, error};

/// 一个已完整读入内存的目录块
///
/// 只有读取完全成功才会构造出来，失败路径上缓冲区随 `Vec` 一起释放。
pub struct DirBlock {
    data: Vec<u8>,
    fsbno: u64,
}

impl DirBlock {
    /// 从物理文件系统块 `fsbno` 开始读取一个目录块
    ///
    /// # 错误
    ///
    /// * `NoMemory` - 无法分配目录块大小的缓冲区
    /// * `Io` - 设备读取失败或读取字节数不足
    pub fn load<D: BlockDevice>(ctx: DirContext<'_, D>, fsbno: u64) -> Result<Self> {
        let len = ctx.dir_block_size();
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| Error::new(ErrorKind::NoMemory, "directory block allocation failed"))?;
        data.resize(len, 0);

        let pos = ctx.volume().fsb_to_byte(fsbno)?;
        let n = ctx.volume().block_device().read_bytes(pos, &mut data)?;
        if n != len {
            error!("DirBlock::load: IO error at fsb {} ({} of {} bytes)", fsbno, n, len);
            return Err(Error::new(ErrorKind::Io, "short read of directory block"));
        }

        debug!("DirBlock::load: fsb={} pos={} len={}", fsbno, pos, len);
        Ok(Self { data, fsbno })
    }

    /// 按目录内逻辑块号读取，目录块必须完整落在同一个 extent 内
    pub fn load_logical<D: BlockDevice>(
        ctx: DirContext<'_, D>,
        extents: &ExtentList,
        logical: u64,
    ) -> Result<Self> {
        let fsbs = ctx.superblock().fsbs_per_dir_block();
        let ext = extents
            .find(logical)
            .ok_or(Error::new(ErrorKind::Corrupted, "directory block not mapped"))?;
        if !ext.contains(logical + fsbs - 1) {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "directory block spans extents",
            ));
        }
        if ext.state != crate::extent::ExtentState::Normal {
            return Err(Error::new(ErrorKind::Corrupted, "unwritten directory extent"));
        }
        Self::load(ctx, ext.startblock + (logical - ext.startoff))
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 起始物理文件系统块号
    pub fn fsbno(&self) -> u64 {
        self.fsbno
    }
}
