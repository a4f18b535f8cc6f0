//! XFS 卷：块设备 + superblock

use crate::{
    block::{BlockDev, BlockDevice},
    dir::{DirContext, DirectoryIterator},
    error::{Error, ErrorKind, Result},
    inode::{read_inode, Inode},
    superblock::Superblock,
};

/// 只读 XFS 卷
///
/// 挂载后 superblock 不再变化，多个目录会话可以共享 `&Volume`。
///
/// # 示例
///
/// ```rust,ignore
/// use xfs_core::{BlockDev, Volume};
///
/// let vol = Volume::mount(BlockDev::new(MyDevice::new()))?;
/// let root = vol.read_inode(vol.superblock().root_ino())?;
/// let mut dir = vol.open_dir(&root)?;
/// let mut name = [0u8; 256];
/// while let Ok((len, ino)) = dir.get_next(&mut name) {
///     println!("{} -> {}", core::str::from_utf8(&name[..len]).unwrap_or("?"), ino);
/// }
/// ```
pub struct Volume<D: BlockDevice> {
    bdev: BlockDev<D>,
    sb: Superblock,
}

impl<D: BlockDevice> Volume<D> {
    /// 挂载（只读取并校验 superblock）
    ///
    /// # 错误
    ///
    /// - `ErrorKind::Corrupted` - 无效的 superblock
    /// - `ErrorKind::Io` - 设备读取失败
    pub fn mount(bdev: BlockDev<D>) -> Result<Self> {
        let sb = Superblock::load(&bdev)?;
        Ok(Self { bdev, sb })
    }

    /// 获取 superblock 引用
    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    /// 获取块设备引用
    pub fn block_device(&self) -> &BlockDev<D> {
        &self.bdev
    }

    /// 读取 inode
    pub fn read_inode(&self, ino: u64) -> Result<Inode> {
        read_inode(&self.bdev, &self.sb, ino)
    }

    /// 文件系统块号转换为设备字节地址
    ///
    /// 文件系统块号的高位是 AG 号，低 `agblklog` 位是 AG 内块号。
    pub fn fsb_to_byte(&self, fsb: u64) -> Result<u64> {
        let agblklog = self.sb.ag_block_log() as u32;
        let agno = fsb >> agblklog;
        let agbno = fsb & ((1u64 << agblklog) - 1);
        if agno >= self.sb.ag_count() as u64 || agbno >= self.sb.ag_blocks() as u64 {
            return Err(Error::new(ErrorKind::Corrupted, "Block number out of range"));
        }
        let linear = agno * self.sb.ag_blocks() as u64 + agbno;
        Ok(linear << self.sb.block_log())
    }

    /// 文件系统块号对应的 512 字节扇区地址（V5 头部记录的 blkno）
    pub fn fsb_to_daddr(&self, fsb: u64) -> Result<u64> {
        Ok(self.fsb_to_byte(fsb)? >> crate::consts::XFS_BB_SHIFT)
    }

    /// 为目录 inode 创建目录迭代器
    ///
    /// 不是目录时返回 `InvalidInput`；没有任何格式能解析时返回
    /// `Corrupted`（目录不可读）。
    pub fn open_dir<'a>(&'a self, inode: &'a Inode) -> Result<DirectoryIterator<'a, D>> {
        if !inode.is_dir() {
            return Err(Error::new(ErrorKind::InvalidInput, "Not a directory"));
        }
        DirectoryIterator::open(DirContext::new(self, inode))
            .ok_or(Error::new(ErrorKind::Corrupted, "Unreadable directory"))
    }
}
