//! Superblock 读取和验证

use crate::{
    block::{BlockDev, BlockDevice},
    bytes::{be_u16, be_u32, be_u64, fixed, u8_at},
    consts::*,
    error::{Error, ErrorKind, Result},
};
use alloc::vec;
use bitflags::bitflags;
use log::debug;

bitflags! {
    /// `sb_versionnum` 中的特性位（低 4 位为版本号）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VersionFlags: u16 {
        const ATTR = 0x0010;
        const NLINK = 0x0020;
        const QUOTA = 0x0040;
        const ALIGN = 0x0080;
        const DALIGN = 0x0100;
        const SHARED = 0x0200;
        const LOGV2 = 0x0400;
        const SECTOR = 0x0800;
        const EXTFLG = 0x1000;
        const DIRV2 = 0x2000;
        const BORG = 0x4000;
        const MOREBITS = 0x8000;
    }
}

bitflags! {
    /// `sb_features2`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Features2: u32 {
        const LAZYSBCOUNT = 0x0002;
        const ATTR2 = 0x0008;
        const PARENT = 0x0010;
        const PROJID32 = 0x0080;
        const CRC = 0x0100;
        const FTYPE = 0x0200;
    }
}

bitflags! {
    /// `sb_features_incompat`（仅 V5）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IncompatFeatures: u32 {
        const FTYPE = 0x0001;
        const SPINODES = 0x0002;
        const META_UUID = 0x0004;
        const BIGTIME = 0x0008;
        const NEEDSREPAIR = 0x0010;
        const NREXT64 = 0x0020;
    }
}

/// 版本号掩码
const XFS_SB_VERSION_NUMBITS: u16 = 0x000f;

/// 磁盘上的 superblock（只解析目录读取所需的字段）
#[derive(Debug, Clone)]
pub struct xfs_dsb {
    pub magicnum: u32,              // 0
    pub blocksize: u32,             // 4
    pub dblocks: u64,               // 8
    pub uuid: [u8; 16],             // 32
    pub rootino: u64,               // 56
    pub agblocks: u32,              // 84
    pub agcount: u32,               // 88
    pub versionnum: u16,            // 100
    pub sectsize: u16,              // 102
    pub inodesize: u16,             // 104
    pub inopblock: u16,             // 106
    pub blocklog: u8,               // 120
    pub sectlog: u8,                // 121
    pub inodelog: u8,               // 122
    pub inopblog: u8,               // 123
    pub agblklog: u8,               // 124
    pub dirblklog: u8,              // 192
    pub features2: u32,             // 200
    pub features_incompat: u32,     // 216
    pub meta_uuid: [u8; 16],        // 248
}

impl xfs_dsb {
    /// 从原始字节解析
    pub fn parse(buf: &[u8]) -> Result<Self> {
        Ok(Self {
            magicnum: be_u32(buf, 0)?,
            blocksize: be_u32(buf, 4)?,
            dblocks: be_u64(buf, 8)?,
            uuid: fixed::<16>(buf, 32)?,
            rootino: be_u64(buf, 56)?,
            agblocks: be_u32(buf, 84)?,
            agcount: be_u32(buf, 88)?,
            versionnum: be_u16(buf, 100)?,
            sectsize: be_u16(buf, 102)?,
            inodesize: be_u16(buf, 104)?,
            inopblock: be_u16(buf, 106)?,
            blocklog: u8_at(buf, 120)?,
            sectlog: u8_at(buf, 121)?,
            inodelog: u8_at(buf, 122)?,
            inopblog: u8_at(buf, 123)?,
            agblklog: u8_at(buf, 124)?,
            dirblklog: u8_at(buf, 192)?,
            features2: be_u32(buf, 200)?,
            features_incompat: be_u32(buf, 216)?,
            meta_uuid: fixed::<16>(buf, 248)?,
        })
    }
}

/// 从块设备读取 superblock
pub fn read_superblock<D: BlockDevice>(bdev: &BlockDev<D>) -> Result<xfs_dsb> {
    let mut sb_buf = vec![0u8; XFS_SB_READ_SIZE];
    bdev.read_exact_at(XFS_SB_OFFSET, &mut sb_buf)?;
    xfs_dsb::parse(&sb_buf)
}

/// Superblock 包装器，提供几何信息和特性判断
#[derive(Debug, Clone)]
pub struct Superblock {
    inner: xfs_dsb,
}

impl Superblock {
    /// 从块设备加载 superblock
    pub fn load<D: BlockDevice>(bdev: &BlockDev<D>) -> Result<Self> {
        let inner = read_superblock(bdev)?;
        Self::from_raw(inner)
    }

    /// 校验原始 superblock 并包装
    pub fn from_raw(inner: xfs_dsb) -> Result<Self> {
        if inner.magicnum != XFS_SB_MAGIC {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "Invalid XFS superblock magic number",
            ));
        }

        let bs = inner.blocksize;
        if !bs.is_power_of_two()
            || !(XFS_MIN_BLOCKSIZE..=XFS_MAX_BLOCKSIZE).contains(&bs)
            || bs.trailing_zeros() != inner.blocklog as u32
        {
            return Err(Error::new(ErrorKind::Corrupted, "Invalid block size"));
        }

        let inode_size = inner.inodesize as u32;
        if !inode_size.is_power_of_two()
            || inode_size.trailing_zeros() != inner.inodelog as u32
            || (inode_size as usize) < XFS_DINODE_CORE_SIZE_V3
            || inode_size > bs
        {
            return Err(Error::new(ErrorKind::Corrupted, "Invalid inode size"));
        }

        if inner.inodelog as u32 + inner.inopblog as u32 != inner.blocklog as u32 {
            return Err(Error::new(ErrorKind::Corrupted, "Invalid inodes per block"));
        }

        if inner.agblocks == 0
            || inner.agblklog > 31
            || (inner.agblocks as u64) > (1u64 << inner.agblklog)
        {
            return Err(Error::new(ErrorKind::Corrupted, "Invalid AG geometry"));
        }

        // 目录块不超过 64KiB
        if inner.blocklog as u32 + inner.dirblklog as u32 > 16 {
            return Err(Error::new(ErrorKind::Corrupted, "Invalid directory block size"));
        }

        let version = inner.versionnum & XFS_SB_VERSION_NUMBITS;
        if !(4..=5).contains(&version) {
            return Err(Error::new(ErrorKind::Unsupported, "Unsupported superblock version"));
        }

        debug!(
            "superblock: version={} blocksize={} dirblklog={} agblocks={} inodesize={}",
            version, bs, inner.dirblklog, inner.agblocks, inner.inodesize
        );

        Ok(Self { inner })
    }

    /// 获取内部 superblock 结构的引用
    pub fn inner(&self) -> &xfs_dsb {
        &self.inner
    }

    /// superblock 版本（4 或 5）
    pub fn version(&self) -> u16 {
        self.inner.versionnum & XFS_SB_VERSION_NUMBITS
    }

    pub fn is_v5(&self) -> bool {
        self.version() == 5
    }

    pub fn version_flags(&self) -> VersionFlags {
        VersionFlags::from_bits_truncate(self.inner.versionnum)
    }

    pub fn features2(&self) -> Features2 {
        Features2::from_bits_truncate(self.inner.features2)
    }

    pub fn incompat_features(&self) -> IncompatFeatures {
        if self.is_v5() {
            IncompatFeatures::from_bits_truncate(self.inner.features_incompat)
        } else {
            IncompatFeatures::empty()
        }
    }

    /// 目录项是否带文件类型字节
    pub fn has_ftype(&self) -> bool {
        if self.is_v5() {
            self.incompat_features().contains(IncompatFeatures::FTYPE)
        } else {
            self.version_flags().contains(VersionFlags::MOREBITS)
                && self.features2().contains(Features2::FTYPE)
        }
    }

    /// 获取文件系统块大小
    pub fn block_size(&self) -> u32 {
        self.inner.blocksize
    }

    pub fn block_log(&self) -> u8 {
        self.inner.blocklog
    }

    /// 目录块大小（字节）
    pub fn dir_block_size(&self) -> u32 {
        self.inner.blocksize << self.inner.dirblklog
    }

    /// 目录块大小的 log2
    pub fn dir_block_log(&self) -> u32 {
        self.inner.blocklog as u32 + self.inner.dirblklog as u32
    }

    /// 每个目录块包含的文件系统块数
    pub fn fsbs_per_dir_block(&self) -> u64 {
        1u64 << self.inner.dirblklog
    }

    pub fn inode_size(&self) -> u16 {
        self.inner.inodesize
    }

    pub fn inode_log(&self) -> u8 {
        self.inner.inodelog
    }

    pub fn inopb_log(&self) -> u8 {
        self.inner.inopblog
    }

    pub fn ag_blocks(&self) -> u32 {
        self.inner.agblocks
    }

    pub fn ag_block_log(&self) -> u8 {
        self.inner.agblklog
    }

    pub fn ag_count(&self) -> u32 {
        self.inner.agcount
    }

    pub fn root_ino(&self) -> u64 {
        self.inner.rootino
    }

    /// 元数据块中记录的 UUID（设置 META_UUID 时使用 meta_uuid）
    pub fn metadata_uuid(&self) -> &[u8; 16] {
        if self.incompat_features().contains(IncompatFeatures::META_UUID) {
            &self.inner.meta_uuid
        } else {
            &self.inner.uuid
        }
    }

    /// 目录中叶子空间的起始逻辑块号（文件系统块单位）
    pub fn leaf_start_fsb(&self) -> u64 {
        XFS_DIR2_LEAF_OFFSET >> self.inner.blocklog
    }

    /// 目录中空闲索引空间的起始逻辑块号
    pub fn free_start_fsb(&self) -> u64 {
        XFS_DIR2_FREE_OFFSET >> self.inner.blocklog
    }
}
