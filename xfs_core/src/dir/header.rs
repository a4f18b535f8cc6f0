//! 目录块版本化头部
//!
//! 同一种目录块在 V4 与 V5 文件系统上有两种磁盘布局。
//! 头部在构造时一次性从缓冲区复制出来并转换为主机字节序，
//! 之后的访问器不再做字节序转换。
//!
//! V4 布局没有块号、LSN、属主和 UUID，这些访问器对 V4 返回
//! `ErrorKind::Unsupported`，而不是 0。

use crate::{
    bytes::{be_u16, be_u32, be_u64, fixed},
    consts::*,
    error::{Error, ErrorKind, Result},
};

/// 头部版本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderVersion {
    V4,
    V5,
}

impl HeaderVersion {
    /// 按 inode 版本选择：1、2 为 V4，其余为 V5
    pub fn from_inode_version(version: u8) -> Self {
        if version == 1 || version == 2 {
            HeaderVersion::V4
        } else {
            HeaderVersion::V5
        }
    }
}

/// 数据块头部的用途
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirPurpose {
    /// 单块目录（数据与哈希索引在同一块）
    Block,
    /// 多块目录中的普通数据块
    Data,
}

fn unsupported() -> Error {
    Error::new(ErrorKind::Unsupported, "field not present in V4 header")
}

/// 数据块中记录的最大空闲区域
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreeRegion {
    pub offset: u16,
    pub length: u16,
}

/// 最大空闲区域表长度
pub const XFS_DIR2_DATA_FD_COUNT: usize = 3;

fn parse_best_free(buf: &[u8], base: usize) -> Result<[FreeRegion; XFS_DIR2_DATA_FD_COUNT]> {
    let mut best = [FreeRegion::default(); XFS_DIR2_DATA_FD_COUNT];
    for (i, region) in best.iter_mut().enumerate() {
        region.offset = be_u16(buf, base + i * 4)?;
        region.length = be_u16(buf, base + i * 4 + 2)?;
    }
    Ok(best)
}

/// V4 数据块头部：magic + bestfree[3]，共 16 字节
#[derive(Debug, Clone)]
pub struct DataHeaderV4 {
    magic: u32,
    best_free: [FreeRegion; XFS_DIR2_DATA_FD_COUNT],
}

impl DataHeaderV4 {
    /// 磁盘大小
    pub const SIZE: usize = 16;

    fn parse(buf: &[u8]) -> Result<Self> {
        Ok(Self {
            magic: be_u32(buf, 0)?,
            best_free: parse_best_free(buf, 4)?,
        })
    }
}

/// V5 数据块头部，共 64 字节
///
/// ```text
/// 0 magic | 4 crc | 8 blkno | 16 lsn | 24 uuid | 40 owner | 48 bestfree[3] | 60 pad
/// ```
#[derive(Debug, Clone)]
pub struct DataHeaderV5 {
    magic: u32,
    crc: u32,
    blkno: u64,
    lsn: u64,
    uuid: [u8; 16],
    owner: u64,
    best_free: [FreeRegion; XFS_DIR2_DATA_FD_COUNT],
}

impl DataHeaderV5 {
    pub const SIZE: usize = 64;
    pub const CRC_OFFSET: usize = 4;

    fn parse(buf: &[u8]) -> Result<Self> {
        Ok(Self {
            magic: be_u32(buf, 0)?,
            crc: u32::from_le_bytes(fixed::<4>(buf, Self::CRC_OFFSET)?),
            blkno: be_u64(buf, 8)?,
            lsn: be_u64(buf, 16)?,
            uuid: fixed::<16>(buf, 24)?,
            owner: be_u64(buf, 40)?,
            best_free: parse_best_free(buf, 48)?,
        })
    }
}

/// 数据块头部
#[derive(Debug, Clone)]
pub enum DataHeader {
    V4(DataHeaderV4),
    V5(DataHeaderV5),
}

impl DataHeader {
    /// 按版本解析块开头的固定头部
    pub fn create(version: HeaderVersion, buf: &[u8]) -> Result<Self> {
        match version {
            HeaderVersion::V4 => DataHeaderV4::parse(buf).map(DataHeader::V4),
            HeaderVersion::V5 => DataHeaderV5::parse(buf).map(DataHeader::V5),
        }
    }

    /// 用途和版本对应的唯一合法魔数
    pub fn expected_magic(purpose: DirPurpose, version: HeaderVersion) -> u32 {
        match (purpose, version) {
            (DirPurpose::Block, HeaderVersion::V4) => XFS_DIR2_BLOCK_MAGIC,
            (DirPurpose::Block, HeaderVersion::V5) => XFS_DIR3_BLOCK_MAGIC,
            (DirPurpose::Data, HeaderVersion::V4) => XFS_DIR2_DATA_MAGIC,
            (DirPurpose::Data, HeaderVersion::V5) => XFS_DIR3_DATA_MAGIC,
        }
    }

    /// 磁盘上头部的实际大小，第一个目录项从这里开始
    pub fn size(version: HeaderVersion) -> usize {
        match version {
            HeaderVersion::V4 => DataHeaderV4::SIZE,
            HeaderVersion::V5 => DataHeaderV5::SIZE,
        }
    }

    /// V5 布局中校验和字段的偏移
    pub const fn crc_offset() -> usize {
        DataHeaderV5::CRC_OFFSET
    }

    pub fn version(&self) -> HeaderVersion {
        match self {
            DataHeader::V4(_) => HeaderVersion::V4,
            DataHeader::V5(_) => HeaderVersion::V5,
        }
    }

    pub fn magic(&self) -> u32 {
        match self {
            DataHeader::V4(h) => h.magic,
            DataHeader::V5(h) => h.magic,
        }
    }

    pub fn best_free(&self) -> &[FreeRegion; XFS_DIR2_DATA_FD_COUNT] {
        match self {
            DataHeader::V4(h) => &h.best_free,
            DataHeader::V5(h) => &h.best_free,
        }
    }

    /// 磁盘存放的校验和（V5）
    pub fn crc(&self) -> Result<u32> {
        match self {
            DataHeader::V4(_) => Err(unsupported()),
            DataHeader::V5(h) => Ok(h.crc),
        }
    }

    /// 块号（512 字节扇区单位）
    pub fn blkno(&self) -> Result<u64> {
        match self {
            DataHeader::V4(_) => Err(unsupported()),
            DataHeader::V5(h) => Ok(h.blkno),
        }
    }

    pub fn lsn(&self) -> Result<u64> {
        match self {
            DataHeader::V4(_) => Err(unsupported()),
            DataHeader::V5(h) => Ok(h.lsn),
        }
    }

    /// 属主 inode 号
    pub fn owner(&self) -> Result<u64> {
        match self {
            DataHeader::V4(_) => Err(unsupported()),
            DataHeader::V5(h) => Ok(h.owner),
        }
    }

    pub fn uuid(&self) -> Result<[u8; 16]> {
        match self {
            DataHeader::V4(_) => Err(unsupported()),
            DataHeader::V5(h) => Ok(h.uuid),
        }
    }
}

/// 叶子块和 da 节点块共用的块信息（`xfs_da_blkinfo` / `xfs_da3_blkinfo`）
///
/// ```text
/// V4: 0 forw | 4 back | 8 magic(16) | 10 pad
/// V5: ... | 12 crc | 16 blkno | 24 lsn | 32 uuid | 48 owner
/// ```
#[derive(Debug, Clone)]
pub enum DaBlkInfo {
    V4 {
        forw: u32,
        back: u32,
        magic: u16,
    },
    V5 {
        forw: u32,
        back: u32,
        magic: u16,
        crc: u32,
        blkno: u64,
        lsn: u64,
        uuid: [u8; 16],
        owner: u64,
    },
}

impl DaBlkInfo {
    pub const V4_SIZE: usize = 12;
    pub const V5_SIZE: usize = 56;
    pub const CRC_OFFSET: usize = 12;

    pub fn create(version: HeaderVersion, buf: &[u8]) -> Result<Self> {
        let forw = be_u32(buf, 0)?;
        let back = be_u32(buf, 4)?;
        let magic = be_u16(buf, 8)?;
        Ok(match version {
            HeaderVersion::V4 => DaBlkInfo::V4 { forw, back, magic },
            HeaderVersion::V5 => DaBlkInfo::V5 {
                forw,
                back,
                magic,
                crc: u32::from_le_bytes(fixed::<4>(buf, Self::CRC_OFFSET)?),
                blkno: be_u64(buf, 16)?,
                lsn: be_u64(buf, 24)?,
                uuid: fixed::<16>(buf, 32)?,
                owner: be_u64(buf, 48)?,
            },
        })
    }

    pub fn version(&self) -> HeaderVersion {
        match self {
            DaBlkInfo::V4 { .. } => HeaderVersion::V4,
            DaBlkInfo::V5 { .. } => HeaderVersion::V5,
        }
    }

    /// 后继兄弟块（目录内逻辑块号，0 表示没有）
    pub fn forw(&self) -> u32 {
        match self {
            DaBlkInfo::V4 { forw, .. } | DaBlkInfo::V5 { forw, .. } => *forw,
        }
    }

    pub fn back(&self) -> u32 {
        match self {
            DaBlkInfo::V4 { back, .. } | DaBlkInfo::V5 { back, .. } => *back,
        }
    }

    pub fn magic(&self) -> u16 {
        match self {
            DaBlkInfo::V4 { magic, .. } | DaBlkInfo::V5 { magic, .. } => *magic,
        }
    }

    pub fn blkno(&self) -> Result<u64> {
        match self {
            DaBlkInfo::V4 { .. } => Err(unsupported()),
            DaBlkInfo::V5 { blkno, .. } => Ok(*blkno),
        }
    }

    pub fn lsn(&self) -> Result<u64> {
        match self {
            DaBlkInfo::V4 { .. } => Err(unsupported()),
            DaBlkInfo::V5 { lsn, .. } => Ok(*lsn),
        }
    }

    pub fn owner(&self) -> Result<u64> {
        match self {
            DaBlkInfo::V4 { .. } => Err(unsupported()),
            DaBlkInfo::V5 { owner, .. } => Ok(*owner),
        }
    }

    pub fn uuid(&self) -> Result<[u8; 16]> {
        match self {
            DaBlkInfo::V4 { .. } => Err(unsupported()),
            DaBlkInfo::V5 { uuid, .. } => Ok(*uuid),
        }
    }

    pub fn crc(&self) -> Result<u32> {
        match self {
            DaBlkInfo::V4 { .. } => Err(unsupported()),
            DaBlkInfo::V5 { crc, .. } => Ok(*crc),
        }
    }
}

/// 叶子块种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    /// 叶子格式目录唯一的叶子块（带 bests 尾部）
    Leaf1,
    /// 节点格式目录中的叶子块
    LeafN,
}

/// 叶子块头部：blkinfo + count + stale
#[derive(Debug, Clone)]
pub struct LeafHeader {
    pub info: DaBlkInfo,
    pub count: u16,
    pub stale: u16,
}

impl LeafHeader {
    pub fn create(version: HeaderVersion, buf: &[u8]) -> Result<Self> {
        let base = Self::info_size(version);
        Ok(Self {
            info: DaBlkInfo::create(version, buf)?,
            count: be_u16(buf, base)?,
            stale: be_u16(buf, base + 2)?,
        })
    }

    fn info_size(version: HeaderVersion) -> usize {
        match version {
            HeaderVersion::V4 => DaBlkInfo::V4_SIZE,
            HeaderVersion::V5 => DaBlkInfo::V5_SIZE,
        }
    }

    /// 头部大小（V4 16 字节，V5 带 4 字节填充共 64 字节）
    pub fn size(version: HeaderVersion) -> usize {
        match version {
            HeaderVersion::V4 => 16,
            HeaderVersion::V5 => 64,
        }
    }

    pub fn expected_magic(kind: LeafKind, version: HeaderVersion) -> u16 {
        match (kind, version) {
            (LeafKind::Leaf1, HeaderVersion::V4) => XFS_DIR2_LEAF1_MAGIC,
            (LeafKind::Leaf1, HeaderVersion::V5) => XFS_DIR3_LEAF1_MAGIC,
            (LeafKind::LeafN, HeaderVersion::V4) => XFS_DIR2_LEAFN_MAGIC,
            (LeafKind::LeafN, HeaderVersion::V5) => XFS_DIR3_LEAFN_MAGIC,
        }
    }
}

/// da 节点头部：blkinfo + count + level
#[derive(Debug, Clone)]
pub struct NodeHeader {
    pub info: DaBlkInfo,
    pub count: u16,
    pub level: u16,
}

impl NodeHeader {
    pub fn create(version: HeaderVersion, buf: &[u8]) -> Result<Self> {
        let base = LeafHeader::info_size(version);
        Ok(Self {
            info: DaBlkInfo::create(version, buf)?,
            count: be_u16(buf, base)?,
            level: be_u16(buf, base + 2)?,
        })
    }

    pub fn size(version: HeaderVersion) -> usize {
        LeafHeader::size(version)
    }

    pub fn expected_magic(version: HeaderVersion) -> u16 {
        match version {
            HeaderVersion::V4 => XFS_DA_NODE_MAGIC,
            HeaderVersion::V5 => XFS_DA3_NODE_MAGIC,
        }
    }
}
