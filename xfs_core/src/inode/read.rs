//! Inode 读取和解析

use crate::{
    block::{BlockDev, BlockDevice},
    bytes::{be_u16, be_u32, be_u64, u8_at},
    checksum,
    consts::*,
    error::{Error, ErrorKind, Result},
    superblock::Superblock,
};
use alloc::vec::Vec;
use log::{debug, error};

/// 磁盘 inode 核心结构（只保留目录读取需要的字段）
///
/// 对应 C 定义: struct xfs_dinode
#[derive(Debug, Clone, Copy, Default)]
pub struct xfs_dinode_core {
    pub magic: u16,                  // 0: "IN"
    pub mode: u16,                   // 2: 文件模式
    pub version: u8,                 // 4: inode 版本 1/2/3
    pub format: u8,                  // 5: 数据 fork 格式
    pub nlink: u32,                  // 16: 链接数（v2 以上）
    pub size: u64,                   // 56: 字节大小
    pub nblocks: u64,                // 64: 占用的文件系统块数
    pub nextents: u32,               // 76: 数据 fork extent 数
    pub anextents: u16,              // 80: 属性 fork extent 数
    pub forkoff: u8,                 // 82: 属性 fork 偏移（8 字节单位）
    pub aformat: u8,                 // 83: 属性 fork 格式
    pub ino: u64,                    // 152: inode 号（仅 v3）
}

impl xfs_dinode_core {
    /// 从 inode 原始字节解析
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let version = u8_at(buf, 4)?;
        Ok(Self {
            magic: be_u16(buf, 0)?,
            mode: be_u16(buf, 2)?,
            version,
            format: u8_at(buf, 5)?,
            nlink: if version >= 2 {
                be_u32(buf, 16)?
            } else {
                be_u16(buf, 6)? as u32
            },
            size: be_u64(buf, 56)?,
            nblocks: be_u64(buf, 64)?,
            nextents: be_u32(buf, 76)?,
            anextents: be_u16(buf, 80)?,
            forkoff: u8_at(buf, 82)?,
            aformat: u8_at(buf, 83)?,
            ino: if version >= 3 { be_u64(buf, 152)? } else { 0 },
        })
    }

    /// 核心结构大小，数据 fork 紧随其后
    pub fn core_size(&self) -> usize {
        if self.version >= 3 {
            XFS_DINODE_CORE_SIZE_V3
        } else {
            XFS_DINODE_CORE_SIZE_V2
        }
    }
}

/// 从块设备读取 inode
///
/// # 参数
///
/// * `bdev` - 块设备引用
/// * `sb` - superblock 引用
/// * `ino` - inode 编号
pub fn read_inode<D: BlockDevice>(
    bdev: &BlockDev<D>,
    sb: &Superblock,
    ino: u64,
) -> Result<Inode> {
    let byte = inode_byte_offset(sb, ino)?;
    let mut raw = Vec::new();
    raw.try_reserve_exact(sb.inode_size() as usize)
        .map_err(|_| Error::new(ErrorKind::NoMemory, "inode buffer allocation failed"))?;
    raw.resize(sb.inode_size() as usize, 0);

    bdev.read_exact_at(byte, &mut raw)?;
    Inode::from_raw(sb, ino, raw)
}

/// 计算 inode 在设备上的字节偏移
///
/// inode 号由 AG 号、AG 内块号、块内序号三段组成。
pub fn inode_byte_offset(sb: &Superblock, ino: u64) -> Result<u64> {
    let agino_log = sb.ag_block_log() as u32 + sb.inopb_log() as u32;
    if agino_log >= 64 {
        return Err(Error::new(ErrorKind::Corrupted, "Invalid inode geometry"));
    }
    let agno = ino >> agino_log;
    let agino = ino & ((1u64 << agino_log) - 1);
    let agbno = agino >> sb.inopb_log();
    let index = agino & ((1u64 << sb.inopb_log()) - 1);

    if agno >= sb.ag_count() as u64 || agbno >= sb.ag_blocks() as u64 {
        return Err(Error::new(ErrorKind::InvalidInput, "Inode number out of range"));
    }

    let block = agno * sb.ag_blocks() as u64 + agbno;
    Ok((block << sb.block_log()) + (index << sb.inode_log()))
}

/// Inode 包装器，提供目录引擎需要的元数据
pub struct Inode {
    ino: u64,
    core: xfs_dinode_core,
    raw: Vec<u8>,
}

impl Inode {
    /// 从原始字节构造（已从设备读取）
    pub fn from_raw(sb: &Superblock, ino: u64, raw: Vec<u8>) -> Result<Self> {
        let core = xfs_dinode_core::parse(&raw)?;

        if core.magic != XFS_DINODE_MAGIC {
            error!("inode {}: bad magic {:#x}", ino, core.magic);
            return Err(Error::new(ErrorKind::Corrupted, "Invalid inode magic"));
        }
        if !(1..=3).contains(&core.version) {
            return Err(Error::new(ErrorKind::Corrupted, "Invalid inode version"));
        }
        if (core.version == 3) != sb.is_v5() {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "Inode version does not match superblock",
            ));
        }
        if core.version == 3 {
            if !checksum::verify_cksum(&raw, XFS_DINODE_CRC_OFFSET) {
                error!("inode {}: checksum mismatch", ino);
                return Err(Error::new(ErrorKind::Corrupted, "Inode checksum mismatch"));
            }
            if core.ino != ino {
                return Err(Error::new(ErrorKind::Corrupted, "Inode number mismatch"));
            }
        }
        let fork_end = if core.forkoff == 0 {
            raw.len()
        } else {
            core.core_size() + core.forkoff as usize * 8
        };
        if fork_end > raw.len() || fork_end < core.core_size() {
            return Err(Error::new(ErrorKind::Corrupted, "Invalid inode fork offset"));
        }

        debug!(
            "inode {}: version={} format={} size={} nblocks={} nextents={}",
            ino, core.version, core.format, core.size, core.nblocks, core.nextents
        );

        Ok(Self { ino, core, raw })
    }

    /// 获取 inode 编号
    pub fn ino(&self) -> u64 {
        self.ino
    }

    /// 获取解析后的核心结构
    pub fn core(&self) -> &xfs_dinode_core {
        &self.core
    }

    /// inode 版本（1、2、3）
    pub fn version(&self) -> u8 {
        self.core.version
    }

    /// 数据 fork 格式
    pub fn format(&self) -> u8 {
        self.core.format
    }

    pub fn mode(&self) -> u16 {
        self.core.mode
    }

    pub fn is_dir(&self) -> bool {
        self.core.mode & S_IFMT == S_IFDIR
    }

    /// 字节大小
    pub fn size(&self) -> u64 {
        self.core.size
    }

    /// 占用的文件系统块数
    pub fn block_count(&self) -> u64 {
        self.core.nblocks
    }

    /// 数据 fork 的 extent 数
    pub fn data_extents_count(&self) -> u32 {
        self.core.nextents
    }

    pub fn core_inode_size(&self) -> usize {
        self.core.core_size()
    }

    /// 数据 fork（核心结构之后、属性 fork 之前的字节）
    pub fn data_fork(&self) -> &[u8] {
        let start = self.core.core_size();
        let end = if self.core.forkoff == 0 {
            self.raw.len()
        } else {
            start + self.core.forkoff as usize * 8
        };
        &self.raw[start..end]
    }
}
