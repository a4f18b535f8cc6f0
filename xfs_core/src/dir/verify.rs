//! 目录元数据块头部校验
//!
//! V4 只检查魔数；V5 还要检查 CRC32C、块号、UUID 和属主。

use super::{
    buffer::DirBlock,
    header::{DaBlkInfo, DataHeader, HeaderVersion},
    DirContext,
};
use crate::{block::BlockDevice, checksum, error::Result};
use log::error;

/// 可校验的元数据头部
pub trait MetaHeader {
    fn version(&self) -> HeaderVersion;
    fn magic(&self) -> u32;
    /// 校验和字段在块内的偏移
    fn crc_offset(&self) -> usize;
    fn blkno(&self) -> Result<u64>;
    fn owner(&self) -> Result<u64>;
    fn uuid(&self) -> Result<[u8; 16]>;
}

impl MetaHeader for DataHeader {
    fn version(&self) -> HeaderVersion {
        DataHeader::version(self)
    }

    fn magic(&self) -> u32 {
        DataHeader::magic(self)
    }

    fn crc_offset(&self) -> usize {
        DataHeader::crc_offset()
    }

    fn blkno(&self) -> Result<u64> {
        DataHeader::blkno(self)
    }

    fn owner(&self) -> Result<u64> {
        DataHeader::owner(self)
    }

    fn uuid(&self) -> Result<[u8; 16]> {
        DataHeader::uuid(self)
    }
}

impl MetaHeader for DaBlkInfo {
    fn version(&self) -> HeaderVersion {
        DaBlkInfo::version(self)
    }

    fn magic(&self) -> u32 {
        DaBlkInfo::magic(self) as u32
    }

    fn crc_offset(&self) -> usize {
        DaBlkInfo::CRC_OFFSET
    }

    fn blkno(&self) -> Result<u64> {
        DaBlkInfo::blkno(self)
    }

    fn owner(&self) -> Result<u64> {
        DaBlkInfo::owner(self)
    }

    fn uuid(&self) -> Result<[u8; 16]> {
        DaBlkInfo::uuid(self)
    }
}

/// 校验头部与所在块
///
/// # 参数
///
/// * `header` - 已解析的头部
/// * `expected_magic` - 该用途/版本唯一合法的魔数
/// * `block` - 头部所在的完整目录块
/// * `ctx` - 目录会话（提供 inode 号、卷 UUID、地址转换）
pub fn verify_header<H: MetaHeader, D: BlockDevice>(
    header: &H,
    expected_magic: u32,
    block: &DirBlock,
    ctx: DirContext<'_, D>,
) -> bool {
    if header.magic() != expected_magic {
        error!(
            "verify_header: bad magic {:#x}, expected {:#x}",
            header.magic(),
            expected_magic
        );
        return false;
    }

    if header.version() == HeaderVersion::V4 {
        return true;
    }

    if !checksum::verify_cksum(block.data(), header.crc_offset()) {
        error!("verify_header: directory block {} is corrupted", block.fsbno());
        return false;
    }

    let expected_blkno = match ctx.volume().fsb_to_daddr(block.fsbno()) {
        Ok(daddr) => daddr,
        Err(_) => return false,
    };
    if header.blkno().ok() != Some(expected_blkno) {
        error!("verify_header: wrong block number, expected {}", expected_blkno);
        return false;
    }

    if header.uuid().ok().as_ref() != Some(ctx.superblock().metadata_uuid()) {
        error!("verify_header: UUID is incorrect");
        return false;
    }

    if header.owner().ok() != Some(ctx.inode().ino()) {
        error!("verify_header: wrong data owner");
        return false;
    }

    true
}
