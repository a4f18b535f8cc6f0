//! 目录块内的记录
//!
//! 数据区从头部之后开始，由 `DataEntry` 和 `UnusedEntry` 交替填充；
//! 单块目录的块尾是 `BlockTail`，其前是按哈希升序排列的 `LeafEntry` 数组。

use crate::{
    bytes::{be_u16, be_u32, be_u64, round_up_8, slice, u8_at},
    consts::*,
    error::{Error, ErrorKind, Result},
};
use log::trace;

/// 单块目录块尾
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTail {
    /// 叶子项总数（含已删除的）
    pub count: u32,
    /// 已删除（address == 0）的叶子项数
    pub stale: u32,
}

impl BlockTail {
    pub const SIZE: usize = 8;

    /// 从块末尾读取
    pub fn read(block: &[u8]) -> Result<Self> {
        let off = block
            .len()
            .checked_sub(Self::SIZE)
            .ok_or(Error::new(ErrorKind::Corrupted, "block too small for tail"))?;
        Ok(Self {
            count: be_u32(block, off)?,
            stale: be_u32(block, off + 4)?,
        })
    }

    /// 块尾的字节偏移
    pub fn offset(block_len: usize) -> usize {
        block_len - Self::SIZE
    }
}

/// 哈希索引项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafEntry {
    pub hashval: u32,
    /// 数据项地址（字节地址 / 8），0 表示空槽
    pub address: u32,
}

impl LeafEntry {
    pub const SIZE: usize = 8;

    pub fn read_at(buf: &[u8], offset: usize) -> Result<Self> {
        Ok(Self {
            hashval: be_u32(buf, offset)?,
            address: be_u32(buf, offset + 4)?,
        })
    }
}

/// 目录项整体大小：inumber(8) + namelen(1) + name + [ftype(1)] + tag(2)，8 字节对齐
pub fn entry_size(namelen: usize, has_ftype: bool) -> usize {
    let mut size = 8 + 1 + namelen + 2;
    if has_ftype {
        size += 1;
    }
    round_up_8(size)
}

/// 一个有效目录项（借用块缓冲区中的名字）
#[derive(Debug, Clone, Copy)]
pub struct DataEntry<'b> {
    pub inumber: u64,
    pub name: &'b [u8],
    pub filetype: Option<u8>,
    pub tag: u16,
    /// 本项在块内的偏移
    pub offset: usize,
    /// 本项占用的字节数
    pub size: usize,
}

/// 空闲/已删除槽
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnusedEntry {
    pub length: u16,
    pub tag: u16,
    pub offset: usize,
}

/// 数据区中的一个槽
#[derive(Debug, Clone, Copy)]
pub enum DirSlot<'b> {
    Data(DataEntry<'b>),
    Unused(UnusedEntry),
}

impl DirSlot<'_> {
    /// 下一个槽的偏移
    pub fn next_offset(&self) -> usize {
        match self {
            DirSlot::Data(e) => e.offset + e.size,
            DirSlot::Unused(u) => u.offset + u.length as usize,
        }
    }
}

/// 读取 `offset` 处的槽，槽必须完整落在 `[offset, region_end)` 内
///
/// 槽的 tag 必须等于其偏移；空闲槽长度必须是 8 的非零倍数。
pub fn read_slot(
    block: &[u8],
    offset: usize,
    region_end: usize,
    has_ftype: bool,
) -> Result<DirSlot<'_>> {
    if offset % XFS_DIR2_DATA_ALIGN != 0 || offset >= region_end || region_end > block.len() {
        return Err(Error::new(ErrorKind::Corrupted, "directory entry misplaced"));
    }

    if be_u16(block, offset)? == XFS_DIR2_DATA_FREE_TAG {
        let length = be_u16(block, offset + 2)?;
        let len = length as usize;
        if len == 0 || len % XFS_DIR2_DATA_ALIGN != 0 || offset + len > region_end {
            return Err(Error::new(ErrorKind::Corrupted, "bad unused entry length"));
        }
        let tag = be_u16(block, offset + len - 2)?;
        if tag as usize != offset {
            return Err(Error::new(ErrorKind::Corrupted, "unused entry tag mismatch"));
        }
        trace!("read_slot: unused entry at {} len {}", offset, len);
        return Ok(DirSlot::Unused(UnusedEntry { length, tag, offset }));
    }

    let inumber = be_u64(block, offset)?;
    let namelen = u8_at(block, offset + 8)? as usize;
    if namelen == 0 {
        return Err(Error::new(ErrorKind::Corrupted, "zero length name"));
    }
    let name = slice(block, offset + 9, namelen)?;
    let filetype = if has_ftype {
        Some(u8_at(block, offset + 9 + namelen)?)
    } else {
        None
    };

    let size = entry_size(namelen, has_ftype);
    if offset + size > region_end {
        return Err(Error::new(ErrorKind::Corrupted, "directory entry overruns region"));
    }
    let tag = be_u16(block, offset + size - 2)?;
    if tag as usize != offset {
        return Err(Error::new(ErrorKind::Corrupted, "directory entry tag mismatch"));
    }

    Ok(DirSlot::Data(DataEntry {
        inumber,
        name,
        filetype,
        tag,
        offset,
        size,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn put_entry(buf: &mut [u8], off: usize, ino: u64, name: &[u8], ftype: Option<u8>) -> usize {
        let size = entry_size(name.len(), ftype.is_some());
        buf[off..off + 8].copy_from_slice(&ino.to_be_bytes());
        buf[off + 8] = name.len() as u8;
        buf[off + 9..off + 9 + name.len()].copy_from_slice(name);
        if let Some(t) = ftype {
            buf[off + 9 + name.len()] = t;
        }
        buf[off + size - 2..off + size].copy_from_slice(&(off as u16).to_be_bytes());
        size
    }

    #[test]
    fn test_entry_size_alignment() {
        for namelen in 1..=255 {
            for ftype in [false, true] {
                let size = entry_size(namelen, ftype);
                assert_eq!(size % 8, 0);
                assert!(size >= namelen + 11 + ftype as usize);
            }
        }
        assert_eq!(entry_size(1, false), 16);
        assert_eq!(entry_size(5, false), 16);
        assert_eq!(entry_size(5, true), 16);
        assert_eq!(entry_size(6, true), 24);
    }

    #[test]
    fn test_read_data_and_unused() {
        let mut buf = vec![0u8; 128];
        let size = put_entry(&mut buf, 16, 42, b"hello", Some(1));
        let free_off = 16 + size;
        buf[free_off..free_off + 2].copy_from_slice(&XFS_DIR2_DATA_FREE_TAG.to_be_bytes());
        buf[free_off + 2..free_off + 4].copy_from_slice(&24u16.to_be_bytes());
        buf[free_off + 22..free_off + 24].copy_from_slice(&(free_off as u16).to_be_bytes());

        match read_slot(&buf, 16, 128, true).unwrap() {
            DirSlot::Data(e) => {
                assert_eq!(e.inumber, 42);
                assert_eq!(e.name, b"hello");
                assert_eq!(e.filetype, Some(1));
                assert_eq!(e.size, 16);
            }
            DirSlot::Unused(_) => panic!("expected data entry"),
        }
        match read_slot(&buf, free_off, 128, true).unwrap() {
            DirSlot::Unused(u) => {
                assert_eq!(u.length, 24);
                assert_eq!(DirSlot::Unused(u).next_offset(), free_off + 24);
            }
            DirSlot::Data(_) => panic!("expected unused entry"),
        }
    }

    #[test]
    fn test_rejects_bad_slots() {
        let mut buf = vec![0u8; 64];
        put_entry(&mut buf, 16, 42, b"x", None);
        // 区域太小
        assert!(read_slot(&buf, 16, 24, false).is_err());
        // 未对齐
        assert!(read_slot(&buf, 17, 64, false).is_err());
        // tag 错误
        buf[30] = 0x7f;
        assert!(read_slot(&buf, 16, 64, false).is_err());

        let mut buf = vec![0u8; 64];
        buf[16..18].copy_from_slice(&XFS_DIR2_DATA_FREE_TAG.to_be_bytes());
        // 长度为 0
        assert!(read_slot(&buf, 16, 64, false).is_err());
        // 超出区域
        buf[18..20].copy_from_slice(&64u16.to_be_bytes());
        assert!(read_slot(&buf, 16, 64, false).is_err());
    }

    #[test]
    fn test_block_tail() {
        let mut buf = vec![0u8; 64];
        buf[56..60].copy_from_slice(&3u32.to_be_bytes());
        buf[60..64].copy_from_slice(&1u32.to_be_bytes());
        assert_eq!(BlockTail::read(&buf).unwrap(), BlockTail { count: 3, stale: 1 });
        assert_eq!(BlockTail::offset(64), 56);
        assert!(BlockTail::read(&buf[..4]).is_err());
    }
}
