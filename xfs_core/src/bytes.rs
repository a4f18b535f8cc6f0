//! 带边界检查的大端字段读取
//!
//! 所有磁盘结构都从 `&[u8]` 中解析，每次访问前先检查范围，
//! 越界视为磁盘数据损坏。

use byteorder::{BigEndian, ByteOrder};
use crate::error::{Error, ErrorKind, Result};

/// 取 `data[offset..offset + len]`
#[inline]
pub fn slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let end = offset
        .checked_add(len)
        .ok_or(Error::new(ErrorKind::Corrupted, "offset overflow"))?;
    data.get(offset..end)
        .ok_or(Error::new(ErrorKind::Corrupted, "field out of bounds"))
}

#[inline]
pub fn u8_at(data: &[u8], offset: usize) -> Result<u8> {
    data.get(offset)
        .copied()
        .ok_or(Error::new(ErrorKind::Corrupted, "field out of bounds"))
}

#[inline]
pub fn be_u16(data: &[u8], offset: usize) -> Result<u16> {
    Ok(BigEndian::read_u16(slice(data, offset, 2)?))
}

#[inline]
pub fn be_u32(data: &[u8], offset: usize) -> Result<u32> {
    Ok(BigEndian::read_u32(slice(data, offset, 4)?))
}

#[inline]
pub fn be_u64(data: &[u8], offset: usize) -> Result<u64> {
    Ok(BigEndian::read_u64(slice(data, offset, 8)?))
}

/// 读取定长字节数组（如 UUID）
#[inline]
pub fn fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N]> {
    let bytes = slice(data, offset, N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

/// 按 8 字节对齐向上取整
#[inline]
pub const fn round_up_8(len: usize) -> usize {
    (len + 7) & !7
}
