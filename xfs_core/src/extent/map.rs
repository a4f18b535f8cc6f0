//! Extent 记录解码
//!
//! 磁盘上的 extent 是两个大端 64 位字组成的 128 位记录：
//!
//! ```text
//! word0: [63] state | [62..9] startoff | [8..0] startblock 高 9 位
//! word1: [63..21] startblock 低 43 位 | [20..0] blockcount
//! ```

use byteorder::{BigEndian, ByteOrder};
use crate::{
    bytes::slice,
    consts::XFS_EXTENT_SIZE,
    error::{Error, ErrorKind, Result},
};
use alloc::vec::Vec;
use log::trace;

#[inline]
const fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// extent 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentState {
    /// 普通已写入 extent
    Normal,
    /// 预分配未写入，不能作为目录数据
    Unwritten,
}

/// 解码后的 extent 记录
///
/// 对应 C 定义: struct xfs_bmbt_irec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentMapEntry {
    pub state: ExtentState,
    /// 文件内逻辑块号（文件系统块单位），有效位宽 54
    pub startoff: u64,
    /// 物理块号（文件系统块号），有效位宽 52
    pub startblock: u64,
    /// 连续块数，有效位宽 21
    pub blockcount: u32,
}

impl ExtentMapEntry {
    /// 解码一个 16 字节的磁盘记录，任何位模式都会得到一个值
    pub fn decode(rec: &[u8; XFS_EXTENT_SIZE]) -> Self {
        let first = BigEndian::read_u64(&rec[0..8]);
        let second = BigEndian::read_u64(&rec[8..16]);

        let entry = Self {
            state: if first >> 63 == 0 {
                ExtentState::Normal
            } else {
                ExtentState::Unwritten
            },
            startoff: (first & mask(63)) >> 9,
            startblock: ((first & mask(9)) << 43) | (second >> 21),
            blockcount: (second & mask(21)) as u32,
        };
        trace!(
            "extent: startoff={} startblock={} blockcount={} state={:?}",
            entry.startoff, entry.startblock, entry.blockcount, entry.state
        );
        entry
    }

    /// 从切片的 `offset` 处解码，越界视为损坏
    pub fn decode_at(data: &[u8], offset: usize) -> Result<Self> {
        let mut rec = [0u8; XFS_EXTENT_SIZE];
        rec.copy_from_slice(slice(data, offset, XFS_EXTENT_SIZE)?);
        Ok(Self::decode(&rec))
    }

    /// 编码为磁盘格式（超出位宽的高位被截断）
    pub fn encode(&self) -> [u8; XFS_EXTENT_SIZE] {
        let state = match self.state {
            ExtentState::Normal => 0u64,
            ExtentState::Unwritten => 1u64,
        };
        let first = (state << 63)
            | ((self.startoff & mask(54)) << 9)
            | ((self.startblock >> 43) & mask(9));
        let second = ((self.startblock & mask(43)) << 21) | (self.blockcount as u64 & mask(21));

        let mut rec = [0u8; XFS_EXTENT_SIZE];
        BigEndian::write_u64(&mut rec[0..8], first);
        BigEndian::write_u64(&mut rec[8..16], second);
        rec
    }

    /// 逻辑结束块（不含）
    pub fn end_off(&self) -> u64 {
        self.startoff + self.blockcount as u64
    }

    /// 逻辑块是否落在本 extent 内
    pub fn contains(&self, logical: u64) -> bool {
        logical >= self.startoff && logical < self.end_off()
    }
}

/// 只读取记录的逻辑起点，不做完整解码
pub fn startoff_of(data: &[u8]) -> Result<u64> {
    let first = crate::bytes::be_u64(data, 0)?;
    Ok((first & mask(63)) >> 9)
}

/// 数据 fork 的全部 extent，按逻辑块号升序
#[derive(Debug, Clone, Default)]
pub struct ExtentList {
    extents: Vec<ExtentMapEntry>,
}

impl ExtentList {
    /// 解析 extent 格式数据 fork 中的 `count` 条记录
    pub fn from_data_fork(fork: &[u8], count: u32) -> Result<Self> {
        let count = count as usize;
        if count
            .checked_mul(XFS_EXTENT_SIZE)
            .map_or(true, |len| len > fork.len())
        {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "Extent count exceeds data fork",
            ));
        }

        let mut extents = Vec::new();
        extents.try_reserve_exact(count)
            .map_err(|_| Error::new(ErrorKind::NoMemory, "extent list allocation failed"))?;
        for i in 0..count {
            extents.push(ExtentMapEntry::decode_at(fork, i * XFS_EXTENT_SIZE)?);
        }
        Self::from_entries(extents)
    }

    /// 校验记录有序且互不重叠
    pub fn from_entries(extents: Vec<ExtentMapEntry>) -> Result<Self> {
        for pair in extents.windows(2) {
            if pair[1].startoff < pair[0].end_off() {
                return Err(Error::new(
                    ErrorKind::Corrupted,
                    "Extents out of order or overlapping",
                ));
            }
        }
        Ok(Self { extents })
    }

    pub fn len(&self) -> usize {
        self.extents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, ExtentMapEntry> {
        self.extents.iter()
    }

    /// 查找包含逻辑块 `logical` 的 extent
    pub fn find(&self, logical: u64) -> Option<&ExtentMapEntry> {
        let idx = self.extents.partition_point(|e| e.startoff <= logical);
        let ext = self.extents.get(idx.checked_sub(1)?)?;
        ext.contains(logical).then_some(ext)
    }

    /// 逻辑块号映射到物理块号
    pub fn map(&self, logical: u64) -> Option<u64> {
        self.find(logical)
            .map(|ext| ext.startblock + (logical - ext.startoff))
    }

    /// 逻辑块号不小于 `logical` 的第一个已映射块
    pub fn next_mapped(&self, logical: u64) -> Option<u64> {
        if self.find(logical).is_some() {
            return Some(logical);
        }
        let idx = self.extents.partition_point(|e| e.startoff <= logical);
        self.extents.get(idx).map(|e| e.startoff)
    }
}
