//! 单块格式目录
//!
//! 整个目录只占一个目录块：
//!
//! ```text
//! +--------+---------------------------+------------------+------+
//! | header | data / unused entries ... | leaf[count]      | tail |
//! +--------+---------------------------+------------------+------+
//! ```
//!
//! 叶子数组按哈希值升序排列，`address` 指向数据区中的目录项。

use super::{
    buffer::DirBlock,
    copy_name, end_of_directory, entry_not_found,
    entry::{read_slot, BlockTail, DirSlot, LeafEntry},
    hash::{address_to_offset, da_hashname, hash_lower_bound},
    header::{DataHeader, DirPurpose},
    verify::verify_header,
    DirContext, DirCursor, DirOps,
};
use crate::{
    block::BlockDevice,
    error::{Error, ErrorKind, Result},
    extent::{startoff_of, ExtentMapEntry, ExtentState},
};
use log::{debug, error, trace};

/// 已校验的单块目录
///
/// 只能通过 `init` 构造，构造成功即代表块已读入且头部、块尾合法。
pub struct BlockDirectory {
    block: DirBlock,
    header: DataHeader,
    tail: BlockTail,
    /// 第一个目录项的偏移（头部之后）
    first_entry: usize,
    /// 叶子数组起始偏移，也是数据区的结束
    leaf_start: usize,
    dir_block_size: usize,
    has_ftype: bool,
    cursor: DirCursor,
}

impl BlockDirectory {
    /// 不读盘的格式预检
    ///
    /// inode 恰好占一个目录块、大小等于一个目录块、第一个 extent 从逻辑块 0 开始。
    pub fn is_block_type<D: BlockDevice>(ctx: DirContext<'_, D>) -> bool {
        let inode = ctx.inode();
        let sb = ctx.superblock();

        if inode.block_count() != sb.fsbs_per_dir_block() {
            return false;
        }
        if inode.size() != ctx.dir_block_size() as u64 {
            return false;
        }
        matches!(startoff_of(inode.data_fork()), Ok(0))
    }

    /// 读取并校验目录块
    ///
    /// # 错误
    ///
    /// * `Corrupted` - extent 不是一个完整的已写入目录块，或头部/块尾/bestfree 校验失败
    /// * `NoMemory` - 无法分配块缓冲区
    /// * `Io` - 设备读取失败
    pub fn init<D: BlockDevice>(ctx: DirContext<'_, D>) -> Result<Self> {
        let ext = ExtentMapEntry::decode_at(ctx.inode().data_fork(), 0)?;
        if ext.blockcount as u64 != ctx.superblock().fsbs_per_dir_block() {
            error!(
                "BlockDirectory::init: extent has {} blocks, expected one directory block",
                ext.blockcount
            );
            return Err(Error::new(ErrorKind::Corrupted, "block directory extent size"));
        }
        if ext.state != ExtentState::Normal {
            return Err(Error::new(ErrorKind::Corrupted, "unwritten directory extent"));
        }

        let block = DirBlock::load(ctx, ext.startblock)?;
        let version = ctx.header_version();
        let header = DataHeader::create(version, block.data())?;
        let magic = DataHeader::expected_magic(DirPurpose::Block, version);
        if !verify_header(&header, magic, &block, ctx) {
            return Err(Error::new(ErrorKind::Corrupted, "bad block directory header"));
        }

        let tail = BlockTail::read(block.data())?;
        if tail.stale > tail.count {
            return Err(Error::new(ErrorKind::Corrupted, "stale count exceeds leaf count"));
        }

        let first_entry = DataHeader::size(version);
        let leaf_start = (tail.count as usize)
            .checked_mul(LeafEntry::SIZE)
            .and_then(|len| BlockTail::offset(block.len()).checked_sub(len))
            .filter(|&start| start >= first_entry)
            .ok_or(Error::new(ErrorKind::Corrupted, "leaf array overlaps header"))?;

        // bestfree 记录的空闲区域必须落在数据区内
        for region in header.best_free().iter().filter(|r| r.length != 0) {
            let start = region.offset as usize;
            let end = start + region.length as usize;
            if start < first_entry || end > leaf_start {
                error!(
                    "BlockDirectory::init: bestfree [{}, {}) outside data area",
                    start, end
                );
                return Err(Error::new(ErrorKind::Corrupted, "bestfree region outside data area"));
            }
        }

        debug!(
            "BlockDirectory::init: ino={} fsb={} count={} stale={}",
            ctx.inode().ino(),
            block.fsbno(),
            tail.count,
            tail.stale
        );

        Ok(Self {
            block,
            header,
            tail,
            first_entry,
            leaf_start,
            dir_block_size: ctx.dir_block_size(),
            has_ftype: ctx.has_ftype(),
            cursor: DirCursor::START,
        })
    }

    pub fn header(&self) -> &DataHeader {
        &self.header
    }

    pub fn tail(&self) -> BlockTail {
        self.tail
    }

    pub fn block(&self) -> &DirBlock {
        &self.block
    }

    fn leaf_entry(&self, index: usize) -> Result<LeafEntry> {
        LeafEntry::read_at(self.block.data(), self.leaf_start + index * LeafEntry::SIZE)
    }
}

impl DirOps for BlockDirectory {
    fn cursor(&self) -> DirCursor {
        self.cursor
    }

    fn set_cursor(&mut self, cursor: DirCursor) {
        self.cursor = cursor;
    }

    fn next_after(
        &mut self,
        cursor: DirCursor,
        name: &mut [u8],
    ) -> Result<(DirCursor, usize, u64)> {
        let data = self.block.data();
        let mut remaining = self.tail.count - self.tail.stale;
        let mut off = self.first_entry;

        while remaining > 0 {
            if off >= self.leaf_start {
                return Err(Error::new(
                    ErrorKind::Corrupted,
                    "directory entries overrun leaf array",
                ));
            }
            match read_slot(data, off, self.leaf_start, self.has_ftype)? {
                DirSlot::Unused(unused) => off += unused.length as usize,
                DirSlot::Data(entry) => {
                    remaining -= 1;
                    if off as u64 <= cursor.raw() {
                        off += entry.size;
                        continue;
                    }
                    let len = copy_name(name, entry.name)?;
                    trace!("BlockDirectory: entry at {} ino {}", off, entry.inumber);
                    return Ok((DirCursor::new(off as u64), len, entry.inumber));
                }
            }
        }

        Err(end_of_directory())
    }

    fn lookup(&mut self, name: &[u8]) -> Result<u64> {
        let hash = da_hashname(name);
        let count = self.tail.count as usize;
        let start = hash_lower_bound(count, |i| Ok(self.leaf_entry(i)?.hashval), hash)?;

        for i in start..count {
            let leaf = self.leaf_entry(i)?;
            if leaf.hashval != hash {
                break;
            }
            if leaf.address == 0 {
                continue;
            }

            let off = address_to_offset(leaf.address, self.dir_block_size);
            if off < self.first_entry || off >= self.leaf_start {
                return Err(Error::new(ErrorKind::Corrupted, "leaf address out of data area"));
            }
            match read_slot(self.block.data(), off, self.leaf_start, self.has_ftype)? {
                DirSlot::Data(entry) if entry.name == name => return Ok(entry.inumber),
                DirSlot::Data(_) => continue,
                DirSlot::Unused(_) => {
                    return Err(Error::new(ErrorKind::Corrupted, "leaf points at unused entry"))
                }
            }
        }

        Err(entry_not_found())
    }
}
