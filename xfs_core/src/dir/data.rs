//! 多块目录的数据空间
//!
//! 叶子、节点、B+树三种格式共用：逻辑偏移 `XFS_DIR2_LEAF_OFFSET` 以下
//! 是数据块，每块以 `XD2D`/`XDD3` 头部开始，其后目录项铺满整个块。
//! 目录项的位置统一用数据空间内的字节地址表示：
//! `(目录块序号 << dir_block_log) | 块内偏移`。

use super::{
    buffer::DirBlock,
    copy_name, end_of_directory,
    entry::{read_slot, DirSlot},
    hash::{address_to_block, address_to_offset},
    header::{DataHeader, DirPurpose},
    verify::verify_header,
    DirContext, DirCursor,
};
use crate::{
    block::BlockDevice,
    consts::XFS_DIR2_LEAF_OFFSET,
    error::{Error, ErrorKind, Result},
    extent::ExtentList,
};
use log::{debug, trace};

pub(super) struct DataSpace<'a, D: BlockDevice> {
    ctx: DirContext<'a, D>,
    extents: ExtentList,
    /// 最近一次读入的数据块及其目录块序号
    cached: Option<(u64, DirBlock)>,
}

impl<'a, D: BlockDevice> DataSpace<'a, D> {
    pub fn new(ctx: DirContext<'a, D>, extents: ExtentList) -> Self {
        Self {
            ctx,
            extents,
            cached: None,
        }
    }

    pub fn ctx(&self) -> DirContext<'a, D> {
        self.ctx
    }

    pub fn extents(&self) -> &ExtentList {
        &self.extents
    }

    fn dir_block_log(&self) -> u32 {
        self.ctx.superblock().dir_block_log()
    }

    /// 数据空间中的目录块数上限（叶子空间之前）
    fn data_block_limit(&self) -> u64 {
        XFS_DIR2_LEAF_OFFSET >> self.dir_block_log()
    }

    /// 目录块序号 `db` 的第一个文件系统块
    fn first_fsb(&self, db: u64) -> u64 {
        db << self.ctx.superblock().inner().dirblklog
    }

    /// 读取（或复用缓存的）数据块并校验头部
    fn block(&mut self, db: u64) -> Result<&DirBlock> {
        let hit = matches!(&self.cached, Some((cached, _)) if *cached == db);
        if !hit {
            // 先丢弃旧块
            self.cached = None;
            let block = DirBlock::load_logical(self.ctx, &self.extents, self.first_fsb(db))?;
            let version = self.ctx.header_version();
            let header = DataHeader::create(version, block.data())?;
            let magic = DataHeader::expected_magic(DirPurpose::Data, version);
            if !verify_header(&header, magic, &block, self.ctx) {
                return Err(Error::new(ErrorKind::Corrupted, "bad directory data block header"));
            }
            debug!("DataSpace: loaded data block {} at fsb {}", db, block.fsbno());
            self.cached = Some((db, block));
        }
        match &self.cached {
            Some((_, block)) => Ok(block),
            None => Err(Error::new(ErrorKind::Corrupted, "directory data block missing")),
        }
    }

    /// 按数据空间顺序找 `cursor` 之后的第一个有效目录项，跳过空洞和空闲槽
    pub fn next_after(
        &mut self,
        cursor: DirCursor,
        name: &mut [u8],
    ) -> Result<(DirCursor, usize, u64)> {
        let dir_block_log = self.dir_block_log();
        let dirblklog = self.ctx.superblock().inner().dirblklog;
        let limit = self.data_block_limit();
        let has_ftype = self.ctx.has_ftype();
        let first_entry = DataHeader::size(self.ctx.header_version());

        let mut db = cursor.raw() >> dir_block_log;
        while db < limit {
            // 跳到下一个已映射的目录块
            let Some(fsb) = self.extents.next_mapped(self.first_fsb(db)) else {
                break;
            };
            db = fsb >> dirblklog;
            if db >= limit {
                break;
            }

            let base = db << dir_block_log;
            let block = self.block(db)?;
            let data = block.data();
            let mut off = first_entry;
            while off < data.len() {
                let slot = read_slot(data, off, data.len(), has_ftype)?;
                if let DirSlot::Data(entry) = slot {
                    let pos = base | off as u64;
                    if pos > cursor.raw() {
                        let len = copy_name(name, entry.name)?;
                        trace!("DataSpace: entry at {:#x} ino {}", pos, entry.inumber);
                        return Ok((DirCursor::new(pos), len, entry.inumber));
                    }
                }
                off = slot.next_offset();
            }
            db += 1;
        }

        Err(end_of_directory())
    }

    /// 按叶子项地址读取目录项，名字完全相同时返回 inode 号
    pub fn match_address(&mut self, address: u32, name: &[u8]) -> Result<Option<u64>> {
        let db = address_to_block(address, self.dir_block_log());
        if db >= self.data_block_limit() {
            return Err(Error::new(ErrorKind::Corrupted, "leaf address beyond data space"));
        }
        let off = address_to_offset(address, self.ctx.dir_block_size());
        let first_entry = DataHeader::size(self.ctx.header_version());
        let has_ftype = self.ctx.has_ftype();

        let block = self.block(db)?;
        if off < first_entry {
            return Err(Error::new(ErrorKind::Corrupted, "leaf address inside header"));
        }
        match read_slot(block.data(), off, block.len(), has_ftype)? {
            DirSlot::Data(entry) => Ok((entry.name == name).then_some(entry.inumber)),
            DirSlot::Unused(_) => {
                Err(Error::new(ErrorKind::Corrupted, "leaf points at unused entry"))
            }
        }
    }

    /// 读取叶子/节点空间中逻辑块号为 `fsb` 的目录块（不缓存）
    pub fn load_index_block(&self, fsb: u64) -> Result<DirBlock> {
        DirBlock::load_logical(self.ctx, &self.extents, fsb)
    }
}
