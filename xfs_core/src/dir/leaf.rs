//! 叶子格式目录：若干数据块 + 叶子空间中唯一的 leaf1 块

use super::{
    data::DataSpace,
    index::{self, RootKind},
    DirContext, DirCursor, DirOps,
};
use crate::{
    block::BlockDevice,
    consts::{XFS_DINODE_FMT_EXTENTS, XFS_EXTENT_SIZE},
    error::Result,
    extent::{ExtentList, ExtentMapEntry},
};
use log::debug;

pub struct LeafDirectory<'a, D: BlockDevice> {
    space: DataSpace<'a, D>,
    cursor: DirCursor,
}

impl<'a, D: BlockDevice> LeafDirectory<'a, D> {
    /// 不读盘的格式预检
    ///
    /// 至少两个 extent，最后一个恰好是位于叶子偏移处的一个目录块，
    /// 且大小是目录块大小的非零整数倍。
    pub fn is_leaf_type(ctx: DirContext<'_, D>) -> bool {
        let inode = ctx.inode();
        let sb = ctx.superblock();
        let count = inode.data_extents_count() as usize;
        if inode.format() != XFS_DINODE_FMT_EXTENTS || count < 2 {
            return false;
        }
        let Ok(last) = ExtentMapEntry::decode_at(inode.data_fork(), (count - 1) * XFS_EXTENT_SIZE)
        else {
            return false;
        };
        let dir_block_size = ctx.dir_block_size() as u64;
        last.startoff == sb.leaf_start_fsb()
            && last.blockcount as u64 == sb.fsbs_per_dir_block()
            && inode.size() != 0
            && inode.size() % dir_block_size == 0
    }

    /// 解析 extent 列表并校验 leaf1 块
    pub fn init(ctx: DirContext<'a, D>) -> Result<Self> {
        let inode = ctx.inode();
        let extents = ExtentList::from_data_fork(inode.data_fork(), inode.data_extents_count())?;
        let space = DataSpace::new(ctx, extents);
        index::check_root(&space, &[RootKind::Leaf1])?;
        debug!("LeafDirectory::init: ino={} extents={}", inode.ino(), space.extents().len());
        Ok(Self {
            space,
            cursor: DirCursor::START,
        })
    }
}

impl<D: BlockDevice> DirOps for LeafDirectory<'_, D> {
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
        self.space.next_after(cursor, name)
    }

    fn lookup(&mut self, name: &[u8]) -> Result<u64> {
        index::lookup(&mut self.space, name)
    }
}
