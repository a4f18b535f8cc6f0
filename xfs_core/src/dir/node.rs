//! 节点格式目录：数据块 + da 节点树 + leafn 链 + 空闲索引块

use super::{
    data::DataSpace,
    index::{self, RootKind},
    DirContext, DirCursor, DirOps,
};
use crate::{
    block::BlockDevice,
    consts::{XFS_DINODE_FMT_EXTENTS, XFS_EXTENT_SIZE},
    error::Result,
    extent::{startoff_of, ExtentList},
};
use log::debug;

pub struct NodeDirectory<'a, D: BlockDevice> {
    space: DataSpace<'a, D>,
    cursor: DirCursor,
}

impl<'a, D: BlockDevice> NodeDirectory<'a, D> {
    /// 不读盘的格式预检：至少两个 extent，最后一个位于空闲索引空间
    pub fn is_node_type(ctx: DirContext<'_, D>) -> bool {
        let inode = ctx.inode();
        let count = inode.data_extents_count() as usize;
        if inode.format() != XFS_DINODE_FMT_EXTENTS || count < 2 {
            return false;
        }
        inode
            .data_fork()
            .get((count - 1) * XFS_EXTENT_SIZE..)
            .and_then(|rec| startoff_of(rec).ok())
            .is_some_and(|off| off >= ctx.superblock().free_start_fsb())
    }

    /// 解析 extent 列表并校验叶子空间的根（da 节点或 leafn）
    pub fn init(ctx: DirContext<'a, D>) -> Result<Self> {
        let inode = ctx.inode();
        let extents = ExtentList::from_data_fork(inode.data_fork(), inode.data_extents_count())?;
        let space = DataSpace::new(ctx, extents);
        index::check_root(&space, &[RootKind::Node, RootKind::LeafN])?;
        debug!("NodeDirectory::init: ino={} extents={}", inode.ino(), space.extents().len());
        Ok(Self {
            space,
            cursor: DirCursor::START,
        })
    }
}

impl<D: BlockDevice> DirOps for NodeDirectory<'_, D> {
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
