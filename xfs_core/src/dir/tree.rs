//! B+树格式目录：extent 映射保存在 B+树中，其余结构与节点格式相同

use super::{
    data::DataSpace,
    index::{self, RootKind},
    DirContext, DirCursor, DirOps,
};
use crate::{block::BlockDevice, error::Result, extent::ExtentTree};
use log::debug;

pub struct TreeDirectory<'a, D: BlockDevice> {
    space: DataSpace<'a, D>,
    cursor: DirCursor,
}

impl<'a, D: BlockDevice> TreeDirectory<'a, D> {
    /// 读出整棵 extent B+树并校验叶子空间的根
    pub fn init(ctx: DirContext<'a, D>) -> Result<Self> {
        let extents = ExtentTree::new(ctx.volume(), ctx.inode()).read_all()?;
        let space = DataSpace::new(ctx, extents);
        index::check_root(&space, &[RootKind::Leaf1, RootKind::LeafN, RootKind::Node])?;
        debug!(
            "TreeDirectory::init: ino={} extents={}",
            ctx.inode().ino(),
            space.extents().len()
        );
        Ok(Self {
            space,
            cursor: DirCursor::START,
        })
    }
}

impl<D: BlockDevice> DirOps for TreeDirectory<'_, D> {
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
