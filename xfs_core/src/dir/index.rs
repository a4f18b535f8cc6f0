//! 多块目录的哈希索引
//!
//! 叶子空间（逻辑偏移 `XFS_DIR2_LEAF_OFFSET` 起）的第一个块是索引根：
//! 叶子格式为 leaf1；节点格式为 da 节点或 leafn。da 节点项为
//! `(hashval, before)`，指向覆盖该哈希上界的子块；leafn 之间通过
//! `forw` 串成链表，相同哈希可以跨越多个 leafn。

use super::{
    buffer::DirBlock,
    data::DataSpace,
    entry::LeafEntry,
    entry_not_found,
    hash::{da_hashname, hash_lower_bound},
    header::{LeafHeader, LeafKind, NodeHeader},
    verify::verify_header,
    DirContext,
};
use crate::{
    block::BlockDevice,
    bytes::{be_u16, be_u32},
    consts::XFS_DA_NODE_MAXDEPTH,
    error::{Error, ErrorKind, Result},
};
use log::{debug, error, trace};

/// 索引根可以是哪几种块
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RootKind {
    Leaf1,
    LeafN,
    Node,
}

/// 已校验的叶子块
pub(super) struct LeafBlock {
    block: DirBlock,
    header: LeafHeader,
    kind: LeafKind,
    entries: usize,
}

impl LeafBlock {
    /// 校验头部、`stale <= count`，以及叶子数组不越过块尾（leaf1 为 bests 表）
    pub fn parse<D: BlockDevice>(
        ctx: DirContext<'_, D>,
        block: DirBlock,
        kind: LeafKind,
    ) -> Result<Self> {
        let version = ctx.header_version();
        let header = LeafHeader::create(version, block.data())?;
        let magic = LeafHeader::expected_magic(kind, version);
        if !verify_header(&header.info, magic as u32, &block, ctx) {
            return Err(Error::new(ErrorKind::Corrupted, "bad directory leaf header"));
        }
        if header.stale > header.count {
            return Err(Error::new(ErrorKind::Corrupted, "stale count exceeds leaf count"));
        }

        let limit = match kind {
            LeafKind::LeafN => block.len(),
            LeafKind::Leaf1 => {
                // 块尾：bests[bestcount] 之后是 bestcount
                let tail = block.len() - 4;
                let bestcount = be_u32(block.data(), tail)? as usize;
                bestcount
                    .checked_mul(2)
                    .and_then(|len| tail.checked_sub(len))
                    .ok_or(Error::new(ErrorKind::Corrupted, "bad leaf bests count"))?
            }
        };
        let entries = LeafHeader::size(version);
        let end = entries + header.count as usize * LeafEntry::SIZE;
        if end > limit {
            return Err(Error::new(ErrorKind::Corrupted, "leaf entries overrun block"));
        }

        trace!(
            "LeafBlock: fsb={} kind={:?} count={} stale={}",
            block.fsbno(),
            kind,
            header.count,
            header.stale
        );
        Ok(Self {
            block,
            header,
            kind,
            entries,
        })
    }

    pub fn count(&self) -> usize {
        self.header.count as usize
    }

    pub fn forw(&self) -> u32 {
        self.header.info.forw()
    }

    pub fn back(&self) -> u32 {
        self.header.info.back()
    }

    pub fn entry(&self, index: usize) -> Result<LeafEntry> {
        LeafEntry::read_at(self.block.data(), self.entries + index * LeafEntry::SIZE)
    }
}

/// 已校验的 da 节点块
struct NodeBlock {
    block: DirBlock,
    header: NodeHeader,
    entries: usize,
}

impl NodeBlock {
    fn parse<D: BlockDevice>(ctx: DirContext<'_, D>, block: DirBlock) -> Result<Self> {
        let version = ctx.header_version();
        let header = NodeHeader::create(version, block.data())?;
        let magic = NodeHeader::expected_magic(version);
        if !verify_header(&header.info, magic as u32, &block, ctx) {
            return Err(Error::new(ErrorKind::Corrupted, "bad directory node header"));
        }
        let entries = NodeHeader::size(version);
        if header.count == 0 || entries + header.count as usize * 8 > block.len() {
            return Err(Error::new(ErrorKind::Corrupted, "bad directory node count"));
        }
        if header.level == 0 || header.level as usize > XFS_DA_NODE_MAXDEPTH {
            return Err(Error::new(ErrorKind::Corrupted, "bad directory node level"));
        }
        Ok(Self {
            block,
            header,
            entries,
        })
    }

    fn hashval(&self, index: usize) -> Result<u32> {
        be_u32(self.block.data(), self.entries + index * 8)
    }

    fn before(&self, index: usize) -> Result<u32> {
        be_u32(self.block.data(), self.entries + index * 8 + 4)
    }
}

/// 解析后的索引块
enum IndexBlock {
    Leaf(LeafBlock),
    Node(NodeBlock),
}

/// 按魔数识别并校验叶子空间中的一个块
fn read_index_block<D: BlockDevice>(
    space: &DataSpace<'_, D>,
    fsb: u64,
    accept: &[RootKind],
) -> Result<IndexBlock> {
    let ctx = space.ctx();
    let sb = ctx.superblock();
    if fsb < sb.leaf_start_fsb() || fsb >= sb.free_start_fsb() {
        return Err(Error::new(ErrorKind::Corrupted, "index block outside leaf space"));
    }

    let version = ctx.header_version();
    let block = space.load_index_block(fsb)?;
    let magic = be_u16(block.data(), 8)?;

    let kind = if magic == LeafHeader::expected_magic(LeafKind::Leaf1, version) {
        RootKind::Leaf1
    } else if magic == LeafHeader::expected_magic(LeafKind::LeafN, version) {
        RootKind::LeafN
    } else if magic == NodeHeader::expected_magic(version) {
        RootKind::Node
    } else {
        return Err(Error::new(ErrorKind::Corrupted, "unknown directory index block"));
    };
    if !accept.contains(&kind) {
        return Err(Error::new(ErrorKind::Corrupted, "unexpected directory index block"));
    }

    Ok(match kind {
        RootKind::Leaf1 => IndexBlock::Leaf(LeafBlock::parse(ctx, block, LeafKind::Leaf1)?),
        RootKind::LeafN => IndexBlock::Leaf(LeafBlock::parse(ctx, block, LeafKind::LeafN)?),
        RootKind::Node => IndexBlock::Node(NodeBlock::parse(ctx, block)?),
    })
}

/// 校验叶子空间的根块是 `accept` 中的一种
pub(super) fn check_root<D: BlockDevice>(
    space: &DataSpace<'_, D>,
    accept: &[RootKind],
) -> Result<()> {
    let root = space.ctx().superblock().leaf_start_fsb();
    match read_index_block(space, root, accept)? {
        IndexBlock::Leaf(leaf) => debug!("index root: {:?} count={}", leaf.kind, leaf.count()),
        IndexBlock::Node(node) => debug!(
            "index root: node level={} count={}",
            node.header.level, node.header.count
        ),
    }
    Ok(())
}

/// 哈希查找
///
/// 从根开始沿 da 节点下降到叶子，在叶子中取哈希下界并向后扫描相同哈希的项；
/// 扫描到 leafn 末尾仍是相同哈希时沿 `forw` 继续。
pub(super) fn lookup<D: BlockDevice>(space: &mut DataSpace<'_, D>, name: &[u8]) -> Result<u64> {
    let hash = da_hashname(name);
    let ctx = space.ctx();
    let mut fsb = ctx.superblock().leaf_start_fsb();
    let mut depth = 0;

    let mut leaf = loop {
        match read_index_block(space, fsb, &[RootKind::Leaf1, RootKind::LeafN, RootKind::Node])? {
            IndexBlock::Leaf(leaf) => break leaf,
            IndexBlock::Node(node) => {
                depth += 1;
                if depth > XFS_DA_NODE_MAXDEPTH {
                    return Err(Error::new(ErrorKind::Corrupted, "directory node tree too deep"));
                }
                let count = node.header.count as usize;
                let idx = hash_lower_bound(count, |i| node.hashval(i), hash)?;
                if idx == count {
                    return Err(entry_not_found());
                }
                fsb = node.before(idx)? as u64;
                trace!("lookup: hash {:#x} descends to fsb {}", hash, fsb);
            }
        }
    };

    // leafn 链长度不会超过目录块总数
    let max_hops = ctx.inode().block_count();
    let mut hops = 0;
    loop {
        let count = leaf.count();
        let start = hash_lower_bound(count, |i| Ok(leaf.entry(i)?.hashval), hash)?;
        for i in start..count {
            let entry = leaf.entry(i)?;
            if entry.hashval != hash {
                return Err(entry_not_found());
            }
            if entry.address == 0 {
                continue;
            }
            if let Some(ino) = space.match_address(entry.address, name)? {
                return Ok(ino);
            }
        }

        if leaf.kind != LeafKind::LeafN || leaf.forw() == 0 {
            return Err(entry_not_found());
        }
        hops += 1;
        if hops > max_hops {
            return Err(Error::new(ErrorKind::Corrupted, "directory leaf chain loops"));
        }
        let next_fsb = leaf.forw() as u64;
        leaf = match read_index_block(space, next_fsb, &[RootKind::LeafN])? {
            IndexBlock::Leaf(next) => next,
            IndexBlock::Node(_) => {
                return Err(Error::new(ErrorKind::Corrupted, "leaf sibling is a node"))
            }
        };
        // 兄弟链双向一致
        if leaf.back() as u64 != fsb {
            error!(
                "lookup: leaf {} back pointer {} does not match {}",
                next_fsb,
                leaf.back(),
                fsb
            );
            return Err(Error::new(ErrorKind::Corrupted, "directory leaf back pointer mismatch"));
        }
        fsb = next_fsb;
    }
}
