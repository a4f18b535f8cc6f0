//! 目录模块
//!
//! 目录在磁盘上有五种表示：
//!
//! - 短格式：目录项直接存放在 inode 数据 fork 中
//! - 单块格式：一个目录块同时包含数据和哈希索引
//! - 叶子格式：多个数据块 + 一个 leaf1 索引块
//! - 节点格式：多个数据块 + da 节点树 + 多个 leafn 索引块
//! - B+树格式：与节点格式相同，但 extent 映射本身是一棵 B+树
//!
//! `DirectoryIterator::open` 根据 inode 判断具体格式，之后所有格式
//! 提供同一组操作：`rewind`、`get_next`、`next_after`、`lookup`。

mod block;
mod buffer;
mod data;
mod entry;
mod hash;
mod header;
mod index;
mod leaf;
mod node;
mod short;
mod tree;
mod verify;

pub use block::BlockDirectory;
pub use buffer::DirBlock;
pub use entry::{entry_size, read_slot, BlockTail, DataEntry, DirSlot, LeafEntry, UnusedEntry};
pub use hash::{address_to_block, address_to_offset, da_hashname, hash_lower_bound};
pub use header::{
    DaBlkInfo, DataHeader, DataHeaderV4, DataHeaderV5, DirPurpose, FreeRegion, HeaderVersion,
    LeafHeader, LeafKind, NodeHeader, XFS_DIR2_DATA_FD_COUNT,
};
pub use leaf::LeafDirectory;
pub use node::NodeDirectory;
pub use short::ShortDirectory;
pub use tree::TreeDirectory;
pub use verify::{verify_header, MetaHeader};

use crate::{
    block::BlockDevice,
    consts::*,
    error::{Error, ErrorKind, Result},
    fs::Volume,
    inode::Inode,
    superblock::Superblock,
};
use alloc::vec::Vec;
use log::{debug, warn};

/// 目录名最大长度
pub const XFS_NAME_MAX: usize = 255;

/// 一次目录会话的只读视图：卷 + 目录 inode
pub struct DirContext<'a, D: BlockDevice> {
    vol: &'a Volume<D>,
    inode: &'a Inode,
}

// 只包含引用，不要求 D: Clone
impl<D: BlockDevice> Clone for DirContext<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D: BlockDevice> Copy for DirContext<'_, D> {}

impl<'a, D: BlockDevice> DirContext<'a, D> {
    pub fn new(vol: &'a Volume<D>, inode: &'a Inode) -> Self {
        Self { vol, inode }
    }

    pub fn volume(&self) -> &'a Volume<D> {
        self.vol
    }

    pub fn inode(&self) -> &'a Inode {
        self.inode
    }

    pub fn superblock(&self) -> &'a Superblock {
        self.vol.superblock()
    }

    /// 目录块大小（字节）
    pub fn dir_block_size(&self) -> usize {
        self.superblock().dir_block_size() as usize
    }

    /// 目录项是否带文件类型字节
    pub fn has_ftype(&self) -> bool {
        self.superblock().has_ftype()
    }

    /// 本目录元数据块使用的头部版本
    pub fn header_version(&self) -> HeaderVersion {
        HeaderVersion::from_inode_version(self.inode.version())
    }
}

/// 枚举位置（续传令牌）
///
/// 令牌标识上一次返回的目录项；`next_after` 返回严格位于其后的
/// 下一项。`DirCursor::START` 位于所有目录项之前。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct DirCursor(u64);

impl DirCursor {
    pub const START: DirCursor = DirCursor(0);

    pub const fn new(raw: u64) -> Self {
        DirCursor(raw)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }
}

/// 枚举出的目录项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: Vec<u8>,
    pub ino: u64,
    /// 本项的位置，可用于之后从这里继续枚举
    pub cursor: DirCursor,
}

/// 所有目录格式共同实现的操作
pub trait DirOps {
    /// 内嵌游标
    fn cursor(&self) -> DirCursor;

    fn set_cursor(&mut self, cursor: DirCursor);

    /// 返回 `cursor` 之后的第一个有效目录项：(位置, 名字长度, inode 号)
    ///
    /// 名字写入 `name` 的前 `len` 字节。
    ///
    /// # 错误
    ///
    /// * `BufferTooSmall` - `name` 放不下名字
    /// * `NotFound` - 已到目录末尾
    fn next_after(&mut self, cursor: DirCursor, name: &mut [u8]) -> Result<(DirCursor, usize, u64)>;

    /// 按名字精确查找，返回 inode 号；不存在时返回 `NotFound`
    fn lookup(&mut self, name: &[u8]) -> Result<u64>;

    /// 游标回到开头
    fn rewind(&mut self) {
        self.set_cursor(DirCursor::START);
    }

    /// 取下一个目录项并推进内嵌游标，出错时游标不动
    fn get_next(&mut self, name: &mut [u8]) -> Result<(usize, u64)> {
        let (next, len, ino) = self.next_after(self.cursor(), name)?;
        self.set_cursor(next);
        Ok((len, ino))
    }
}

/// 把目录项名字复制到调用者缓冲区
pub(crate) fn copy_name(dst: &mut [u8], name: &[u8]) -> Result<usize> {
    let Some(out) = dst.get_mut(..name.len()) else {
        return Err(Error::new(ErrorKind::BufferTooSmall, "name buffer too small"));
    };
    out.copy_from_slice(name);
    Ok(name.len())
}

pub(crate) fn end_of_directory() -> Error {
    Error::new(ErrorKind::NotFound, "no more directory entries")
}

pub(crate) fn entry_not_found() -> Error {
    Error::new(ErrorKind::NotFound, "directory entry not found")
}

/// 格式已确定的目录迭代器
pub enum DirectoryIterator<'a, D: BlockDevice> {
    Short(ShortDirectory<'a>),
    Block(BlockDirectory),
    Leaf(LeafDirectory<'a, D>),
    Node(NodeDirectory<'a, D>),
    Tree(TreeDirectory<'a, D>),
}

macro_rules! dispatch {
    ($it:expr, $d:ident => $body:expr) => {
        match $it {
            DirectoryIterator::Short($d) => $body,
            DirectoryIterator::Block($d) => $body,
            DirectoryIterator::Leaf($d) => $body,
            DirectoryIterator::Node($d) => $body,
            DirectoryIterator::Tree($d) => $body,
        }
    };
}

type TryBuild<'a, D> = fn(DirContext<'a, D>) -> Option<DirectoryIterator<'a, D>>;

impl<'a, D: BlockDevice> DirectoryIterator<'a, D> {
    /// 识别目录格式并初始化对应的引擎
    ///
    /// extent 格式按 单块、叶子、节点 的顺序尝试，每种格式先做不读盘的
    /// 类型检查，通过后才初始化；第一个成功的格式胜出。
    /// 不支持的格式或全部尝试失败时返回 `None`。
    pub fn open(ctx: DirContext<'a, D>) -> Option<Self> {
        let ino = ctx.inode().ino();
        let found = match ctx.inode().format() {
            XFS_DINODE_FMT_LOCAL => Self::try_short(ctx),
            XFS_DINODE_FMT_EXTENTS => {
                let candidates: [TryBuild<'a, D>; 3] =
                    [Self::try_block, Self::try_leaf, Self::try_node];
                candidates.iter().find_map(|build| build(ctx))
            }
            XFS_DINODE_FMT_BTREE => Self::try_tree(ctx),
            other => {
                warn!("directory {}: unsupported data fork format {}", ino, other);
                None
            }
        };

        match &found {
            Some(it) => debug!("directory {}: opened as {}", ino, it.format_name()),
            None => warn!("directory {}: no directory format matched", ino),
        }
        found
    }

    fn try_short(ctx: DirContext<'a, D>) -> Option<Self> {
        ShortDirectory::init(ctx)
            .map(DirectoryIterator::Short)
            .map_err(|e| warn!("short form directory: {}", e))
            .ok()
    }

    fn try_block(ctx: DirContext<'a, D>) -> Option<Self> {
        if !BlockDirectory::is_block_type(ctx) {
            return None;
        }
        BlockDirectory::init(ctx)
            .map(DirectoryIterator::Block)
            .map_err(|e| warn!("block directory: {}", e))
            .ok()
    }

    fn try_leaf(ctx: DirContext<'a, D>) -> Option<Self> {
        if !LeafDirectory::is_leaf_type(ctx) {
            return None;
        }
        LeafDirectory::init(ctx)
            .map(DirectoryIterator::Leaf)
            .map_err(|e| warn!("leaf directory: {}", e))
            .ok()
    }

    fn try_node(ctx: DirContext<'a, D>) -> Option<Self> {
        if !NodeDirectory::is_node_type(ctx) {
            return None;
        }
        NodeDirectory::init(ctx)
            .map(DirectoryIterator::Node)
            .map_err(|e| warn!("node directory: {}", e))
            .ok()
    }

    fn try_tree(ctx: DirContext<'a, D>) -> Option<Self> {
        TreeDirectory::init(ctx)
            .map(DirectoryIterator::Tree)
            .map_err(|e| warn!("tree directory: {}", e))
            .ok()
    }

    /// 格式名称（用于日志）
    pub fn format_name(&self) -> &'static str {
        match self {
            DirectoryIterator::Short(_) => "short",
            DirectoryIterator::Block(_) => "block",
            DirectoryIterator::Leaf(_) => "leaf",
            DirectoryIterator::Node(_) => "node",
            DirectoryIterator::Tree(_) => "tree",
        }
    }

    pub fn rewind(&mut self) {
        dispatch!(self, d => d.rewind())
    }

    pub fn get_next(&mut self, name: &mut [u8]) -> Result<(usize, u64)> {
        dispatch!(self, d => d.get_next(name))
    }

    pub fn next_after(
        &mut self,
        cursor: DirCursor,
        name: &mut [u8],
    ) -> Result<(DirCursor, usize, u64)> {
        dispatch!(self, d => d.next_after(cursor, name))
    }

    pub fn lookup(&mut self, name: &[u8]) -> Result<u64> {
        dispatch!(self, d => d.lookup(name))
    }

    /// 从头开始的惰性枚举，不影响内嵌游标
    pub fn entries(&mut self) -> Entries<'_, 'a, D> {
        Entries {
            dir: self,
            cursor: DirCursor::START,
            done: false,
        }
    }
}

/// `DirectoryIterator::entries` 返回的迭代器
///
/// 遇到错误时产出一次 `Err`，之后结束。
pub struct Entries<'d, 'a, D: BlockDevice> {
    dir: &'d mut DirectoryIterator<'a, D>,
    cursor: DirCursor,
    done: bool,
}

impl<D: BlockDevice> Iterator for Entries<'_, '_, D> {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut name = [0u8; XFS_NAME_MAX];
        match self.dir.next_after(self.cursor, &mut name) {
            Ok((cursor, len, ino)) => {
                self.cursor = cursor;
                Some(Ok(DirEntry {
                    name: name[..len].to_vec(),
                    ino,
                    cursor,
                }))
            }
            Err(e) => {
                self.done = true;
                if e.is_not_found() {
                    None
                } else {
                    Some(Err(e))
                }
            }
        }
    }
}
