//! Extent B+Tree 解析
//!
//! 数据 fork 为 BTREE 格式时，inode 中保存的是 B+Tree 根（`xfs_bmdr_block`），
//! 叶子层是普通的 128 位 extent 记录。这里把整棵树读成一个 `ExtentList`。

use crate::{
    block::BlockDevice,
    bytes::{be_u16, be_u32, be_u64, fixed},
    checksum,
    consts::*,
    error::{Error, ErrorKind, Result},
    fs::Volume,
    inode::Inode,
};
use alloc::vec::Vec;
use log::{debug, error};

use super::map::{ExtentList, ExtentMapEntry};

/// inode 内根节点头部大小（level + numrecs）
const BMDR_HEADER_SIZE: usize = 4;

/// 键、指针大小
const BMBT_KEY_SIZE: usize = 8;
const BMBT_PTR_SIZE: usize = 8;

/// 一次遍历的累计状态
struct Walk {
    extents: Vec<ExtentMapEntry>,
    /// 已访问的树块数
    nodes: u64,
    /// inode 记录的 extent 总数
    expected: usize,
    /// 树块数上限：不超过 inode 拥有的块数
    max_nodes: u64,
}

/// Extent B+Tree 遍历器
pub struct ExtentTree<'a, D: BlockDevice> {
    vol: &'a Volume<D>,
    inode: &'a Inode,
}

impl<'a, D: BlockDevice> ExtentTree<'a, D> {
    /// 创建新的遍历器
    pub fn new(vol: &'a Volume<D>, inode: &'a Inode) -> Self {
        Self { vol, inode }
    }

    /// 读取整棵树的所有 extent（按逻辑块号升序）
    pub fn read_all(&self) -> Result<ExtentList> {
        if self.inode.format() != XFS_DINODE_FMT_BTREE {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Inode data fork is not a B+Tree",
            ));
        }

        let root = self.inode.data_fork();
        let level = be_u16(root, 0)?;
        let numrecs = be_u16(root, 2)? as usize;
        if level == 0 || level > XFS_BM_MAXLEVELS {
            return Err(Error::new(ErrorKind::Corrupted, "Invalid B+Tree root level"));
        }

        // 根节点的最大记录数由 fork 大小决定，指针数组从 maxrecs 个键之后开始
        let maxrecs =
            root.len().saturating_sub(BMDR_HEADER_SIZE) / (BMBT_KEY_SIZE + BMBT_PTR_SIZE);
        if numrecs == 0 || numrecs > maxrecs {
            return Err(Error::new(ErrorKind::Corrupted, "Invalid B+Tree root record count"));
        }
        debug!(
            "bmbt root: ino={} level={} numrecs={} maxrecs={}",
            self.inode.ino(), level, numrecs, maxrecs
        );

        let ptr_base = BMDR_HEADER_SIZE + maxrecs * BMBT_KEY_SIZE;
        let mut walk = Walk {
            extents: Vec::new(),
            nodes: 0,
            expected: self.inode.data_extents_count() as usize,
            max_nodes: self.inode.block_count(),
        };
        for i in 0..numrecs {
            let child = be_u64(root, ptr_base + i * BMBT_PTR_SIZE)?;
            self.visit(child, level - 1, &mut walk)?;
        }

        if walk.extents.len() != walk.expected {
            error!(
                "bmbt: ino={} expected {} extents, found {}",
                self.inode.ino(),
                walk.expected,
                walk.extents.len()
            );
            return Err(Error::new(ErrorKind::Corrupted, "B+Tree extent count mismatch"));
        }

        ExtentList::from_entries(walk.extents)
    }

    /// 读取并检查一个子节点
    ///
    /// 树块总数不超过 inode 的块数，叶子记录总数不超过 inode 的 extent 数，
    /// 超出立即返回 `Corrupted`，不再继续读盘。
    fn visit(&self, fsb: u64, level: u16, walk: &mut Walk) -> Result<()> {
        walk.nodes += 1;
        if walk.nodes > walk.max_nodes {
            error!(
                "bmbt: ino={} visits more than {} blocks",
                self.inode.ino(),
                walk.max_nodes
            );
            return Err(Error::new(
                ErrorKind::Corrupted,
                "B+Tree visits more blocks than the inode owns",
            ));
        }

        let block = self.read_node(fsb)?;
        let sb = self.vol.superblock();
        let hdr_len = if sb.is_v5() {
            XFS_BTREE_LBLOCK_CRC_LEN
        } else {
            XFS_BTREE_LBLOCK_LEN
        };

        let node_level = be_u16(&block, 4)?;
        let numrecs = be_u16(&block, 6)? as usize;
        if node_level != level {
            return Err(Error::new(ErrorKind::Corrupted, "B+Tree level mismatch"));
        }

        if level == 0 {
            // 叶子节点：包含实际的 extent
            let maxrecs = (block.len() - hdr_len) / XFS_EXTENT_SIZE;
            if numrecs > maxrecs {
                return Err(Error::new(ErrorKind::Corrupted, "B+Tree leaf overflow"));
            }
            if walk.extents.len() + numrecs > walk.expected {
                error!(
                    "bmbt block {}: more than {} extents in tree",
                    fsb, walk.expected
                );
                return Err(Error::new(
                    ErrorKind::Corrupted,
                    "B+Tree holds more extents than the inode records",
                ));
            }
            walk.extents
                .try_reserve(numrecs)
                .map_err(|_| Error::new(ErrorKind::NoMemory, "extent list allocation failed"))?;
            for i in 0..numrecs {
                let ext = ExtentMapEntry::decode_at(&block, hdr_len + i * XFS_EXTENT_SIZE)?;
                walk.extents.push(ext);
            }
            return Ok(());
        }

        // 索引节点：包含指向下层节点的指针
        let maxrecs = (block.len() - hdr_len) / (BMBT_KEY_SIZE + BMBT_PTR_SIZE);
        if numrecs == 0 || numrecs > maxrecs {
            return Err(Error::new(ErrorKind::Corrupted, "Invalid B+Tree node record count"));
        }
        let ptr_base = hdr_len + maxrecs * BMBT_KEY_SIZE;
        for i in 0..numrecs {
            let child = be_u64(&block, ptr_base + i * BMBT_PTR_SIZE)?;
            self.visit(child, level - 1, walk)?;
        }
        Ok(())
    }

    /// 读取一个 B+Tree 块并校验头部
    fn read_node(&self, fsb: u64) -> Result<Vec<u8>> {
        let sb = self.vol.superblock();
        let len = sb.block_size() as usize;
        let mut block = Vec::new();
        block.try_reserve_exact(len)
            .map_err(|_| Error::new(ErrorKind::NoMemory, "B+Tree block allocation failed"))?;
        block.resize(len, 0);
        self.vol
            .block_device()
            .read_exact_at(self.vol.fsb_to_byte(fsb)?, &mut block)?;

        let magic = be_u32(&block, 0)?;
        let expected = if sb.is_v5() {
            XFS_BMAP_CRC_MAGIC
        } else {
            XFS_BMAP_MAGIC
        };
        if magic != expected {
            error!("bmbt block {}: bad magic {:#x}", fsb, magic);
            return Err(Error::new(ErrorKind::Corrupted, "Invalid B+Tree block magic"));
        }

        if sb.is_v5() {
            if !checksum::verify_cksum(&block, XFS_BTREE_LBLOCK_CRC_OFF) {
                error!("bmbt block {}: checksum mismatch", fsb);
                return Err(Error::new(ErrorKind::Corrupted, "B+Tree block checksum mismatch"));
            }
            if be_u64(&block, 24)? != self.vol.fsb_to_daddr(fsb)? {
                return Err(Error::new(ErrorKind::Corrupted, "B+Tree block number mismatch"));
            }
            if &fixed::<16>(&block, 40)? != sb.metadata_uuid() {
                return Err(Error::new(ErrorKind::Corrupted, "B+Tree block UUID mismatch"));
            }
            if be_u64(&block, 56)? != self.inode.ino() {
                return Err(Error::new(ErrorKind::Corrupted, "B+Tree block owner mismatch"));
            }
        }

        Ok(block)
    }
}
