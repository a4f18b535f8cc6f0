//! 测试用的内存块设备和最小 XFS 镜像构造器

#![allow(dead_code)]

use xfs_core::{
    checksum::update_cksum,
    dir::{da_hashname, entry_size},
    superblock::{Features2, IncompatFeatures, VersionFlags},
    BlockDev, BlockDevice, ExtentMapEntry, ExtentState, Inode, Result, Volume,
    XFS_DIR2_BLOCK_MAGIC, XFS_DIR2_DATA_FREE_TAG, XFS_DIR3_BLOCK_MAGIC, XFS_SB_MAGIC,
};

pub const BLOCK_SIZE: usize = 4096;
pub const BLOCK_LOG: u8 = 12;
pub const AG_BLOCKS: u32 = 64;
pub const AG_BLOCK_LOG: u8 = 6;
pub const INODE_SIZE: usize = 512;
pub const FS_UUID: [u8; 16] = [0x42; 16];

/// 第一个 inode 所在的文件系统块
pub const INODE_BLOCK: u64 = 2;
pub const ROOT_INO: u64 = 16;

pub const S_IFDIR: u16 = 0o040000;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 内存块设备，读取超出镜像末尾时只返回实际存在的字节
pub struct MemDevice {
    data: Vec<u8>,
}

impl MemDevice {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl BlockDevice for MemDevice {
    fn sector_size(&self) -> u32 {
        512
    }

    fn total_sectors(&self) -> u64 {
        self.data.len() as u64 / 512
    }

    fn read_sectors(&self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize> {
        let start = (lba * 512) as usize;
        let end = (start + count as usize * 512).min(self.data.len());
        if start >= end {
            return Ok(0);
        }
        let n = end - start;
        buf[..n].copy_from_slice(&self.data[start..end]);
        Ok(n)
    }
}

/// 镜像参数
#[derive(Clone, Copy)]
pub struct Geometry {
    pub v5: bool,
    pub ftype: bool,
}

impl Geometry {
    pub const V4: Geometry = Geometry {
        v5: false,
        ftype: false,
    };
    pub const V5: Geometry = Geometry {
        v5: true,
        ftype: true,
    };

    pub fn data_header_size(&self) -> usize {
        if self.v5 {
            64
        } else {
            16
        }
    }

    pub fn leaf_header_size(&self) -> usize {
        self.data_header_size()
    }

    pub fn core_size(&self) -> usize {
        if self.v5 {
            176
        } else {
            100
        }
    }

    pub fn leaf_start_fsb(&self) -> u64 {
        (1u64 << 35) >> BLOCK_LOG
    }

    pub fn free_start_fsb(&self) -> u64 {
        (2u64 << 35) >> BLOCK_LOG
    }
}

/// 目录 inode 描述
pub struct InodeSpec {
    pub format: u8,
    pub size: u64,
    pub nblocks: u64,
    pub nextents: u32,
    pub fork: Vec<u8>,
}

impl InodeSpec {
    /// extent 格式：fork 由 extent 记录组成
    pub fn extents(extents: &[ExtentMapEntry], size: u64, nblocks: u64) -> Self {
        let mut fork = Vec::new();
        for ext in extents {
            fork.extend_from_slice(&ext.encode());
        }
        Self {
            format: xfs_core::XFS_DINODE_FMT_EXTENTS,
            size,
            nblocks,
            nextents: extents.len() as u32,
            fork,
        }
    }
}

pub fn extent(startoff: u64, startblock: u64, blockcount: u32) -> ExtentMapEntry {
    ExtentMapEntry {
        state: ExtentState::Normal,
        startoff,
        startblock,
        blockcount,
    }
}

/// 内存中的 XFS 镜像
pub struct Image {
    pub geo: Geometry,
    pub data: Vec<u8>,
}

impl Image {
    pub fn new(geo: Geometry) -> Self {
        let mut data = vec![0u8; AG_BLOCKS as usize * BLOCK_SIZE];
        let sb = &mut data[..512];
        put_u32(sb, 0, XFS_SB_MAGIC);
        put_u32(sb, 4, BLOCK_SIZE as u32);
        put_u64(sb, 8, AG_BLOCKS as u64);
        sb[32..48].copy_from_slice(&FS_UUID);
        put_u64(sb, 56, ROOT_INO);
        put_u32(sb, 84, AG_BLOCKS);
        put_u32(sb, 88, 1);
        let versionnum = if geo.v5 {
            5
        } else if geo.ftype {
            4 | VersionFlags::MOREBITS.bits()
        } else {
            4
        };
        put_u16(sb, 100, versionnum);
        put_u16(sb, 102, 512);
        put_u16(sb, 104, INODE_SIZE as u16);
        put_u16(sb, 106, (BLOCK_SIZE / INODE_SIZE) as u16);
        sb[120] = BLOCK_LOG;
        sb[121] = 9;
        sb[122] = 9;
        sb[123] = BLOCK_LOG - 9;
        sb[124] = AG_BLOCK_LOG;
        sb[192] = 0;
        if !geo.v5 && geo.ftype {
            put_u32(sb, 200, Features2::FTYPE.bits());
        }
        if geo.v5 && geo.ftype {
            put_u32(sb, 216, IncompatFeatures::FTYPE.bits());
        }
        Self { geo, data }
    }

    pub fn block_mut(&mut self, fsb: u64) -> &mut [u8] {
        let start = fsb as usize * BLOCK_SIZE;
        &mut self.data[start..start + BLOCK_SIZE]
    }

    pub fn put_block(&mut self, fsb: u64, block: &[u8]) {
        self.block_mut(fsb).copy_from_slice(block);
    }

    /// 写入目录 inode（`ino` 必须位于 INODE_BLOCK 内）
    pub fn put_inode(&mut self, ino: u64, spec: &InodeSpec) {
        let geo = self.geo;
        let index = (ino - ROOT_INO) as usize;
        let start = INODE_BLOCK as usize * BLOCK_SIZE + index * INODE_SIZE;
        let raw = &mut self.data[start..start + INODE_SIZE];
        raw.fill(0);
        put_u16(raw, 0, 0x494e);
        put_u16(raw, 2, S_IFDIR | 0o755);
        raw[4] = if geo.v5 { 3 } else { 2 };
        raw[5] = spec.format;
        put_u32(raw, 16, 2);
        put_u64(raw, 56, spec.size);
        put_u64(raw, 64, spec.nblocks);
        put_u32(raw, 76, spec.nextents);
        let core = geo.core_size();
        raw[core..core + spec.fork.len()].copy_from_slice(&spec.fork);
        if geo.v5 {
            put_u64(raw, 152, ino);
            raw[160..176].copy_from_slice(&FS_UUID);
            assert!(update_cksum(raw, 100));
        }
    }

    pub fn volume(self) -> Volume<MemDevice> {
        Volume::mount(BlockDev::new(MemDevice::new(self.data))).unwrap()
    }

    /// 截断镜像后挂载
    pub fn truncated_volume(mut self, len: usize) -> Volume<MemDevice> {
        self.data.truncate(len);
        Volume::mount(BlockDev::new(MemDevice::new(self.data))).unwrap()
    }
}

pub fn load_inode(vol: &Volume<MemDevice>, ino: u64) -> Inode {
    match vol.read_inode(ino) {
        Ok(inode) => inode,
        Err(e) => panic!("read_inode({}) failed: {}", ino, e),
    }
}

pub fn put_u16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_be_bytes());
}

pub fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_be_bytes());
}

pub fn put_u64(buf: &mut [u8], off: usize, v: u64) {
    buf[off..off + 8].copy_from_slice(&v.to_be_bytes());
}

/// 目录数据块构造器
pub struct DataBlockBuilder {
    pub geo: Geometry,
    pub buf: Vec<u8>,
    pub off: usize,
}

impl DataBlockBuilder {
    pub fn new(geo: Geometry, magic: u32) -> Self {
        let mut buf = vec![0u8; BLOCK_SIZE];
        put_u32(&mut buf, 0, magic);
        Self {
            geo,
            buf,
            off: geo.data_header_size(),
        }
    }

    pub fn block(geo: Geometry) -> Self {
        Self::new(
            geo,
            if geo.v5 {
                XFS_DIR3_BLOCK_MAGIC
            } else {
                XFS_DIR2_BLOCK_MAGIC
            },
        )
    }

    pub fn data(geo: Geometry) -> Self {
        Self::new(
            geo,
            if geo.v5 {
                xfs_core::XFS_DIR3_DATA_MAGIC
            } else {
                xfs_core::XFS_DIR2_DATA_MAGIC
            },
        )
    }

    /// 追加目录项，返回其块内偏移
    pub fn entry(&mut self, ino: u64, name: &[u8]) -> usize {
        let off = self.off;
        let size = entry_size(name.len(), self.geo.ftype);
        put_u64(&mut self.buf, off, ino);
        self.buf[off + 8] = name.len() as u8;
        self.buf[off + 9..off + 9 + name.len()].copy_from_slice(name);
        if self.geo.ftype {
            self.buf[off + 9 + name.len()] = 2;
        }
        put_u16(&mut self.buf, off + size - 2, off as u16);
        self.off += size;
        off
    }

    /// 追加空闲槽
    pub fn unused(&mut self, len: usize) {
        let off = self.off;
        put_u16(&mut self.buf, off, XFS_DIR2_DATA_FREE_TAG);
        put_u16(&mut self.buf, off + 2, len as u16);
        put_u16(&mut self.buf, off + len - 2, off as u16);
        self.off += len;
    }

    /// 单块格式收尾：空闲槽填满到叶子数组，写入叶子数组和块尾
    ///
    /// `leaves` 为 (哈希, 块内偏移)，偏移为 0 表示已删除。
    pub fn finish_block(mut self, leaves: &[(u32, usize)], stale: u32) -> Vec<u8> {
        let mut leaves = leaves.to_vec();
        leaves.sort_by_key(|&(hash, _)| hash);
        let tail = BLOCK_SIZE - 8;
        let leaf_start = tail - leaves.len() * 8;
        if self.off < leaf_start {
            self.unused(leaf_start - self.off);
        }
        for (i, (hash, off)) in leaves.iter().enumerate() {
            put_u32(&mut self.buf, leaf_start + i * 8, *hash);
            put_u32(&mut self.buf, leaf_start + i * 8 + 4, (*off / 8) as u32);
        }
        put_u32(&mut self.buf, tail, leaves.len() as u32);
        put_u32(&mut self.buf, tail + 4, stale);
        self.buf
    }

    /// 数据块收尾：剩余空间全部为空闲槽
    pub fn finish_data(mut self) -> Vec<u8> {
        if self.off < BLOCK_SIZE {
            self.unused(BLOCK_SIZE - self.off);
        }
        self.buf
    }
}

/// 叶子项 (哈希, 数据空间字节地址)
pub fn leaf_for(name: &[u8], db: u64, off: usize) -> (u32, u64) {
    (da_hashname(name), (db << BLOCK_LOG) | off as u64)
}

/// 构造叶子块（leaf1 带 bests 尾部，leafn 不带）
pub fn leaf_block(
    geo: Geometry,
    magic: u16,
    forw: u32,
    back: u32,
    leaves: &[(u32, u64)],
    bests: Option<&[u16]>,
) -> Vec<u8> {
    let mut buf = vec![0u8; BLOCK_SIZE];
    put_u32(&mut buf, 0, forw);
    put_u32(&mut buf, 4, back);
    put_u16(&mut buf, 8, magic);
    let (count_off, entries) = if geo.v5 { (56, 64) } else { (12, 16) };
    put_u16(&mut buf, count_off, leaves.len() as u16);
    let stale = leaves.iter().filter(|(_, addr)| *addr == 0).count();
    put_u16(&mut buf, count_off + 2, stale as u16);
    for (i, (hash, addr)) in leaves.iter().enumerate() {
        put_u32(&mut buf, entries + i * 8, *hash);
        put_u32(&mut buf, entries + i * 8 + 4, (*addr / 8) as u32);
    }
    if let Some(bests) = bests {
        let tail = BLOCK_SIZE - 4;
        put_u32(&mut buf, tail, bests.len() as u32);
        let base = tail - bests.len() * 2;
        for (i, b) in bests.iter().enumerate() {
            put_u16(&mut buf, base + i * 2, *b);
        }
    }
    buf
}

/// 构造 da 节点块，`entries` 为 (哈希上界, 子块逻辑块号)
pub fn node_block(geo: Geometry, level: u16, entries: &[(u32, u32)]) -> Vec<u8> {
    let mut buf = vec![0u8; BLOCK_SIZE];
    let magic = if geo.v5 {
        xfs_core::XFS_DA3_NODE_MAGIC
    } else {
        xfs_core::XFS_DA_NODE_MAGIC
    };
    put_u16(&mut buf, 8, magic);
    let (count_off, base) = if geo.v5 { (56, 64) } else { (12, 16) };
    put_u16(&mut buf, count_off, entries.len() as u16);
    put_u16(&mut buf, count_off + 2, level);
    for (i, (hash, before)) in entries.iter().enumerate() {
        put_u32(&mut buf, base + i * 8, *hash);
        put_u32(&mut buf, base + i * 8 + 4, *before);
    }
    buf
}

/// 为 V5 数据块（XD2B/XDB3/XD2D/XDD3）写入块号、UUID、属主并计算校验和
pub fn stamp_data_v5(buf: &mut [u8], fsb: u64, owner: u64) {
    put_u64(buf, 8, (fsb << BLOCK_LOG) >> 9);
    buf[24..40].copy_from_slice(&FS_UUID);
    put_u64(buf, 40, owner);
    assert!(update_cksum(buf, 4));
}

/// 为 V5 叶子/节点块写入块号、UUID、属主并计算校验和
pub fn stamp_da_v5(buf: &mut [u8], fsb: u64, owner: u64) {
    put_u64(buf, 16, (fsb << BLOCK_LOG) >> 9);
    buf[32..48].copy_from_slice(&FS_UUID);
    put_u64(buf, 48, owner);
    assert!(update_cksum(buf, 12));
}
