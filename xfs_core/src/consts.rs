//! XFS 常量定义

/// 设备扇区大小（512 字节，XFS 的 daddr 单位）
pub const XFS_SECTOR_SIZE: u32 = 512;

/// daddr 与字节之间的位移
pub const XFS_BB_SHIFT: u32 = 9;

/// Superblock 魔数 "XFSB"
pub const XFS_SB_MAGIC: u32 = 0x5846_5342;

/// Superblock 在设备上的偏移
pub const XFS_SB_OFFSET: u64 = 0;

/// 读取 superblock 时使用的长度（一个扇区足够容纳全部字段）
pub const XFS_SB_READ_SIZE: usize = 512;

/// 允许的最小/最大块大小
pub const XFS_MIN_BLOCKSIZE: u32 = 512;
pub const XFS_MAX_BLOCKSIZE: u32 = 65536;

/// Inode 魔数 "IN"
pub const XFS_DINODE_MAGIC: u16 = 0x494e;

/// Inode 核心结构大小（v1/v2 与 v3）
pub const XFS_DINODE_CORE_SIZE_V2: usize = 100;
pub const XFS_DINODE_CORE_SIZE_V3: usize = 176;

/// v3 inode 中 CRC 字段的偏移
pub const XFS_DINODE_CRC_OFFSET: usize = 100;

/// Inode 数据 fork 格式
pub const XFS_DINODE_FMT_DEV: u8 = 0;
pub const XFS_DINODE_FMT_LOCAL: u8 = 1;
pub const XFS_DINODE_FMT_EXTENTS: u8 = 2;
pub const XFS_DINODE_FMT_BTREE: u8 = 3;
pub const XFS_DINODE_FMT_UUID: u8 = 4;

/// Inode 模式位
pub const S_IFMT: u16 = 0o170000;
pub const S_IFDIR: u16 = 0o040000;
pub const S_IFREG: u16 = 0o100000;
pub const S_IFLNK: u16 = 0o120000;

/// 磁盘 extent 记录大小（128 位）
pub const XFS_EXTENT_SIZE: usize = 16;

/// 目录块头部魔数
pub const XFS_DIR2_BLOCK_MAGIC: u32 = 0x5844_3242; // "XD2B"
pub const XFS_DIR3_BLOCK_MAGIC: u32 = 0x5844_4233; // "XDB3"
pub const XFS_DIR2_DATA_MAGIC: u32 = 0x5844_3244; // "XD2D"
pub const XFS_DIR3_DATA_MAGIC: u32 = 0x5844_4433; // "XDD3"

/// 叶子块与 da 节点魔数（16 位）
pub const XFS_DIR2_LEAF1_MAGIC: u16 = 0xd2f1;
pub const XFS_DIR3_LEAF1_MAGIC: u16 = 0x3df1;
pub const XFS_DIR2_LEAFN_MAGIC: u16 = 0xd2ff;
pub const XFS_DIR3_LEAFN_MAGIC: u16 = 0x3dff;
pub const XFS_DA_NODE_MAGIC: u16 = 0xfebe;
pub const XFS_DA3_NODE_MAGIC: u16 = 0x3ebe;

/// 空闲目录项标记
pub const XFS_DIR2_DATA_FREE_TAG: u16 = 0xffff;

/// 目录数据空间、叶子空间、空闲索引空间的起始字节偏移
pub const XFS_DIR2_LEAF_OFFSET: u64 = 1 << 35;
pub const XFS_DIR2_FREE_OFFSET: u64 = 2 << 35;

/// 目录项对齐
pub const XFS_DIR2_DATA_ALIGN: usize = 8;

/// da 树最大深度（超过即视为损坏）
pub const XFS_DA_NODE_MAXDEPTH: usize = 5;

/// Extent B+Tree 魔数
pub const XFS_BMAP_MAGIC: u32 = 0x424d_4150; // "BMAP"
pub const XFS_BMAP_CRC_MAGIC: u32 = 0x424d_4133; // "BMA3"

/// Extent B+Tree 长格式块头大小（V4/V5）
pub const XFS_BTREE_LBLOCK_LEN: usize = 24;
pub const XFS_BTREE_LBLOCK_CRC_LEN: usize = 72;

/// V5 长格式块头中 CRC 字段的偏移
pub const XFS_BTREE_LBLOCK_CRC_OFF: usize = 64;

/// Extent B+Tree 最大层数
pub const XFS_BM_MAXLEVELS: u16 = 9;

/// 错误码（兼容 C errno）
pub const EOK: i32 = 0;
pub const ENOENT: i32 = 2;
pub const EIO: i32 = 5;
pub const ENOMEM: i32 = 12;
pub const EINVAL: i32 = 22;
pub const ENOTSUP: i32 = 95;
pub const EOVERFLOW: i32 = 75;
pub const EFSCORRUPTED: i32 = 117;
