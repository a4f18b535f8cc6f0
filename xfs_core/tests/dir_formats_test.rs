//! 短格式、叶子、节点、B+树格式目录测试（经由格式分发器）

mod common;

use common::*;
use xfs_core::{
    checksum::update_cksum,
    dir::{da_hashname, DirContext},
    DirCursor, DirectoryIterator, ErrorKind, ExtentTree, Volume, XFS_BMAP_CRC_MAGIC,
    XFS_BMAP_MAGIC, XFS_DINODE_FMT_BTREE, XFS_DINODE_FMT_LOCAL, XFS_DIR2_LEAF1_MAGIC,
    XFS_DIR3_LEAF1_MAGIC, XFS_DIR3_LEAFN_MAGIC,
};

fn names(dir: &mut DirectoryIterator<'_, MemDevice>) -> Vec<(Vec<u8>, u64)> {
    dir.entries()
        .map(|e| {
            let e = e.unwrap();
            (e.name, e.ino)
        })
        .collect()
}

fn open<'a>(
    vol: &'a Volume<MemDevice>,
    inode: &'a xfs_core::Inode,
) -> DirectoryIterator<'a, MemDevice> {
    match vol.open_dir(inode) {
        Ok(dir) => dir,
        Err(e) => panic!("open_dir failed: {}", e),
    }
}

// ---------------------------------------------------------------------------
// 短格式

fn short_fork(geo: Geometry, parent: u64, entries: &[(&[u8], u64)], wide: bool) -> Vec<u8> {
    let mut fork = vec![entries.len() as u8, wide as u8];
    let push_ino = |fork: &mut Vec<u8>, ino: u64| {
        if wide {
            fork.extend_from_slice(&ino.to_be_bytes());
        } else {
            fork.extend_from_slice(&(ino as u32).to_be_bytes());
        }
    };
    push_ino(&mut fork, parent);
    let mut offset = 0x30u16;
    for (name, ino) in entries {
        fork.push(name.len() as u8);
        fork.extend_from_slice(&offset.to_be_bytes());
        fork.extend_from_slice(name);
        if geo.ftype {
            fork.push(2);
        }
        push_ino(&mut fork, *ino);
        offset += 16;
    }
    fork
}

fn short_spec(fork: Vec<u8>) -> InodeSpec {
    InodeSpec {
        format: XFS_DINODE_FMT_LOCAL,
        size: fork.len() as u64,
        nblocks: 0,
        nextents: 0,
        fork,
    }
}

#[test]
fn test_short_form_directory() {
    init_logger();
    for geo in [Geometry::V4, Geometry::V5] {
        let fork = short_fork(geo, 99, &[(&b"x"[..], 100), (&b"yy"[..], 101)], false);
        let mut img = Image::new(geo);
        img.put_inode(ROOT_INO, &short_spec(fork));
        let vol = img.volume();
        let inode = load_inode(&vol, ROOT_INO);
        let mut dir = open(&vol, &inode);
        assert_eq!(dir.format_name(), "short");

        assert_eq!(
            names(&mut dir),
            vec![
                (b".".to_vec(), ROOT_INO),
                (b"..".to_vec(), 99),
                (b"x".to_vec(), 100),
                (b"yy".to_vec(), 101),
            ]
        );
        assert_eq!(dir.lookup(b".").unwrap(), ROOT_INO);
        assert_eq!(dir.lookup(b"..").unwrap(), 99);
        assert_eq!(dir.lookup(b"yy").unwrap(), 101);
        assert!(dir.lookup(b"y").unwrap_err().is_not_found());

        let mut small = [0u8; 1];
        assert_eq!(dir.get_next(&mut small).unwrap(), (1, ROOT_INO));
        assert_eq!(
            dir.get_next(&mut small).unwrap_err().kind(),
            ErrorKind::BufferTooSmall
        );
    }
}

#[test]
fn test_short_form_wide_inode_numbers() {
    init_logger();
    let geo = Geometry::V5;
    let big = 0x1_0000_0010u64;
    let fork = short_fork(geo, big, &[(&b"far"[..], big + 1)], true);
    let mut img = Image::new(geo);
    img.put_inode(ROOT_INO, &short_spec(fork));
    let vol = img.volume();
    let inode = load_inode(&vol, ROOT_INO);
    let mut dir = open(&vol, &inode);
    assert_eq!(dir.lookup(b"..").unwrap(), big);
    assert_eq!(dir.lookup(b"far").unwrap(), big + 1);
}

#[test]
fn test_short_form_overrunning_entries_rejected() {
    init_logger();
    let geo = Geometry::V4;
    let mut fork = short_fork(geo, 99, &[(&b"x"[..], 100)], false);
    // 声称有 5 个目录项
    fork[0] = 5;
    let mut img = Image::new(geo);
    img.put_inode(ROOT_INO, &short_spec(fork));
    let vol = img.volume();
    let inode = load_inode(&vol, ROOT_INO);
    assert!(DirectoryIterator::open(DirContext::new(&vol, &inode)).is_none());
}

// ---------------------------------------------------------------------------
// 叶子格式

/// 数据块 db0/db2（db1 为空洞）+ leaf1
fn leaf_image(geo: Geometry) -> Image {
    let mut img = Image::new(geo);
    let leaf_start = geo.leaf_start_fsb();

    let mut d0 = DataBlockBuilder::data(geo);
    let a = d0.entry(10, b"a");
    d0.unused(24);
    let b = d0.entry(11, b"b");
    let mut d0 = d0.finish_data();

    let mut d2 = DataBlockBuilder::data(geo);
    let c = d2.entry(12, b"c");
    let mut d2 = d2.finish_data();

    let mut leaves = vec![
        leaf_for(b"a", 0, a),
        leaf_for(b"b", 0, b),
        leaf_for(b"c", 2, c),
        (da_hashname(b"gone"), 0),
    ];
    leaves.sort_by_key(|&(hash, _)| hash);
    let magic = if geo.v5 {
        XFS_DIR3_LEAF1_MAGIC
    } else {
        XFS_DIR2_LEAF1_MAGIC
    };
    let mut leaf = leaf_block(geo, magic, 0, 0, &leaves, Some(&[100, 0, 200]));

    if geo.v5 {
        stamp_data_v5(&mut d0, 20, ROOT_INO);
        stamp_data_v5(&mut d2, 21, ROOT_INO);
        stamp_da_v5(&mut leaf, 22, ROOT_INO);
    }
    img.put_block(20, &d0);
    img.put_block(21, &d2);
    img.put_block(22, &leaf);

    let spec = InodeSpec::extents(
        &[extent(0, 20, 1), extent(2, 21, 1), extent(leaf_start, 22, 1)],
        3 * BLOCK_SIZE as u64,
        3,
    );
    img.put_inode(ROOT_INO, &spec);
    img
}

#[test]
fn test_leaf_directory() {
    init_logger();
    for geo in [Geometry::V4, Geometry::V5] {
        let vol = leaf_image(geo).volume();
        let inode = load_inode(&vol, ROOT_INO);
        let mut dir = open(&vol, &inode);
        assert!(matches!(dir, DirectoryIterator::Leaf(_)));

        assert_eq!(
            names(&mut dir),
            vec![(b"a".to_vec(), 10), (b"b".to_vec(), 11), (b"c".to_vec(), 12)]
        );
        assert_eq!(dir.lookup(b"a").unwrap(), 10);
        assert_eq!(dir.lookup(b"c").unwrap(), 12);
        assert!(dir.lookup(b"gone").unwrap_err().is_not_found());
        assert!(dir.lookup(b"nope").unwrap_err().is_not_found());
    }
}

#[test]
fn test_leaf_cursor_crosses_blocks() {
    init_logger();
    let vol = leaf_image(Geometry::V4).volume();
    let inode = load_inode(&vol, ROOT_INO);
    let mut dir = open(&vol, &inode);

    let mut name = [0u8; 8];
    let (c1, _, _) = dir.next_after(DirCursor::START, &mut name).unwrap();
    let (c2, _, _) = dir.next_after(c1, &mut name).unwrap();
    let (c3, len, ino) = dir.next_after(c2, &mut name).unwrap();
    assert_eq!((&name[..len], ino), (&b"c"[..], 12));
    // 第三项位于目录块 2
    assert_eq!(c3.raw() >> 12, 2);
    assert!(dir.next_after(c3, &mut name).unwrap_err().is_not_found());
}

#[test]
fn test_leaf_bad_bests_rejected() {
    init_logger();
    let geo = Geometry::V4;
    let mut img = leaf_image(geo);
    // bestcount 大到覆盖叶子数组
    put_u32(img.block_mut(22), BLOCK_SIZE - 4, 3000);
    let vol = img.volume();
    let inode = load_inode(&vol, ROOT_INO);
    assert!(DirectoryIterator::open(DirContext::new(&vol, &inode)).is_none());
}

#[test]
fn test_leaf_corrupt_crc_rejected() {
    init_logger();
    let geo = Geometry::V5;
    let mut img = leaf_image(geo);
    img.block_mut(22)[70] ^= 1;
    let vol = img.volume();
    let inode = load_inode(&vol, ROOT_INO);
    assert!(vol.open_dir(&inode).is_err());
}

// ---------------------------------------------------------------------------
// 节点格式

const N1: &[u8] = b"ab";
const N2: &[u8] = &[0x60, 0xe2];
const ABSENT: &[u8] = &[0x00, 0x61, 0x62];

/// 一个数据块 + da 节点根 + 两个 leafn + 空闲索引块
///
/// 同一哈希的 N1、N2 分别位于两个 leafn，查找 N2 必须沿 forw 前进。
fn node_blocks(geo: Geometry, img: &mut Image) -> Vec<xfs_core::ExtentMapEntry> {
    let leaf_start = geo.leaf_start_fsb();
    let free_start = geo.free_start_fsb();

    let mut d0 = DataBlockBuilder::data(geo);
    let a = d0.entry(10, b"a");
    let o1 = d0.entry(30, N1);
    let o2 = d0.entry(31, N2);
    let z = d0.entry(40, b"zzz");
    let mut d0 = d0.finish_data();

    let l0 = leaf_start as u32 + 1;
    let l1 = leaf_start as u32 + 2;
    let leafn_magic = if geo.v5 {
        XFS_DIR3_LEAFN_MAGIC
    } else {
        xfs_core::XFS_DIR2_LEAFN_MAGIC
    };
    let mut leaf0 = leaf_block(
        geo,
        leafn_magic,
        l1,
        0,
        &[leaf_for(b"a", 0, a), leaf_for(N1, 0, o1)],
        None,
    );
    let mut leaf1 = leaf_block(
        geo,
        leafn_magic,
        0,
        l0,
        &[leaf_for(N2, 0, o2), leaf_for(b"zzz", 0, z)],
        None,
    );
    let mut node = node_block(
        geo,
        1,
        &[(da_hashname(N1), l0), (da_hashname(b"zzz"), l1)],
    );

    if geo.v5 {
        stamp_data_v5(&mut d0, 20, ROOT_INO);
        stamp_da_v5(&mut node, 22, ROOT_INO);
        stamp_da_v5(&mut leaf0, 23, ROOT_INO);
        stamp_da_v5(&mut leaf1, 24, ROOT_INO);
    }
    img.put_block(20, &d0);
    img.put_block(22, &node);
    img.put_block(23, &leaf0);
    img.put_block(24, &leaf1);

    vec![
        extent(0, 20, 1),
        extent(leaf_start, 22, 3),
        extent(free_start, 25, 1),
    ]
}

fn node_image(geo: Geometry) -> Image {
    let mut img = Image::new(geo);
    let extents = node_blocks(geo, &mut img);
    img.put_inode(
        ROOT_INO,
        &InodeSpec::extents(&extents, BLOCK_SIZE as u64, 5),
    );
    img
}

fn check_node_like(dir: &mut DirectoryIterator<'_, MemDevice>) {
    assert_eq!(
        names(dir),
        vec![
            (b"a".to_vec(), 10),
            (N1.to_vec(), 30),
            (N2.to_vec(), 31),
            (b"zzz".to_vec(), 40),
        ]
    );
    assert_eq!(dir.lookup(b"a").unwrap(), 10);
    assert_eq!(dir.lookup(N1).unwrap(), 30);
    assert_eq!(dir.lookup(N2).unwrap(), 31);
    assert_eq!(dir.lookup(b"zzz").unwrap(), 40);
    assert!(dir.lookup(ABSENT).unwrap_err().is_not_found());
    // 哈希大于所有节点项
    assert!(dir.lookup(b"zzzz").unwrap_err().is_not_found());
}

#[test]
fn test_node_directory() {
    init_logger();
    assert_eq!(da_hashname(N1), da_hashname(N2));
    assert!(da_hashname(b"zzzz") > da_hashname(b"zzz"));

    for geo in [Geometry::V4, Geometry::V5] {
        let vol = node_image(geo).volume();
        let inode = load_inode(&vol, ROOT_INO);
        let mut dir = open(&vol, &inode);
        assert!(matches!(dir, DirectoryIterator::Node(_)));
        check_node_like(&mut dir);
    }
}

#[test]
fn test_node_leaf_chain_loop_detected() {
    init_logger();
    let geo = Geometry::V4;
    let mut img = node_image(geo);
    // leaf0 与 leaf1 互相指向成环，leaf1 末项与 N1 同哈希
    let leaf_start = geo.leaf_start_fsb() as u32;
    let leaf1 = img.block_mut(24);
    put_u32(leaf1, 0, leaf_start + 1);
    put_u32(leaf1, 16 + 8, da_hashname(N1));
    put_u32(img.block_mut(23), 4, leaf_start + 2);
    let vol = img.volume();
    let inode = load_inode(&vol, ROOT_INO);
    let mut dir = open(&vol, &inode);
    let err = dir.lookup(ABSENT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corrupted);
    assert_eq!(err.message(), "directory leaf chain loops");
}

#[test]
fn test_node_leaf_back_pointer_checked() {
    init_logger();
    let geo = Geometry::V4;
    let mut img = node_image(geo);
    // leaf1.back 不再指向 leaf0
    put_u32(img.block_mut(24), 4, 0);
    let vol = img.volume();
    let inode = load_inode(&vol, ROOT_INO);
    let mut dir = open(&vol, &inode);
    assert_eq!(dir.lookup(b"a").unwrap(), 10);
    assert_eq!(dir.lookup(N2).unwrap_err().kind(), ErrorKind::Corrupted);
}

#[test]
fn test_node_root_must_be_index_block() {
    init_logger();
    let geo = Geometry::V4;
    let mut img = node_image(geo);
    // 根块换成数据块
    let data = img.block_mut(20).to_vec();
    img.put_block(22, &data);
    let vol = img.volume();
    let inode = load_inode(&vol, ROOT_INO);
    assert!(DirectoryIterator::open(DirContext::new(&vol, &inode)).is_none());
}

// ---------------------------------------------------------------------------
// B+树格式

const BMBT_LEAF_FSB: u64 = 30;

fn tree_image(geo: Geometry) -> Image {
    let mut img = Image::new(geo);
    let extents = node_blocks(geo, &mut img);

    // 叶子级 bmbt 块
    let mut bmbt = vec![0u8; BLOCK_SIZE];
    let (magic, hdr_len) = if geo.v5 {
        (XFS_BMAP_CRC_MAGIC, 72)
    } else {
        (XFS_BMAP_MAGIC, 24)
    };
    put_u32(&mut bmbt, 0, magic);
    put_u16(&mut bmbt, 4, 0);
    put_u16(&mut bmbt, 6, extents.len() as u16);
    for (i, ext) in extents.iter().enumerate() {
        let off = hdr_len + i * 16;
        bmbt[off..off + 16].copy_from_slice(&ext.encode());
    }
    if geo.v5 {
        put_u64(&mut bmbt, 24, (BMBT_LEAF_FSB << BLOCK_LOG) >> 9);
        bmbt[40..56].copy_from_slice(&FS_UUID);
        put_u64(&mut bmbt, 56, ROOT_INO);
        assert!(update_cksum(&mut bmbt, 64));
    }
    img.put_block(BMBT_LEAF_FSB, &bmbt);

    // inode 内的根：level 1，一条记录
    let fork_len = INODE_SIZE - geo.core_size();
    let maxrecs = (fork_len - 4) / 16;
    let mut fork = vec![0u8; fork_len];
    put_u16(&mut fork, 0, 1);
    put_u16(&mut fork, 2, 1);
    put_u64(&mut fork, 4, 0);
    put_u64(&mut fork, 4 + maxrecs * 8, BMBT_LEAF_FSB);

    img.put_inode(
        ROOT_INO,
        &InodeSpec {
            format: XFS_DINODE_FMT_BTREE,
            size: BLOCK_SIZE as u64,
            nblocks: 6,
            nextents: extents.len() as u32,
            fork,
        },
    );
    img
}

#[test]
fn test_tree_directory() {
    init_logger();
    for geo in [Geometry::V4, Geometry::V5] {
        let vol = tree_image(geo).volume();
        let inode = load_inode(&vol, ROOT_INO);
        let mut dir = open(&vol, &inode);
        assert!(matches!(dir, DirectoryIterator::Tree(_)));
        assert_eq!(dir.format_name(), "tree");
        check_node_like(&mut dir);
    }
}

#[test]
fn test_tree_bad_bmbt_rejected() {
    init_logger();
    let geo = Geometry::V5;
    let mut img = tree_image(geo);
    img.block_mut(BMBT_LEAF_FSB)[80] ^= 0xff;
    let vol = img.volume();
    let inode = load_inode(&vol, ROOT_INO);
    assert!(DirectoryIterator::open(DirContext::new(&vol, &inode)).is_none());
}

#[test]
fn test_tree_extent_count_mismatch_rejected() {
    init_logger();
    let geo = Geometry::V4;
    let mut img = tree_image(geo);
    // bmbt 叶子只声明 2 条记录，inode 记录 3 个 extent
    put_u16(img.block_mut(BMBT_LEAF_FSB), 6, 2);
    let vol = img.volume();
    let inode = load_inode(&vol, ROOT_INO);
    assert!(DirectoryIterator::open(DirContext::new(&vol, &inode)).is_none());
}

/// 所有指针都指向同一个子块的 B+树：根 level 2 → 同一个索引块 → 同一个叶子
fn shared_child_tree(nblocks: u64, nextents: u32) -> Image {
    let geo = Geometry::V4;
    let mut img = Image::new(geo);

    let mut leaf = vec![0u8; BLOCK_SIZE];
    put_u32(&mut leaf, 0, XFS_BMAP_MAGIC);
    put_u16(&mut leaf, 4, 0);
    put_u16(&mut leaf, 6, 1);
    leaf[24..40].copy_from_slice(&extent(0, 20, 1).encode());
    img.put_block(BMBT_LEAF_FSB, &leaf);

    let node_fsb = BMBT_LEAF_FSB + 1;
    let node_maxrecs = (BLOCK_SIZE - 24) / 16;
    let mut node = vec![0u8; BLOCK_SIZE];
    put_u32(&mut node, 0, XFS_BMAP_MAGIC);
    put_u16(&mut node, 4, 1);
    put_u16(&mut node, 6, node_maxrecs as u16);
    for i in 0..node_maxrecs {
        put_u64(&mut node, 24 + node_maxrecs * 8 + i * 8, BMBT_LEAF_FSB);
    }
    img.put_block(node_fsb, &node);

    let fork_len = INODE_SIZE - geo.core_size();
    let maxrecs = (fork_len - 4) / 16;
    let mut fork = vec![0u8; fork_len];
    put_u16(&mut fork, 0, 2);
    put_u16(&mut fork, 2, maxrecs as u16);
    for i in 0..maxrecs {
        put_u64(&mut fork, 4 + maxrecs * 8 + i * 8, node_fsb);
    }

    img.put_inode(
        ROOT_INO,
        &InodeSpec {
            format: XFS_DINODE_FMT_BTREE,
            size: BLOCK_SIZE as u64,
            nblocks,
            nextents,
            fork,
        },
    );
    img
}

#[test]
fn test_tree_shared_children_stop_early() {
    init_logger();
    // 第一组：extent 数先超限；第二组：访问块数先超限
    for (nblocks, nextents) in [(1000, 1), (3, 1000)] {
        let vol = shared_child_tree(nblocks, nextents).volume();
        let inode = load_inode(&vol, ROOT_INO);
        let before = vol.block_device().read_count();
        let err = ExtentTree::new(&vol, &inode).read_all().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
        assert!(vol.block_device().read_count() - before <= 3);
        assert!(DirectoryIterator::open(DirContext::new(&vol, &inode)).is_none());
    }
}

#[test]
fn test_open_dir_rejects_non_directory() {
    init_logger();
    let geo = Geometry::V4;
    let mut img = leaf_image(geo);
    // 改成普通文件
    let start = INODE_BLOCK as usize * BLOCK_SIZE;
    put_u16(&mut img.data[start..], 2, 0o100644);
    let vol = img.volume();
    let inode = load_inode(&vol, ROOT_INO);
    assert_eq!(
        vol.open_dir(&inode).err().unwrap().kind(),
        ErrorKind::InvalidInput
    );
}
