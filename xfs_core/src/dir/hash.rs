//! 名字哈希与哈希数组查找

use crate::error::Result;

/// XFS 目录/属性名字哈希（`xfs_da_hashname`）
///
/// 每 4 字节折叠一次，上一步结果循环左移 28 位后异或。
pub fn da_hashname(name: &[u8]) -> u32 {
    let mut hash: u32 = 0;
    let mut chunks = name.chunks_exact(4);
    for c in &mut chunks {
        hash = ((c[0] as u32) << 21)
            ^ ((c[1] as u32) << 14)
            ^ ((c[2] as u32) << 7)
            ^ (c[3] as u32)
            ^ hash.rotate_left(7 * 4);
    }

    match *chunks.remainder() {
        [a, b, c] => ((a as u32) << 14) ^ ((b as u32) << 7) ^ (c as u32) ^ hash.rotate_left(7 * 3),
        [a, b] => ((a as u32) << 7) ^ (b as u32) ^ hash.rotate_left(7 * 2),
        [a] => (a as u32) ^ hash.rotate_left(7),
        _ => hash,
    }
}

/// 升序哈希数组的下界：第一个哈希值不小于 `target` 的下标
///
/// 全部小于 `target` 时返回 `count`。`hash_at` 负责带边界检查地读取第 i 项。
pub fn hash_lower_bound<F>(count: usize, mut hash_at: F, target: u32) -> Result<usize>
where
    F: FnMut(usize) -> Result<u32>,
{
    let mut left = 0;
    let mut right = count;
    while left < right {
        let mid = left + (right - left) / 2;
        if hash_at(mid)? < target {
            left = mid + 1;
        } else {
            right = mid;
        }
    }
    Ok(left)
}

/// 叶子项 address 解码为块内字节偏移
///
/// 磁盘上记录的是 字节地址 / 8，按目录块大小取模。
pub fn address_to_offset(address: u32, dir_block_size: usize) -> usize {
    ((address as u64 * 8) % dir_block_size as u64) as usize
}

/// 叶子项 address 解码为目录数据空间中的目录块序号
pub fn address_to_block(address: u32, dir_block_log: u32) -> u64 {
    (address as u64 * 8) >> dir_block_log
}
