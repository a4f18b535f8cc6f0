//! V5 元数据校验和
//!
//! XFS 对整个元数据块计算 CRC32C，计算时校验和字段按 0 处理，
//! 结果以小端存放在块内固定偏移处。

/// 计算 `buf` 的校验和，`crc_offset` 处的 4 字节按 0 参与计算
pub fn compute_cksum(buf: &[u8], crc_offset: usize) -> Option<u32> {
    let end = crc_offset.checked_add(4)?;
    if end > buf.len() {
        return None;
    }
    let crc = crc32c::crc32c(&buf[..crc_offset]);
    let crc = crc32c::crc32c_append(crc, &[0u8; 4]);
    Some(crc32c::crc32c_append(crc, &buf[end..]))
}

/// 校验 `buf` 中存放的校验和
pub fn verify_cksum(buf: &[u8], crc_offset: usize) -> bool {
    let Some(expected) = compute_cksum(buf, crc_offset) else {
        return false;
    };
    let stored = u32::from_le_bytes([
        buf[crc_offset],
        buf[crc_offset + 1],
        buf[crc_offset + 2],
        buf[crc_offset + 3],
    ]);
    stored == expected
}

/// 计算并写入校验和
pub fn update_cksum(buf: &mut [u8], crc_offset: usize) -> bool {
    match compute_cksum(buf, crc_offset) {
        Some(crc) => {
            buf[crc_offset..crc_offset + 4].copy_from_slice(&crc.to_le_bytes());
            true
        }
        None => false,
    }
}
