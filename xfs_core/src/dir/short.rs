//! 短格式目录（目录项内联在 inode 数据 fork 中）
//!
//! ```text
//! header: count(1) | i8count(1) | parent(4 或 8)
//! entry:  namelen(1) | offset(2) | name | [ftype(1)] | inumber(4 或 8)
//! ```
//!
//! `i8count` 非零时所有 inode 号都按 8 字节存放。
//! `.` 和 `..` 不占磁盘空间，枚举时依次合成。

use super::{copy_name, end_of_directory, entry_not_found, DirContext, DirCursor, DirOps};
use crate::{
    block::BlockDevice,
    bytes::{be_u32, be_u64, slice, u8_at},
    error::{Error, ErrorKind, Result},
};
use log::debug;

/// 游标位置：1 为 `.`，2 为 `..`，3 起为第 0 个磁盘目录项
const FIRST_ENTRY_POS: u64 = 3;

/// 已校验的短格式目录
pub struct ShortDirectory<'a> {
    data: &'a [u8],
    ino: u64,
    parent: u64,
    count: usize,
    inum_size: usize,
    first_entry: usize,
    has_ftype: bool,
    cursor: DirCursor,
}

struct ShortEntry<'b> {
    name: &'b [u8],
    ino: u64,
    next: usize,
}

fn read_inum(data: &[u8], off: usize, size: usize) -> Result<u64> {
    if size == 8 {
        be_u64(data, off)
    } else {
        be_u32(data, off).map(u64::from)
    }
}

impl<'a> ShortDirectory<'a> {
    /// 解析 inode 中的短格式头部，并确认所有目录项都落在 inode 大小之内
    pub fn init<D: BlockDevice>(ctx: DirContext<'a, D>) -> Result<Self> {
        let inode = ctx.inode();
        let fork = inode.data_fork();
        let size = usize::try_from(inode.size())
            .ok()
            .filter(|&size| size <= fork.len())
            .ok_or(Error::new(ErrorKind::Corrupted, "short form directory exceeds data fork"))?;
        let data = &fork[..size];

        let count = u8_at(data, 0)? as usize;
        let inum_size = if u8_at(data, 1)? == 0 { 4 } else { 8 };
        let parent = read_inum(data, 2, inum_size)?;

        let dir = Self {
            data,
            ino: inode.ino(),
            parent,
            count,
            inum_size,
            first_entry: 2 + inum_size,
            has_ftype: ctx.has_ftype(),
            cursor: DirCursor::START,
        };

        let mut off = dir.first_entry;
        for _ in 0..count {
            off = dir.entry_at(off)?.next;
        }

        debug!(
            "ShortDirectory::init: ino={} count={} parent={}",
            dir.ino, count, parent
        );
        Ok(dir)
    }

    /// 父目录 inode 号
    pub fn parent(&self) -> u64 {
        self.parent
    }

    /// 磁盘目录项数（不含 `.` 和 `..`）
    pub fn count(&self) -> usize {
        self.count
    }

    fn entry_at(&self, off: usize) -> Result<ShortEntry<'a>> {
        let data = self.data;
        let namelen = u8_at(data, off)? as usize;
        if namelen == 0 {
            return Err(Error::new(ErrorKind::Corrupted, "zero length name"));
        }
        let name = slice(data, off + 3, namelen)?;
        let inum_off = off + 3 + namelen + self.has_ftype as usize;
        let ino = read_inum(data, inum_off, self.inum_size)?;
        Ok(ShortEntry {
            name,
            ino,
            next: inum_off + self.inum_size,
        })
    }
}

impl DirOps for ShortDirectory<'_> {
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
        let pos = cursor.raw().saturating_add(1);
        let (entry_name, ino): (&[u8], u64) = match pos {
            1 => (&b"."[..], self.ino),
            2 => (&b".."[..], self.parent),
            _ => {
                let index = pos - FIRST_ENTRY_POS;
                if index >= self.count as u64 {
                    return Err(end_of_directory());
                }
                let mut off = self.first_entry;
                for _ in 0..index {
                    off = self.entry_at(off)?.next;
                }
                let entry = self.entry_at(off)?;
                (entry.name, entry.ino)
            }
        };
        let len = copy_name(name, entry_name)?;
        Ok((DirCursor::new(pos), len, ino))
    }

    fn lookup(&mut self, name: &[u8]) -> Result<u64> {
        match name {
            b"." => return Ok(self.ino),
            b".." => return Ok(self.parent),
            _ => {}
        }
        let mut off = self.first_entry;
        for _ in 0..self.count {
            let entry = self.entry_at(off)?;
            if entry.name == name {
                return Ok(entry.ino);
            }
            off = entry.next;
        }
        Err(entry_not_found())
    }
}
