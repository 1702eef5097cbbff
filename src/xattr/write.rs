//! xattr 块内编辑
//!
//! 只修改内存中的暂存副本。entry 表和值区在每次编辑后都保持连续：
//! 插入或删除 entry 时移动后面的 entry，删除值时把更低处的值整体
//! 上移并修正它们的偏移。每次编辑都会重新计算受影响 entry 的哈希和
//! 块哈希。

use super::block::XattrBlock;
use crate::{
    consts::*,
    error::{Error, ErrorKind, Result},
    types::{xattr_len, xattr_size, XattrEntry},
};

impl XattrBlock {
    /// 在第 `pos` 个 entry 之前插入新 entry（`pos == len()` 时追加）
    ///
    /// 空间不足时返回 `NoSpace`，块保持不变。
    pub fn insert(&mut self, pos: usize, name_index: u8, name: &[u8], value: &[u8]) -> Result<()> {
        if name.len() > EXT4_XATTR_NAME_MAX {
            return Err(Error::new(ErrorKind::OutOfRange, "xattr name too long"));
        }
        // 索引 0 的空名 entry 与结束标记无法区分
        if name_index == 0 && name.is_empty() {
            return Err(Error::new(ErrorKind::InvalidInput, "empty name in index 0"));
        }
        if pos > self.entries.len() {
            return Err(Error::new(ErrorKind::InvalidInput, "insert position out of range"));
        }

        let entry_len = xattr_len(name.len());
        let value_len = xattr_size(value.len());
        if entry_len + value_len > self.free_space() {
            return Err(Error::new(ErrorKind::NoSpace, "no space in xattr block"));
        }

        // 腾出 entry 位置，后面的 entry 和结束标记一起后移
        let at = self.entries.get(pos).map_or(self.last, |e| e.offset);
        self.data.copy_within(at..self.last, at + entry_len);
        let new_last = self.last + entry_len;
        self.data[new_last..new_last + EXT4_XATTR_SENTINEL_SIZE].fill(0);

        let mut entry = XattrEntry {
            e_name_len: name.len() as u8,
            e_name_index: name_index,
            ..XattrEntry::default()
        };
        if !value.is_empty() {
            entry.e_value_offs = self.place_value(value) as u16;
            entry.e_value_size = value.len() as u32;
        }

        self.data[at..at + entry_len].fill(0);
        entry.encode(&mut self.data[at..at + EXT4_XATTR_ENTRY_SIZE]);
        let name_start = at + EXT4_XATTR_ENTRY_SIZE;
        self.data[name_start..name_start + name.len()].copy_from_slice(name);

        self.reindex();
        self.rehash_entry(pos);
        self.rehash();
        Ok(())
    }

    /// 替换第 i 个 entry 的值
    ///
    /// 对齐后大小不变时直接覆盖，否则先删除旧值再放入新值。
    pub fn replace_value(&mut self, i: usize, value: &[u8]) -> Result<()> {
        let old = self.entries[i].entry;
        let old_len = if old.has_local_value() {
            xattr_size(old.e_value_size as usize)
        } else {
            0
        };
        let new_len = xattr_size(value.len());

        if old.has_local_value() && !value.is_empty() && old_len == new_len {
            let offs = old.e_value_offs as usize;
            self.data[offs..offs + new_len].fill(0);
            self.data[offs..offs + value.len()].copy_from_slice(value);
            self.entries[i].entry.e_value_size = value.len() as u32;
        } else {
            if new_len > self.free_space() + old_len {
                return Err(Error::new(ErrorKind::NoSpace, "no space in xattr block"));
            }
            self.remove_value(i);
            if !value.is_empty() {
                let offs = self.place_value(value);
                let entry = &mut self.entries[i].entry;
                entry.e_value_offs = offs as u16;
                entry.e_value_size = value.len() as u32;
                self.min_offs = offs;
            }
        }

        self.rehash_entry(i);
        self.rehash();
        Ok(())
    }

    /// 删除第 i 个 entry 及其值
    pub fn remove(&mut self, i: usize) {
        self.remove_value(i);

        let offset = self.entries[i].offset;
        let entry_len = self.entries[i].entry.disk_len();
        let end = self.last + EXT4_XATTR_SENTINEL_SIZE;
        self.data.copy_within(offset + entry_len..end, offset);
        self.data[end - entry_len..end].fill(0);

        self.reindex();
        self.rehash();
    }

    /// 把值写到值区最低处，返回偏移（调用方已检查空间）
    fn place_value(&mut self, value: &[u8]) -> usize {
        let offs = self.min_offs - xattr_size(value.len());
        self.data[offs..self.min_offs].fill(0);
        self.data[offs..offs + value.len()].copy_from_slice(value);
        offs
    }

    /// 删除第 i 个 entry 的值并压紧值区
    fn remove_value(&mut self, i: usize) {
        let entry = self.entries[i].entry;
        if !entry.has_local_value() {
            return;
        }

        let offs = entry.e_value_offs as usize;
        let size = xattr_size(entry.e_value_size as usize);
        let min_offs = self.min_offs;

        // 更低处的值整体上移 size 字节
        self.data.copy_within(min_offs..offs, min_offs + size);
        self.data[min_offs..min_offs + size].fill(0);

        for j in 0..self.entries.len() {
            let other = &mut self.entries[j].entry;
            if j == i {
                other.e_value_offs = 0;
                other.e_value_size = 0;
            } else if other.has_local_value() && (other.e_value_offs as usize) < offs {
                other.e_value_offs += size as u16;
            } else {
                continue;
            }
            self.store_entry(j);
        }
        self.min_offs += size;
    }
}
