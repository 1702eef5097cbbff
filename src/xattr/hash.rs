//! xattr 哈希计算
//!
//! entry 哈希覆盖名称和值，块哈希覆盖所有 entry 哈希，作为去重缓存的键。
//! 三种哈希都是同一个旋转异或步骤，只是移位不同。

use super::block::XattrBlock;
use crate::consts::*;
use byteorder::{ByteOrder, LittleEndian};

#[inline]
fn step(hash: u32, shift: u32, x: u32) -> u32 {
    (hash << shift) ^ (hash >> (32 - shift)) ^ x
}

/// 计算单个 entry 的哈希
///
/// 名称按无符号字节处理；值按小端 u32 逐字处理，最后不满 4 字节的部分
/// 补零（与磁盘上的对齐填充一致）。
pub fn hash_entry(name: &[u8], value: &[u8]) -> u32 {
    let mut hash = name
        .iter()
        .fold(0u32, |h, &b| step(h, NAME_HASH_SHIFT, b as u32));

    let mut words = value.chunks_exact(4);
    for word in &mut words {
        hash = step(hash, VALUE_HASH_SHIFT, LittleEndian::read_u32(word));
    }
    let tail = words.remainder();
    if !tail.is_empty() {
        let mut word = [0u8; 4];
        word[..tail.len()].copy_from_slice(tail);
        hash = step(hash, VALUE_HASH_SHIFT, LittleEndian::read_u32(&word));
    }

    hash
}

/// 由 entry 哈希序列计算块哈希
///
/// 任何一个 entry 哈希为 0 时整个块哈希为 0，该块不参与共享。
pub fn hash_block<I: IntoIterator<Item = u32>>(entry_hashes: I) -> u32 {
    let mut hash = 0u32;
    for entry_hash in entry_hashes {
        if entry_hash == 0 {
            return 0;
        }
        hash = step(hash, BLOCK_HASH_SHIFT, entry_hash);
    }
    hash
}

impl XattrBlock {
    /// 重新计算第 i 个 entry 的哈希并写回
    pub(super) fn rehash_entry(&mut self, i: usize) {
        let hash = hash_entry(self.name(i), self.value(i));
        self.entries[i].entry.e_hash = hash;
        self.store_entry(i);
    }

    /// 由已存储的 entry 哈希重新计算块哈希并写回头部
    pub fn rehash(&mut self) {
        let hash = hash_block(self.entries.iter().map(|e| e.entry.e_hash));
        self.set_hash(hash);
    }
}
