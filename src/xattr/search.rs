//! xattr entry 查找
//!
//! entry 表按 `(name_index, name_len, name)` 升序排列，线性扫描到第一个
//! 不小于探测键的 entry 即可确定结果。

use super::block::XattrBlock;
use core::cmp::Ordering;

/// 查找结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    /// 找到，值为 entry 下标
    Found(usize),
    /// 未找到，新 entry 应插在该下标之前
    InsertBefore(usize),
    /// 未找到，新 entry 应追加到末尾
    End,
}

impl SearchResult {
    /// 找到时返回下标
    pub fn found(self) -> Option<usize> {
        match self {
            SearchResult::Found(i) => Some(i),
            _ => None,
        }
    }

    /// 插入位置（找到时为该 entry 自身的位置）
    pub fn position(self, len: usize) -> usize {
        match self {
            SearchResult::Found(i) | SearchResult::InsertBefore(i) => i,
            SearchResult::End => len,
        }
    }
}

/// 比较两个排序键
#[inline]
pub fn compare_key(index_a: u8, name_a: &[u8], index_b: u8, name_b: &[u8]) -> Ordering {
    index_a
        .cmp(&index_b)
        .then(name_a.len().cmp(&name_b.len()))
        .then_with(|| name_a.cmp(name_b))
}

/// 在块中查找 `(name_index, name)`
pub fn find_entry(block: &XattrBlock, name_index: u8, name: &[u8]) -> SearchResult {
    for (i, e) in block.entries().iter().enumerate() {
        match compare_key(name_index, name, e.entry.e_name_index, block.name(i)) {
            Ordering::Equal => return SearchResult::Found(i),
            Ordering::Less => return SearchResult::InsertBefore(i),
            Ordering::Greater => {}
        }
    }
    SearchResult::End
}

impl XattrBlock {
    /// 见 [`find_entry`]
    pub fn find(&self, name_index: u8, name: &[u8]) -> SearchResult {
        find_entry(self, name_index, name)
    }
}
