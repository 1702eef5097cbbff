//! 去重缓存实现（使用 lru crate）
//!
//! # 架构
//!
//! ```text
//! struct Inner {
//!     lru: LruCache<(hash, block), seq>,     // 容量上限 + 访问顺序
//!     index: BTreeMap<(hash, seq), block>,    // 按 hash 范围查找候选
//!     next_seq: u64,
//! }
//! ```
//!
//! 每个 entry 在插入时得到一个单调递增的序号。同一 hash 下的候选按
//! 序号（插入顺序）遍历；`is_live()` 比较序号，所以被删除后又重新插入的
//! 块不会被误认为是旧的候选项。

use crate::{
    consts::*,
    error::{Error, ErrorKind, Result},
};
use core::num::NonZeroUsize;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// 查找次数（find_first）
    pub lookups: u64,
    /// 命中次数（touch）
    pub hits: u64,
    /// 插入次数
    pub inserts: u64,
    /// 插入时已存在的次数
    pub already_present: u64,
    /// 因容量驱逐的次数
    pub evictions: u64,
    /// 显式删除次数
    pub removals: u64,
    /// `is_live()` 发现候选项已失效的次数
    pub stale: u64,
}

/// 缓存候选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    hash: u32,
    block: u64,
    seq: u64,
}

impl CacheEntry {
    /// 块哈希
    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// 块地址
    pub fn block(&self) -> u64 {
        self.block
    }
}

/// 插入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// 新插入
    Inserted,
    /// `(hash, block)` 已经在缓存中
    AlreadyPresent,
    /// hash 为 0，块不参与共享，未插入
    Unshareable,
}

struct Inner {
    lru: LruCache<(u32, u64), u64>,
    index: BTreeMap<(u32, u64), u64>,
    next_seq: u64,
    stats: CacheStats,
}

impl Inner {
    fn first_from(&self, hash: u32, seq: u64) -> Option<CacheEntry> {
        self.index
            .range((hash, seq)..=(hash, u64::MAX))
            .next()
            .map(|(&(hash, seq), &block)| CacheEntry { hash, block, seq })
    }
}

/// xattr 块去重缓存
///
/// 在挂载时创建，卸载时通过 [`DedupCache::destroy()`] 销毁；销毁后所有
/// 插入和查找都返回 `InvalidState`。内部用一把互斥锁保护，该锁只在
/// 单次调用内短暂持有，可以在持有块锁时调用，反之不行。
pub struct DedupCache {
    inner: Mutex<Option<Inner>>,
    capacity: usize,
}

impl DedupCache {
    /// 按哈希桶位数创建缓存，容量 = `1 << (bucket_bits + 4)`
    pub fn new(bucket_bits: u32) -> Self {
        let bits = bucket_bits.min(24) + MB_CACHE_ENTRIES_PER_BUCKET_BITS;
        Self::with_capacity(1usize << bits)
    }

    /// 按 entry 数创建缓存
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Some(Inner {
                lru: LruCache::new(cap),
                index: BTreeMap::new(),
                next_seq: 1,
                stats: CacheStats::default(),
            })),
            capacity: cap.get(),
        }
    }

    fn torn_down() -> Error {
        Error::new(ErrorKind::InvalidState, "xattr cache has been destroyed")
    }

    /// 插入 `(hash, block)`
    ///
    /// 重复插入返回 [`InsertOutcome::AlreadyPresent`]，不是错误。
    /// 缓存满时驱逐最久未使用的 entry。
    pub fn insert(&self, hash: u32, block: u64) -> Result<InsertOutcome> {
        let mut guard = self.inner.lock();
        let inner = guard.as_mut().ok_or_else(Self::torn_down)?;

        if hash == 0 {
            return Ok(InsertOutcome::Unshareable);
        }

        if inner.lru.contains(&(hash, block)) {
            inner.stats.already_present += 1;
            log::trace!("[MBCACHE] block {:#x} hash {:#010x} already in cache", block, hash);
            return Ok(InsertOutcome::AlreadyPresent);
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;

        if let Some(((old_hash, old_block), old_seq)) = inner.lru.push((hash, block), seq) {
            inner.index.remove(&(old_hash, old_seq));
            inner.stats.evictions += 1;
            log::debug!(
                "[MBCACHE] evicted block {:#x} hash {:#010x}",
                old_block,
                old_hash
            );
        }
        inner.index.insert((hash, seq), block);
        inner.stats.inserts += 1;

        log::debug!("[MBCACHE] inserting block {:#x} [{:#010x}]", block, hash);
        Ok(InsertOutcome::Inserted)
    }

    /// 查找某个 hash 的第一个候选项
    pub fn find_first(&self, hash: u32) -> Result<Option<CacheEntry>> {
        let mut guard = self.inner.lock();
        let inner = guard.as_mut().ok_or_else(Self::torn_down)?;
        inner.stats.lookups += 1;
        if hash == 0 {
            return Ok(None);
        }
        Ok(inner.first_from(hash, 0))
    }

    /// 查找 `entry` 之后的下一个同 hash 候选项
    pub fn find_next(&self, entry: &CacheEntry) -> Result<Option<CacheEntry>> {
        let guard = self.inner.lock();
        let inner = guard.as_ref().ok_or_else(Self::torn_down)?;
        Ok(inner.first_from(entry.hash, entry.seq + 1))
    }

    /// 按插入顺序遍历某个 hash 的候选项
    ///
    /// 迭代器不持有缓存锁；每一步都重新查询，所以能看到并发的插入和删除。
    /// 缓存在遍历中途被销毁时迭代提前结束。
    pub fn candidates(&self, hash: u32) -> Result<Candidates<'_>> {
        let first = self.find_first(hash)?;
        Ok(Candidates {
            cache: self,
            next: first,
        })
    }

    /// 候选项是否仍然有效（未被删除或驱逐）
    pub fn is_live(&self, entry: &CacheEntry) -> bool {
        let mut guard = self.inner.lock();
        let Some(inner) = guard.as_mut() else {
            return false;
        };
        let live = inner.lru.peek(&(entry.hash, entry.block)) == Some(&entry.seq);
        if !live {
            inner.stats.stale += 1;
        }
        live
    }

    /// 标记候选项被使用，提升其 LRU 位置
    pub fn touch(&self, entry: &CacheEntry) {
        let mut guard = self.inner.lock();
        if let Some(inner) = guard.as_mut() {
            if inner.lru.get(&(entry.hash, entry.block)) == Some(&entry.seq) {
                inner.stats.hits += 1;
            }
        }
    }

    /// 删除 `(hash, block)`
    ///
    /// 返回是否确实删除了一个 entry。已销毁的缓存返回 false。
    pub fn remove(&self, hash: u32, block: u64) -> bool {
        let mut guard = self.inner.lock();
        let Some(inner) = guard.as_mut() else {
            return false;
        };
        match inner.lru.pop(&(hash, block)) {
            Some(seq) => {
                inner.index.remove(&(hash, seq));
                inner.stats.removals += 1;
                log::debug!("[MBCACHE] removed block {:#x} [{:#010x}]", block, hash);
                true
            }
            None => false,
        }
    }

    /// 当前 entry 数
    pub fn len(&self) -> usize {
        self.inner.lock().as_ref().map_or(0, |inner| inner.lru.len())
    }

    /// 缓存是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 容量
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 统计信息
    pub fn stats(&self) -> CacheStats {
        self.inner
            .lock()
            .as_ref()
            .map(|inner| inner.stats.clone())
            .unwrap_or_default()
    }

    /// 销毁缓存（卸载时调用）
    pub fn destroy(&self) {
        let mut guard = self.inner.lock();
        if let Some(inner) = guard.take() {
            log::debug!("[MBCACHE] destroyed with {} entries", inner.lru.len());
        }
    }

    /// 是否已销毁
    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().is_none()
    }
}

/// 候选项迭代器，见 [`DedupCache::candidates()`]
pub struct Candidates<'a> {
    cache: &'a DedupCache,
    next: Option<CacheEntry>,
}

impl Iterator for Candidates<'_> {
    type Item = CacheEntry;

    fn next(&mut self) -> Option<CacheEntry> {
        let current = self.next.take()?;
        self.next = self.cache.find_next(&current).ok().flatten();
        Some(current)
    }
}
