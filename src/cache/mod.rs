//! xattr 块去重缓存模块
//!
//! 进程级（挂载级）索引：`hash -> {候选块地址}`，让内容相同的属性集合
//! 只在磁盘上存一份。
//!
//! # 主要组件
//!
//! - [`DedupCache`] - 去重缓存，使用 lru crate 提供容量上限和 LRU 驱逐
//! - [`CacheEntry`] - 一次查找返回的候选项（带身份序号）
//! - [`InsertOutcome`] - 插入结果
//! - [`CacheStats`] - 缓存统计信息
//!
//! # 语义
//!
//! 缓存只是建议性的：未命中只意味着错过一次去重机会，不会影响正确性。
//! 查找结果可能已经过时，调用方必须在持有块锁时用
//! [`DedupCache::is_live()`] 重新确认候选项，确认失败就重新查找。
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use lwext4_xattr::cache::DedupCache;
//!
//! let cache = DedupCache::new(10);
//! cache.insert(hash, lba)?;
//!
//! for entry in cache.candidates(hash)? {
//!     let _guard = locks.lock(entry.block())?;
//!     if !cache.is_live(&entry) {
//!         // 被并发删除，重新查找
//!     }
//! }
//! ```

mod mb_cache;

pub use mb_cache::{CacheEntry, CacheStats, Candidates, DedupCache, InsertOutcome};
