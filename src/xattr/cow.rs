//! 写时复制
//!
//! 修改一个已有块之前先通过 [`CowBlock::acquire_mutable()`] 取得独占的
//! 暂存副本：引用计数为 1 的块原地编辑（先从去重缓存中摘除），共享的块
//! 复制一份，原块对其他所有者保持不变。

use super::block::XattrBlock;
use crate::{block::BlockLocks, cache::DedupCache, error::Result};

/// 提供块锁、去重缓存和块读取的存储后端
pub(crate) trait BlockSource {
    fn block_locks(&self) -> &BlockLocks;

    fn dedup_cache(&self) -> &DedupCache;

    /// 读取并解析块（调用方已持有该块的锁）
    fn read_locked(&self, lba: u64) -> Result<XattrBlock>;
}

/// 暂存副本的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOrigin {
    /// 所有者原来没有块
    Fresh,
    /// 原块只有一个引用，编辑结果写回原位置
    ///
    /// `hash` 是原块的哈希，放弃编辑时用它恢复缓存项。
    InPlace {
        /// 原块地址
        lba: u64,
        /// 原块哈希
        hash: u32,
    },
    /// 原块被共享，编辑的是它的副本
    Cloned(u64),
}

/// 所有者当前指向的块，尚未取得修改权
#[derive(Debug)]
pub struct CowBlock {
    /// 块地址
    pub lba: u64,
    /// 加锁前读到的内容
    pub block: XattrBlock,
}

/// 可以自由修改的暂存块
#[derive(Debug)]
pub struct OwnedBlock {
    origin: BlockOrigin,
    block: XattrBlock,
}

impl CowBlock {
    /// 包装已读取的块
    pub fn new(lba: u64, block: XattrBlock) -> Self {
        Self { lba, block }
    }

    /// 取得修改权
    ///
    /// 在块锁下重新读取块，因为在加锁前引用计数可能已被并发的去重
    /// 增加。引用计数为 1 时在同一把锁下从缓存中摘除该块，之后的查找
    /// 不会再把它交给别的所有者。
    pub(crate) fn acquire_mutable<S: BlockSource>(self, source: &S) -> Result<OwnedBlock> {
        let _guard = source.block_locks().lock(self.lba)?;
        let mut block = source.read_locked(self.lba)?;

        if block.refcount() == 1 {
            let hash = block.hash();
            source.dedup_cache().remove(hash, self.lba);
            log::debug!("[XATTR] modifying block {} in place", self.lba);
            Ok(OwnedBlock {
                origin: BlockOrigin::InPlace {
                    lba: self.lba,
                    hash,
                },
                block,
            })
        } else {
            log::debug!(
                "[XATTR] cloning shared block {} (refcount={})",
                self.lba,
                block.refcount()
            );
            block.set_refcount(1);
            Ok(OwnedBlock {
                origin: BlockOrigin::Cloned(self.lba),
                block,
            })
        }
    }
}

impl OwnedBlock {
    /// 新的空块
    pub fn fresh(block_size: usize) -> Self {
        Self {
            origin: BlockOrigin::Fresh,
            block: XattrBlock::new(block_size),
        }
    }

    /// 暂存块的来源
    pub fn origin(&self) -> BlockOrigin {
        self.origin
    }

    /// 暂存块
    pub fn block(&self) -> &XattrBlock {
        &self.block
    }

    /// 暂存块（可变）
    pub fn block_mut(&mut self) -> &mut XattrBlock {
        &mut self.block
    }

    /// 放弃编辑
    ///
    /// 原地编辑的块在磁盘上没有变化，把它重新放回缓存。
    pub(crate) fn abandon(self, cache: &DedupCache) {
        if let BlockOrigin::InPlace { lba, hash } = self.origin {
            if let Err(e) = cache.insert(hash, lba) {
                log::warn!("[XATTR] failed to restore cache entry for block {}: {}", lba, e);
            }
        }
    }
}
