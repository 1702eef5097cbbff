//! xattr 公共 API
//!
//! [`XattrStore`] 把块编解码、哈希、去重缓存和写时复制组合成
//! get / list / set / delete_on_destroy 四个操作。
//!
//! # 加锁顺序
//!
//! ```text
//! 所有者读写锁 -> 块锁（同一线程最多一把） -> {设备, 分配器, 缓存} 互斥锁
//! ```
//!
//! get / list 持有所有者读锁，set / delete_on_destroy 持有写锁，直到
//! 操作结束。
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use lwext4_xattr::*;
//! use parking_lot::RwLock;
//!
//! let store = XattrStore::mount(MemDevice::new(4096, 64), BitmapAllocator::new(64, 1), XattrConfig::default())?;
//! let inode = RwLock::new(Inode::new(12));
//!
//! store.set(&inode, EXT4_XATTR_INDEX_USER, b"comment", Some(b"hello"), SetFlags::CREATE)?;
//! let mut buf = [0u8; 16];
//! let len = store.get(&inode, EXT4_XATTR_INDEX_USER, b"comment", Some(&mut buf))?;
//! ```

use super::{
    block::{check_fits, XattrBlock},
    cow::{BlockOrigin, BlockSource, CowBlock, OwnedBlock},
    prefix::{extract_xattr_name, VisibilityPolicy},
    search::SearchResult,
};
use crate::{
    balloc::BlockAllocator,
    block::{BlockDev, BlockDevice, BlockLocks},
    cache::DedupCache,
    consts::EXT4_XATTR_NAME_MAX,
    error::{Error, ErrorKind, Result},
    fs::{XattrConfig, XattrOwner},
    types::{xattr_len, xattr_size},
};
use bitflags::bitflags;
use log::*;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

bitflags! {
    /// set 的标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SetFlags: u32 {
        /// 属性必须不存在
        const CREATE = 0x1;
        /// 属性必须已存在
        const REPLACE = 0x2;
    }
}

/// 一个挂载实例的 xattr 块存储
///
/// 可以通过 `Arc` 在多个线程间共享。
pub struct XattrStore<D: BlockDevice, A: BlockAllocator> {
    bdev: Mutex<BlockDev<D>>,
    balloc: Mutex<A>,
    locks: BlockLocks,
    cache: Arc<DedupCache>,
    config: XattrConfig,
    /// set 成功后释放旧块失败的次数
    release_failures: AtomicU64,
}

impl<D: BlockDevice, A: BlockAllocator> BlockSource for XattrStore<D, A> {
    fn block_locks(&self) -> &BlockLocks {
        &self.locks
    }

    fn dedup_cache(&self) -> &DedupCache {
        &self.cache
    }

    fn read_locked(&self, lba: u64) -> Result<XattrBlock> {
        let data = self.bdev.lock().read_block(lba)?;
        XattrBlock::parse(data, self.block_size()).map_err(|e| {
            error!("[XATTR] corrupted xattr block {}: {}", lba, e);
            e
        })
    }
}

impl<D: BlockDevice, A: BlockAllocator> XattrStore<D, A> {
    /// 挂载：检查配置并创建去重缓存
    pub fn mount(device: D, balloc: A, config: XattrConfig) -> Result<Self> {
        config.validate()?;
        if device.block_size() != config.block_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "device block size does not match config",
            ));
        }

        let cache = Arc::new(DedupCache::new(config.cache_bucket_bits));
        info!(
            "[XATTR] mounted: block_size={}, refcount_max={}, cache capacity={}",
            config.block_size,
            config.refcount_max,
            cache.capacity()
        );

        Ok(Self {
            bdev: Mutex::new(BlockDev::new(device)),
            balloc: Mutex::new(balloc),
            locks: BlockLocks::new(),
            cache,
            config,
            release_failures: AtomicU64::new(0),
        })
    }

    /// 卸载：销毁去重缓存，刷新设备，交还设备和分配器
    ///
    /// 之后通过 [`XattrStore::cache()`] 留下的缓存句柄做的插入和查找都会
    /// 返回 `InvalidState`。
    pub fn unmount(self) -> Result<(D, A)> {
        self.cache.destroy();
        let mut bdev = self.bdev.into_inner();
        bdev.flush()?;
        info!(
            "[XATTR] unmounted: {} reads, {} writes",
            bdev.read_count(),
            bdev.write_count()
        );
        Ok((bdev.into_inner(), self.balloc.into_inner()))
    }

    /// 挂载配置
    pub fn config(&self) -> &XattrConfig {
        &self.config
    }

    /// 去重缓存句柄
    pub fn cache(&self) -> &Arc<DedupCache> {
        &self.cache
    }

    /// 块锁表
    pub fn block_locks(&self) -> &BlockLocks {
        &self.locks
    }

    /// set 已经成功、但旧块没能释放的累计次数
    ///
    /// 每次失败都让旧块多留一个引用，需要离线检查回收。
    pub fn release_failures(&self) -> u64 {
        self.release_failures.load(Ordering::Relaxed)
    }

    /// 借用块设备（诊断和测试用）
    pub fn with_device<R>(&self, f: impl FnOnce(&mut BlockDev<D>) -> R) -> R {
        f(&mut self.bdev.lock())
    }

    /// 借用块分配器
    pub fn with_allocator<R>(&self, f: impl FnOnce(&mut A) -> R) -> R {
        f(&mut self.balloc.lock())
    }

    fn block_size(&self) -> usize {
        self.config.block_size as usize
    }

    /// 读取并校验一个 xattr 块（会短暂持有块锁）
    pub fn read_xattr_block(&self, lba: u64) -> Result<XattrBlock> {
        self.check_pointer(lba)?;
        let _guard = self.locks.lock(lba)?;
        self.read_locked(lba)
    }

    /// 块的当前引用计数
    pub fn block_refcount(&self, lba: u64) -> Result<u32> {
        Ok(self.read_xattr_block(lba)?.refcount())
    }

    /// 获取属性值
    ///
    /// # 参数
    ///
    /// * `owner` - 所有者（持有读锁）
    /// * `name_index` - 命名空间索引
    /// * `name` - 去掉前缀的属性名
    /// * `buf` - None 时只返回值的长度
    ///
    /// # 返回
    ///
    /// 值的长度。没有块或没有该属性时返回 `NotFound`，缓冲区太小时返回
    /// `RangeTooSmall`（错误中带有需要的大小）。
    pub fn get<O: XattrOwner>(
        &self,
        owner: &RwLock<O>,
        name_index: u8,
        name: &[u8],
        buf: Option<&mut [u8]>,
    ) -> Result<usize> {
        if name.len() > EXT4_XATTR_NAME_MAX {
            return Err(Error::new(ErrorKind::OutOfRange, "xattr name too long"));
        }

        let owner = owner.read();
        let lba = owner.xattr_block();
        trace!("[XATTR] get ino={} index={} block={}", owner.ino(), name_index, lba);
        if lba == 0 {
            return Err(Error::new(ErrorKind::NotFound, "no xattr block"));
        }

        let block = self.load_and_cache(lba)?;
        let i = block
            .find(name_index, name)
            .found()
            .ok_or(Error::new(ErrorKind::NotFound, "xattr not found"))?;

        let value = block.value(i);
        if let Some(buf) = buf {
            if value.len() > buf.len() {
                return Err(Error::range_too_small(value.len()));
            }
            buf[..value.len()].copy_from_slice(value);
        }
        Ok(value.len())
    }

    /// 列出所有可见的属性名
    ///
    /// 每个名称以 `prefix + name + '\0'` 的形式输出。`buf` 为 None 时
    /// 只返回需要的总长度；没有块时返回 0。
    pub fn list<O: XattrOwner, P: VisibilityPolicy>(
        &self,
        owner: &RwLock<O>,
        policy: &P,
        buf: Option<&mut [u8]>,
    ) -> Result<usize> {
        let owner = owner.read();
        let lba = owner.xattr_block();
        if lba == 0 {
            return Ok(0);
        }

        let block = self.load_and_cache(lba)?;
        let visible: Vec<(&'static str, &[u8])> = block
            .entries()
            .iter()
            .enumerate()
            .filter_map(|(i, e)| {
                policy
                    .list_prefix(e.entry.e_name_index)
                    .map(|prefix| (prefix, block.name(i)))
            })
            .collect();
        let total: usize = visible
            .iter()
            .map(|(prefix, name)| prefix.len() + name.len() + 1)
            .sum();

        if let Some(buf) = buf {
            if total > buf.len() {
                return Err(Error::range_too_small(total));
            }
            let mut pos = 0;
            for (prefix, name) in visible {
                buf[pos..pos + prefix.len()].copy_from_slice(prefix.as_bytes());
                pos += prefix.len();
                buf[pos..pos + name.len()].copy_from_slice(name);
                pos += name.len();
                buf[pos] = 0;
                pos += 1;
            }
        }
        Ok(total)
    }

    /// 设置或删除属性
    ///
    /// `value` 为 None 时删除。失败时所有者的块指针和磁盘上的块都保持
    /// 调用前的状态。
    ///
    /// # 错误
    ///
    /// - `InvalidInput` - 同时指定了 CREATE 和 REPLACE
    /// - `OutOfRange` - 名称超过 255 字节，或值永远放不进一个块
    /// - `AlreadyExists` - CREATE 但属性已存在
    /// - `NotFound` - REPLACE 或删除时属性不存在
    /// - `NoSpace` - 块内空间不足、设备没有空闲块或超出配额
    pub fn set<O: XattrOwner>(
        &self,
        owner: &RwLock<O>,
        name_index: u8,
        name: &[u8],
        value: Option<&[u8]>,
        flags: SetFlags,
    ) -> Result<()> {
        if flags.contains(SetFlags::CREATE | SetFlags::REPLACE) {
            return Err(Error::new(ErrorKind::InvalidInput, "CREATE and REPLACE are exclusive"));
        }
        if name_index == 0 && name.is_empty() {
            return Err(Error::new(ErrorKind::InvalidInput, "empty xattr name"));
        }
        check_fits(self.block_size(), name.len(), value.map_or(0, <[u8]>::len))?;

        let mut owner = owner.write();
        let old_lba = owner.xattr_block();
        debug!(
            "[XATTR] set ino={} index={} name_len={} value_len={:?} block={}",
            owner.ino(),
            name_index,
            name.len(),
            value.map(<[u8]>::len),
            old_lba
        );

        let old = if old_lba != 0 {
            let block = self.read_xattr_block(old_lba)?;
            if block.refcount() > 1 {
                self.cache_insert(&block, old_lba);
            }
            Some(block)
        } else {
            None
        };

        let found = old
            .as_ref()
            .map_or(SearchResult::End, |b| b.find(name_index, name));
        match (found, value) {
            (SearchResult::Found(_), _) if flags.contains(SetFlags::CREATE) => {
                return Err(Error::new(ErrorKind::AlreadyExists, "xattr already exists"));
            }
            (SearchResult::Found(_), _) => {}
            (_, _) if flags.contains(SetFlags::REPLACE) => {
                return Err(Error::new(ErrorKind::NotFound, "xattr not found"));
            }
            (_, None) => return Err(Error::new(ErrorKind::NotFound, "xattr not found")),
            (_, Some(_)) => {}
        }

        if let (Some(block), Some(value)) = (old.as_ref(), value) {
            if !edit_fits(block, found, name, value) {
                debug!("[XATTR] no space in block {} for edit", old_lba);
                return Err(Error::new(ErrorKind::NoSpace, "no space in xattr block"));
            }
        }

        let mut staging = match old {
            Some(block) => CowBlock::new(old_lba, block).acquire_mutable(self)?,
            None => OwnedBlock::fresh(self.block_size()),
        };

        if let Err(e) = apply_edit(staging.block_mut(), name_index, name, value) {
            staging.abandon(&self.cache);
            return Err(e);
        }

        self.commit(&mut *owner, old_lba, staging)
    }

    /// 所有者销毁时释放它的块引用
    ///
    /// 没有块时直接返回 Ok。
    pub fn delete_on_destroy<O: XattrOwner>(&self, owner: &RwLock<O>) -> Result<()> {
        let mut owner = owner.write();
        let lba = owner.xattr_block();
        if lba == 0 {
            return Ok(());
        }
        debug!("[XATTR] releasing block {} of destroyed ino={}", lba, owner.ino());

        self.check_pointer(lba)?;
        self.release_block(&mut *owner, lba)?;
        owner.set_xattr_block(0)
    }

    /// 按完整名称（如 "user.comment"）获取属性
    pub fn get_by_name<O: XattrOwner>(
        &self,
        owner: &RwLock<O>,
        full_name: &str,
        buf: Option<&mut [u8]>,
    ) -> Result<usize> {
        let (index, name) = extract_xattr_name(full_name)
            .ok_or(Error::new(ErrorKind::InvalidInput, "unknown xattr prefix"))?;
        self.get(owner, index, name.as_bytes(), buf)
    }

    /// 按完整名称设置属性
    pub fn set_by_name<O: XattrOwner>(
        &self,
        owner: &RwLock<O>,
        full_name: &str,
        value: Option<&[u8]>,
        flags: SetFlags,
    ) -> Result<()> {
        let (index, name) = extract_xattr_name(full_name)
            .ok_or(Error::new(ErrorKind::InvalidInput, "unknown xattr prefix"))?;
        self.set(owner, index, name.as_bytes(), value, flags)
    }

    fn check_pointer(&self, lba: u64) -> Result<()> {
        if !self.balloc.lock().is_data_block(lba) {
            error!("[XATTR] bad xattr block pointer {}", lba);
            return Err(Error::new(ErrorKind::Corrupted, "xattr block pointer out of range"));
        }
        Ok(())
    }

    /// 读取块并放入去重缓存（读路径）
    fn load_and_cache(&self, lba: u64) -> Result<XattrBlock> {
        self.check_pointer(lba)?;
        let _guard = self.locks.lock(lba)?;
        let block = self.read_locked(lba)?;
        self.cache_insert(&block, lba);
        Ok(block)
    }

    /// 插入缓存，失败只记录日志
    fn cache_insert(&self, block: &XattrBlock, lba: u64) {
        if let Err(e) = self.cache.insert(block.hash(), lba) {
            warn!("[XATTR] cache insert for block {} failed: {}", lba, e);
        }
    }

    fn write_locked(&self, lba: u64, block: &XattrBlock) -> Result<()> {
        let mut bdev = self.bdev.lock();
        bdev.write_block(lba, block.as_bytes())?;
        if self.config.sync_writes {
            bdev.flush()?;
        }
        Ok(())
    }

    /// 在缓存中查找内容相同的块
    ///
    /// 找到 `old_lba` 本身时不改变引用计数；找到别的块时为所有者计费并把
    /// 那个块的引用计数加一。
    fn find_identical<O: XattrOwner>(
        &self,
        owner: &mut O,
        block: &XattrBlock,
        old_lba: u64,
    ) -> Result<Option<u64>> {
        let hash = block.hash();
        if hash == 0 {
            return Ok(None);
        }

        'restart: loop {
            for entry in self.cache.candidates(hash)? {
                let lba = entry.block();
                let _guard = self.locks.lock(lba)?;
                if !self.cache.is_live(&entry) {
                    // 加锁前被并发删除，重新查找
                    trace!("[XATTR] cache entry for block {} went stale", lba);
                    continue 'restart;
                }

                let mut candidate = match self.read_locked(lba) {
                    Ok(candidate) => candidate,
                    Err(e) => {
                        warn!("[XATTR] skipping unreadable candidate {}: {}", lba, e);
                        continue;
                    }
                };

                if !candidate.same_content(block) {
                    trace!("[XATTR] hash collision with block {}", lba);
                    continue;
                }
                // 保留原块不增加引用，不受上限限制
                if lba == old_lba {
                    self.cache.touch(&entry);
                    debug!("[XATTR] keeping block {}", lba);
                    return Ok(Some(lba));
                }
                if candidate.refcount() >= self.config.refcount_max {
                    debug!(
                        "[XATTR] block {} refcount {} at maximum, skipped",
                        lba,
                        candidate.refcount()
                    );
                    continue;
                }

                self.cache.touch(&entry);
                owner.charge_block(self.config.block_size)?;
                let refcount = candidate.refcount() + 1;
                candidate.set_refcount(refcount);
                if let Err(e) = self.write_locked(lba, &candidate) {
                    owner.uncharge_block(self.config.block_size);
                    return Err(e);
                }
                debug!("[XATTR] reusing block {} (refcount={})", lba, refcount);
                return Ok(Some(lba));
            }
            return Ok(None);
        }
    }

    /// 持久化暂存块，更新所有者指针，释放旧块
    fn commit<O: XattrOwner>(&self, owner: &mut O, old_lba: u64, staging: OwnedBlock) -> Result<()> {
        let new_lba = if staging.block().is_empty() {
            0
        } else {
            match self.find_identical(owner, staging.block(), old_lba) {
                Ok(Some(lba)) => lba,
                Ok(None) => match self.persist(owner, &staging) {
                    Ok(lba) => lba,
                    Err(e) => {
                        staging.abandon(&self.cache);
                        return Err(e);
                    }
                },
                Err(e) => {
                    staging.abandon(&self.cache);
                    return Err(e);
                }
            }
        };

        // 原地写回时块指针不变
        if new_lba != old_lba {
            if let Err(e) = owner.set_xattr_block(new_lba) {
                error!("[XATTR] failed to link ino={} to block {}: {}", owner.ino(), new_lba, e);
                if new_lba != 0 {
                    if let Err(e) = self.release_block(owner, new_lba) {
                        error!("[XATTR] rollback of block {} failed: {}", new_lba, e);
                    }
                }
                staging.abandon(&self.cache);
                return Err(e);
            }
        }

        // 所有者已经指向新块，旧块释放失败只会多留一个引用
        if old_lba != 0 && old_lba != new_lba {
            if let Err(e) = self.release_block(owner, old_lba) {
                self.release_failures.fetch_add(1, Ordering::Relaxed);
                error!("[XATTR] failed to release old block {}: {}", old_lba, e);
            }
        }
        Ok(())
    }

    /// 把暂存块写到磁盘：原地块写回原位置，其他情况分配新块
    fn persist<O: XattrOwner>(&self, owner: &mut O, staging: &OwnedBlock) -> Result<u64> {
        let block = staging.block();

        if let BlockOrigin::InPlace { lba, .. } = staging.origin() {
            let _guard = self.locks.lock(lba)?;
            self.write_locked(lba, block)?;
            self.cache_insert(block, lba);
            debug!("[XATTR] rewrote block {} in place", lba);
            return Ok(lba);
        }

        owner.charge_block(self.config.block_size)?;
        let lba = match self.balloc.lock().alloc_block(owner.block_goal()) {
            Ok(lba) => lba,
            Err(e) => {
                owner.uncharge_block(self.config.block_size);
                return Err(e);
            }
        };

        let _guard = self.locks.lock(lba)?;
        if let Err(e) = self.write_locked(lba, block) {
            if let Err(free_err) = self.balloc.lock().free_block(lba) {
                error!("[XATTR] failed to free block {}: {}", lba, free_err);
            }
            owner.uncharge_block(self.config.block_size);
            return Err(e);
        }
        self.cache_insert(block, lba);
        debug!("[XATTR] allocated new block {}", lba);
        Ok(lba)
    }

    /// 释放所有者对块的一个引用
    ///
    /// 引用计数为 1 时从缓存摘除并释放块，否则减一。
    fn release_block<O: XattrOwner>(&self, owner: &mut O, lba: u64) -> Result<()> {
        let _guard = self.locks.lock(lba)?;
        let mut block = self.read_locked(lba)?;

        if block.refcount() <= 1 {
            self.cache.remove(block.hash(), lba);
            self.balloc.lock().free_block(lba)?;
            debug!("[XATTR] freed block {}", lba);
        } else {
            let refcount = block.refcount() - 1;
            block.set_refcount(refcount);
            self.write_locked(lba, &block)?;
            debug!("[XATTR] block {} refcount now {}", lba, refcount);
        }

        owner.uncharge_block(self.config.block_size);
        Ok(())
    }
}

/// 检查编辑是否能放进已有块
fn edit_fits(block: &XattrBlock, found: SearchResult, name: &[u8], value: &[u8]) -> bool {
    let new_len = xattr_size(value.len());
    match found {
        SearchResult::Found(i) => {
            let old = &block.entries()[i].entry;
            let old_len = if old.has_local_value() {
                xattr_size(old.e_value_size as usize)
            } else {
                0
            };
            new_len <= block.free_space() + old_len
        }
        _ => xattr_len(name.len()) + new_len <= block.free_space(),
    }
}

/// 在暂存块上执行编辑
fn apply_edit(block: &mut XattrBlock, name_index: u8, name: &[u8], value: Option<&[u8]>) -> Result<()> {
    match (block.find(name_index, name), value) {
        (SearchResult::Found(i), Some(value)) => block.replace_value(i, value),
        (SearchResult::Found(i), None) => {
            block.remove(i);
            Ok(())
        }
        (found, Some(value)) => {
            let pos = found.position(block.len());
            block.insert(pos, name_index, name, value)
        }
        (_, None) => Err(Error::new(ErrorKind::NotFound, "xattr not found")),
    }
}
