//! 物理块分配模块
//!
//! xattr 存储通过 [`BlockAllocator`] 申请和归还块，自身不管理空闲空间。
//! [`BitmapAllocator`] 是一个基于内存位图的实现。

mod alloc;
mod free;

pub use alloc::BitmapAllocator;

use crate::error::Result;

/// 块分配器接口
pub trait BlockAllocator: Send {
    /// 分配一个块
    ///
    /// # 参数
    ///
    /// * `goal` - 目标块地址（提示，分配器尽量从这里开始查找）
    ///
    /// # 返回
    ///
    /// 成功返回分配的块地址，没有空闲块时返回 `NoSpace`
    fn alloc_block(&mut self, goal: u64) -> Result<u64>;

    /// 释放一个块
    fn free_block(&mut self, lba: u64) -> Result<()>;

    /// 块是否是可分配的数据块（用于检测越界的块指针）
    fn is_data_block(&self, lba: u64) -> bool;
}
