//! 块分配功能

use crate::{
    bitmap::*,
    error::{Error, ErrorKind, Result},
};
use log::*;

use super::BlockAllocator;

/// 位图块分配器
///
/// 每个块对应位图中的一位；`first_data_block` 之前的块（引导块、
/// 元数据等）预先标记为已用，永远不会被分配。
#[derive(Debug, Clone)]
pub struct BitmapAllocator {
    pub(super) bitmap: Vec<u8>,
    pub(super) first_data_block: u32,
    pub(super) total_blocks: u32,
    pub(super) free_blocks: u32,
    /// 上次分配的位置，没有 goal 时从这里继续
    last_alloc: u32,
}

impl BitmapAllocator {
    /// 创建分配器
    ///
    /// # 参数
    ///
    /// * `total_blocks` - 设备总块数
    /// * `first_data_block` - 第一个可分配的块
    pub fn new(total_blocks: u32, first_data_block: u32) -> Self {
        let mut bitmap = vec![0u8; (total_blocks as usize).div_ceil(8)];
        let reserved = first_data_block.min(total_blocks);
        for i in 0..reserved {
            // 索引在范围内，不会失败
            let _ = set_bit(&mut bitmap, i);
        }
        Self {
            bitmap,
            first_data_block: reserved,
            total_blocks,
            free_blocks: total_blocks - reserved,
            last_alloc: reserved,
        }
    }

    /// 空闲块数
    pub fn free_blocks_count(&self) -> u32 {
        self.free_blocks
    }

    /// 块是否已分配
    pub fn is_allocated(&self, lba: u64) -> bool {
        lba < self.total_blocks as u64 && test_bit(&self.bitmap, lba as u32)
    }
}

impl BlockAllocator for BitmapAllocator {
    fn alloc_block(&mut self, goal: u64) -> Result<u64> {
        if self.free_blocks == 0 {
            warn!("[BALLOC] No free blocks left");
            return Err(Error::new(ErrorKind::NoSpace, "no free blocks"));
        }

        // goal 不合法时退回到上次分配的位置
        let start = if goal >= self.first_data_block as u64 && goal < self.total_blocks as u64 {
            goal as u32
        } else {
            self.last_alloc
        };

        // 先从 start 向后找，再回绕到数据区开头
        let found = find_first_zero(&self.bitmap, start, self.total_blocks)
            .or_else(|| find_first_zero(&self.bitmap, self.first_data_block, start));

        let Some(idx) = found else {
            error!(
                "[BALLOC] free count {} but bitmap has {} free blocks",
                self.free_blocks,
                count_zeros(&self.bitmap, self.first_data_block, self.total_blocks)
            );
            return Err(Error::new(
                ErrorKind::Corrupted,
                "free block count does not match bitmap",
            ));
        };

        set_bit(&mut self.bitmap, idx)?;
        self.free_blocks -= 1;
        self.last_alloc = idx;

        debug!(
            "[BALLOC] Allocated block {:#x} (goal={:#x}, free={})",
            idx, goal, self.free_blocks
        );
        Ok(idx as u64)
    }

    fn free_block(&mut self, lba: u64) -> Result<()> {
        self.free_one(lba)
    }

    fn is_data_block(&self, lba: u64) -> bool {
        lba >= self.first_data_block as u64 && lba < self.total_blocks as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_blocks_not_allocated() {
        let mut balloc = BitmapAllocator::new(16, 4);
        assert_eq!(balloc.free_blocks_count(), 12);
        assert_eq!(balloc.alloc_block(0).unwrap(), 4);
        assert!(!balloc.is_data_block(3));
        assert!(balloc.is_data_block(4));
    }

    #[test]
    fn test_goal_and_wrap() {
        let mut balloc = BitmapAllocator::new(8, 1);
        assert_eq!(balloc.alloc_block(6).unwrap(), 6);
        assert_eq!(balloc.alloc_block(6).unwrap(), 7);
        // 回绕
        assert_eq!(balloc.alloc_block(7).unwrap(), 1);
    }

    #[test]
    fn test_exhaustion() {
        let mut balloc = BitmapAllocator::new(4, 2);
        balloc.alloc_block(0).unwrap();
        balloc.alloc_block(0).unwrap();
        let err = balloc.alloc_block(0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSpace);
    }
}
