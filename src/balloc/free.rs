//! 块释放功能

use crate::{
    bitmap::*,
    error::{Error, ErrorKind, Result},
};

use super::alloc::BitmapAllocator;

impl BitmapAllocator {
    /// 释放单个块
    ///
    /// 释放保留区内的块或未分配的块视为文件系统损坏。
    pub(super) fn free_one(&mut self, lba: u64) -> Result<()> {
        if lba < self.first_data_block as u64 || lba >= self.total_blocks as u64 {
            log::error!("[BALLOC] free of block {:#x} outside data area", lba);
            return Err(Error::new(ErrorKind::Corrupted, "freeing block outside data area"));
        }

        let idx = lba as u32;
        if !test_bit(&self.bitmap, idx) {
            log::error!("[BALLOC] double free of block {:#x}", lba);
            return Err(Error::new(ErrorKind::Corrupted, "freeing block that is not in use"));
        }

        clear_bit(&mut self.bitmap, idx)?;
        self.free_blocks += 1;
        log::debug!("[BALLOC] Freed block {:#x} (free={})", lba, self.free_blocks);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balloc::BlockAllocator;

    #[test]
    fn test_free_and_realloc() {
        let mut balloc = BitmapAllocator::new(8, 1);
        let b = balloc.alloc_block(0).unwrap();
        assert!(balloc.is_allocated(b));
        balloc.free_block(b).unwrap();
        assert!(!balloc.is_allocated(b));
        assert_eq!(balloc.free_blocks_count(), 7);
    }

    #[test]
    fn test_double_free() {
        let mut balloc = BitmapAllocator::new(8, 1);
        let b = balloc.alloc_block(0).unwrap();
        balloc.free_block(b).unwrap();
        let err = balloc.free_block(b).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
        assert!(balloc.free_block(0).is_err());
    }
}
