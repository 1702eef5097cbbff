//! 内存块设备
//!
//! 整个设备保存在一个 `Vec<u8>` 中，用于测试和临时挂载。

use crate::block::BlockDevice;
use crate::error::{Error, ErrorKind, Result};

/// 内存块设备
#[derive(Debug, Clone)]
pub struct MemDevice {
    block_size: u32,
    total_blocks: u64,
    storage: Vec<u8>,
}

impl MemDevice {
    /// 创建全零的内存设备
    pub fn new(block_size: u32, total_blocks: u64) -> Self {
        let storage = vec![0u8; (total_blocks * block_size as u64) as usize];
        Self {
            block_size,
            total_blocks,
            storage,
        }
    }

    /// 直接查看某个块的内容
    pub fn block(&self, lba: u64) -> Option<&[u8]> {
        let start = (lba * self.block_size as u64) as usize;
        self.storage.get(start..start + self.block_size as usize)
    }

    fn range(&self, lba: u64, len: usize) -> Result<core::ops::Range<usize>> {
        let block_size = self.block_size as usize;
        if lba >= self.total_blocks || len < block_size {
            return Err(Error::new(ErrorKind::Io, "memory device access out of range"));
        }
        let start = lba as usize * block_size;
        Ok(start..start + block_size)
    }
}

impl BlockDevice for MemDevice {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    fn read_block(&mut self, lba: u64, buf: &mut [u8]) -> Result<()> {
        let range = self.range(lba, buf.len())?;
        let len = range.len();
        buf[..len].copy_from_slice(&self.storage[range]);
        Ok(())
    }

    fn write_block(&mut self, lba: u64, buf: &[u8]) -> Result<()> {
        let range = self.range(lba, buf.len())?;
        let len = range.len();
        self.storage[range].copy_from_slice(&buf[..len]);
        Ok(())
    }
}
