//! 内存 inode

use super::XattrOwner;
use crate::error::{Error, ErrorKind, Result};

/// i_blocks 的计数单位
const SECTOR_SIZE: u64 = 512;

/// 内存中的 inode，只保留 xattr 需要的字段
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inode {
    ino: u32,
    /// xattr 块地址（i_file_acl）
    file_acl: u64,
    /// 占用的 512 字节扇区数（i_blocks）
    blocks: u64,
    /// 扇区配额上限
    quota_limit: Option<u64>,
}

impl Inode {
    /// 创建没有 xattr 块的 inode
    pub fn new(ino: u32) -> Self {
        Self {
            ino,
            ..Self::default()
        }
    }

    /// 创建带扇区配额的 inode
    pub fn with_quota(ino: u32, limit_sectors: u64) -> Self {
        Self {
            ino,
            quota_limit: Some(limit_sectors),
            ..Self::default()
        }
    }

    /// 已计费的扇区数
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// 扇区配额
    pub fn quota_limit(&self) -> Option<u64> {
        self.quota_limit
    }
}

impl XattrOwner for Inode {
    fn ino(&self) -> u32 {
        self.ino
    }

    fn xattr_block(&self) -> u64 {
        self.file_acl
    }

    fn set_xattr_block(&mut self, lba: u64) -> Result<()> {
        self.file_acl = lba;
        Ok(())
    }

    fn charge_block(&mut self, block_size: u32) -> Result<()> {
        let sectors = block_size as u64 / SECTOR_SIZE;
        let next = self.blocks + sectors;
        if let Some(limit) = self.quota_limit {
            if next > limit {
                log::debug!(
                    "[XATTR] inode {} quota exceeded: {} > {} sectors",
                    self.ino,
                    next,
                    limit
                );
                return Err(Error::new(ErrorKind::NoSpace, "disk quota exceeded"));
            }
        }
        self.blocks = next;
        Ok(())
    }

    fn uncharge_block(&mut self, block_size: u32) {
        let sectors = block_size as u64 / SECTOR_SIZE;
        self.blocks = self.blocks.saturating_sub(sectors);
    }
}
