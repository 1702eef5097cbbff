//! 挂载配置

use crate::{
    consts::*,
    error::{Error, ErrorKind, Result},
};

/// xattr 存储配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XattrConfig {
    /// 块大小（字节）
    pub block_size: u32,
    /// 单个块的最大引用计数
    pub refcount_max: u32,
    /// 去重缓存哈希桶位数，容量为 `1 << (bits + 4)`
    pub cache_bucket_bits: u32,
    /// 每次写块后刷新设备
    pub sync_writes: bool,
}

impl Default for XattrConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            refcount_max: EXT4_XATTR_REFCOUNT_MAX,
            cache_bucket_bits: MB_CACHE_DEFAULT_BUCKET_BITS,
            sync_writes: false,
        }
    }
}

impl XattrConfig {
    /// 检查配置
    pub fn validate(&self) -> Result<()> {
        if !self.block_size.is_power_of_two()
            || self.block_size < MIN_BLOCK_SIZE
            || self.block_size > MAX_BLOCK_SIZE
        {
            return Err(Error::new(ErrorKind::InvalidInput, "unsupported block size"));
        }
        if self.refcount_max == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "refcount_max must be nonzero"));
        }
        if self.cache_bucket_bits > 20 {
            return Err(Error::new(ErrorKind::InvalidInput, "cache_bucket_bits too large"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = XattrConfig::default();
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.refcount_max, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_block_size() {
        let config = XattrConfig {
            block_size: 3000,
            ..XattrConfig::default()
        };
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::InvalidInput);

        let config = XattrConfig {
            block_size: 512,
            ..XattrConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
