//! 块设备核心类型

use crate::error::{Error, ErrorKind, Result};

/// 块设备接口
///
/// 实现此 trait 以提供底层块设备访问。xattr 存储只按整块读写，
/// 块内容在持久化之后对存储层是不透明的，只通过块编解码器解释。
///
/// # 示例
///
/// ```rust,ignore
/// use lwext4_xattr::{BlockDevice, Result};
///
/// struct MyDevice {
///     // ...
/// }
///
/// impl BlockDevice for MyDevice {
///     fn block_size(&self) -> u32 {
///         4096
///     }
///
///     fn total_blocks(&self) -> u64 {
///         1000000
///     }
///
///     fn read_block(&mut self, lba: u64, buf: &mut [u8]) -> Result<()> {
///         // 实现块读取
///         Ok(())
///     }
///
///     fn write_block(&mut self, lba: u64, buf: &[u8]) -> Result<()> {
///         // 实现块写入
///         Ok(())
///     }
/// }
/// ```
pub trait BlockDevice: Send {
    /// 逻辑块大小（通常 4096）
    fn block_size(&self) -> u32;

    /// 总块数
    fn total_blocks(&self) -> u64;

    /// 读取一个块
    ///
    /// # 参数
    ///
    /// * `lba` - 逻辑块地址
    /// * `buf` - 目标缓冲区（大小为 block_size）
    fn read_block(&mut self, lba: u64, buf: &mut [u8]) -> Result<()>;

    /// 写入一个块
    ///
    /// # 参数
    ///
    /// * `lba` - 逻辑块地址
    /// * `buf` - 源缓冲区（大小为 block_size）
    fn write_block(&mut self, lba: u64, buf: &[u8]) -> Result<()>;

    /// 刷新缓存
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// 是否只读
    fn is_read_only(&self) -> bool {
        false
    }
}

/// 块设备包装器
///
/// 在底层设备之上做地址和缓冲区长度检查，并记录读写次数。
/// BlockDev 本身不包含内部锁，多线程下由 `XattrStore` 用互斥锁包装。
pub struct BlockDev<D> {
    /// 底层设备
    device: D,
    /// 读取次数
    read_count: u64,
    /// 写入次数
    write_count: u64,
}

impl<D: BlockDevice> BlockDev<D> {
    /// 创建新的块设备包装器
    pub fn new(device: D) -> Self {
        Self {
            device,
            read_count: 0,
            write_count: 0,
        }
    }

    /// 获取底层设备的引用
    pub fn device(&self) -> &D {
        &self.device
    }

    /// 获取底层设备的可变引用
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// 取回底层设备
    pub fn into_inner(self) -> D {
        self.device
    }

    /// 获取逻辑块大小
    pub fn block_size(&self) -> u32 {
        self.device.block_size()
    }

    /// 获取总块数
    pub fn total_blocks(&self) -> u64 {
        self.device.total_blocks()
    }

    /// 获取读取次数
    pub fn read_count(&self) -> u64 {
        self.read_count
    }

    /// 获取写入次数
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    fn check_lba(&self, lba: u64) -> Result<()> {
        if lba >= self.device.total_blocks() {
            return Err(Error::new(ErrorKind::InvalidInput, "block address out of device range"));
        }
        Ok(())
    }

    /// 读取整块，返回新分配的缓冲区
    pub fn read_block(&mut self, lba: u64) -> Result<Vec<u8>> {
        self.check_lba(lba)?;
        let mut buf = vec![0u8; self.device.block_size() as usize];
        self.read_count += 1;
        self.device.read_block(lba, &mut buf)?;
        log::trace!("[BLOCK] read LBA={:#x}", lba);
        Ok(buf)
    }

    /// 写入整块
    pub fn write_block(&mut self, lba: u64, buf: &[u8]) -> Result<()> {
        self.check_lba(lba)?;
        if buf.len() != self.device.block_size() as usize {
            return Err(Error::new(ErrorKind::InvalidInput, "buffer length is not one block"));
        }
        if self.device.is_read_only() {
            return Err(Error::new(ErrorKind::InvalidState, "device is read-only"));
        }
        self.write_count += 1;
        self.device.write_block(lba, buf)?;
        log::trace!("[BLOCK] write LBA={:#x}", lba);
        Ok(())
    }

    /// 刷新设备
    pub fn flush(&mut self) -> Result<()> {
        self.device.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemDevice;

    #[test]
    fn test_read_write_counts() {
        let mut bdev = BlockDev::new(MemDevice::new(1024, 16));
        let data = vec![0xAB; 1024];
        bdev.write_block(3, &data).unwrap();
        assert_eq!(bdev.read_block(3).unwrap(), data);
        assert_eq!(bdev.read_count(), 1);
        assert_eq!(bdev.write_count(), 1);
    }

    #[test]
    fn test_out_of_range() {
        let mut bdev = BlockDev::new(MemDevice::new(1024, 16));
        let err = bdev.read_block(16).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = bdev.write_block(0, &[0u8; 10]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
