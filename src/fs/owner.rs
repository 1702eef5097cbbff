//! 所有者接口

use crate::error::Result;

/// xattr 块的所有者（通常是 inode）
///
/// 所有者最多指向一个 xattr 块，`xattr_block() == 0` 表示没有。
/// 所有者自身的读写锁由调用方提供（见 [`crate::xattr::XattrStore`]），
/// 这里的方法都在持有该锁时被调用。
pub trait XattrOwner {
    /// 所有者编号，仅用于日志
    fn ino(&self) -> u32;

    /// 当前的 xattr 块地址（0 = 没有）
    fn xattr_block(&self) -> u64;

    /// 持久化新的块指针
    ///
    /// 失败时所有者必须保持旧指针不变。
    fn set_xattr_block(&mut self, lba: u64) -> Result<()>;

    /// 分配新块时的目标地址
    fn block_goal(&self) -> u64 {
        0
    }

    /// 获得一个块引用前计费，超出配额时返回 `NoSpace`
    fn charge_block(&mut self, _block_size: u32) -> Result<()> {
        Ok(())
    }

    /// 失去一个块引用后退费
    fn uncharge_block(&mut self, _block_size: u32) {}
}
