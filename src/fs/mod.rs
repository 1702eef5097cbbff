//! 属性所有者与挂载配置
//!
//! xattr 存储不关心所有者是什么，只通过 [`XattrOwner`] 读写它的块指针
//! 并对它计费。[`Inode`] 是一个内存中的所有者实现。

mod inode;
mod owner;
mod types;

pub use inode::Inode;
pub use owner::XattrOwner;
pub use types::XattrConfig;
