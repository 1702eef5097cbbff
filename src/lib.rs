//! lwext4_xattr: ext2/ext4 扩展属性块存储
//!
//! 这是一个纯 Rust 实现的 xattr 块存储，提供：
//! - **位精确**的单块 xattr 格式编解码和校验
//! - **块共享**：引用计数 + 去重缓存，相同的属性集合只存一份
//! - **写时复制**：共享块修改前复制
//! - **并发安全**：所有者读写锁 + 块锁，块锁从不嵌套
//!
//! # 示例
//!
//! ```rust,ignore
//! use lwext4_xattr::{BitmapAllocator, Inode, MemDevice, SetFlags, XattrConfig, XattrStore};
//! use parking_lot::RwLock;
//!
//! fn main() -> lwext4_xattr::Result<()> {
//!     let store = XattrStore::mount(
//!         MemDevice::new(4096, 1024),
//!         BitmapAllocator::new(1024, 1),
//!         XattrConfig::default(),
//!     )?;
//!
//!     let a = RwLock::new(Inode::new(12));
//!     let b = RwLock::new(Inode::new(13));
//!     store.set_by_name(&a, "user.mime", Some(b"text/plain"), SetFlags::CREATE)?;
//!     store.set_by_name(&b, "user.mime", Some(b"text/plain"), SetFlags::CREATE)?;
//!
//!     // 两个 inode 共享同一个块
//!     assert_eq!(a.read().xattr_block(), b.read().xattr_block());
//!
//!     store.unmount()?;
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`consts`] - 常量定义
//! - [`types`] - 磁盘数据结构
//! - [`block`] - 块设备抽象和块锁
//! - [`bitmap`] - 位图操作
//! - [`balloc`] - 块分配
//! - [`cache`] - 去重缓存
//! - [`fs`] - 所有者接口和配置
//! - [`xattr`] - xattr 块存储

#![deny(unsafe_code)]
#![warn(missing_docs)]

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 常量定义
pub mod consts;

/// 数据结构定义
pub mod types;

/// 块设备抽象
pub mod block;

/// 位图操作
pub mod bitmap;

/// 块分配
pub mod balloc;

/// 去重缓存
pub mod cache;

/// 所有者与配置
pub mod fs;

/// Extended Attributes (xattr)
pub mod xattr;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 块设备
pub use block::{BlockDev, BlockDevice, BlockGuard, BlockLocks, MemDevice};

// 块分配
pub use balloc::{BitmapAllocator, BlockAllocator};

// 去重缓存
pub use cache::{CacheEntry, CacheStats, DedupCache, InsertOutcome};

// 所有者
pub use fs::{Inode, XattrConfig, XattrOwner};

// Xattr
pub use xattr::{PrefixPolicy, SetFlags, VisibilityPolicy, XattrBlock, XattrStore};

pub use consts::*;
