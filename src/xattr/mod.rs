//! ext2/ext4 扩展属性块存储
//!
//! 扩展属性（xattr）以 name-value 对的形式保存在一个独立的 xattr 块中
//! （通过 inode 的 i_file_acl 指向），支持多个命名空间：
//! - **user.** - 用户自定义属性
//! - **trusted.** - 可信属性
//! - **security.** - 安全标签（如 SELinux）
//! - **system.posix_acl_*** - POSIX ACL
//!
//! # 块共享
//!
//! 内容完全相同的属性集合只保存一份：每个块带有引用计数和块哈希，
//! 去重缓存按哈希找到候选块，逐字节比较后复用。共享块在修改前复制
//! （写时复制），引用计数为 1 的块原地修改。
//!
//! # 模块
//!
//! - `prefix` - 命名空间前缀和 list 可见性策略
//! - `block` - 块编解码和校验
//! - `search` - 有序 entry 表查找
//! - `write` - 块内插入、替换、删除
//! - `hash` - entry 哈希和块哈希
//! - `cow` - 写时复制
//! - `api` - [`XattrStore`]
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use lwext4_xattr::xattr::{PrefixPolicy, SetFlags, XattrStore};
//!
//! store.set_by_name(&inode, "user.author", Some(b"Alice"), SetFlags::CREATE)?;
//!
//! let mut names = [0u8; 256];
//! let len = store.list(&inode, &PrefixPolicy::default(), Some(&mut names))?;
//!
//! store.set_by_name(&inode, "user.author", None, SetFlags::empty())?;
//! ```

mod api;
mod block;
mod cow;
mod hash;
mod prefix;
mod search;
mod write;

pub use api::{SetFlags, XattrStore};
pub use block::{check_fits, EntryRef, XattrBlock};
pub use cow::{BlockOrigin, CowBlock, OwnedBlock};
pub use hash::{hash_block, hash_entry};
pub use prefix::{extract_xattr_name, get_xattr_name_prefix, PrefixPolicy, VisibilityPolicy};
pub use search::{compare_key, find_entry, SearchResult};
