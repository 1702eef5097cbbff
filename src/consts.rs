//! 常量定义
//!
//! xattr 块磁盘格式、哈希和缓存相关的常量

//=============================================================================
// Extended Attributes (xattr) 块格式常量
//=============================================================================

/// xattr 魔数
pub const EXT4_XATTR_MAGIC: u32 = 0xEA020000;

/// 单块格式下 h_blocks 的唯一合法值
pub const EXT4_XATTR_BLOCKS: u32 = 1;

/// xattr 默认最大引用计数
pub const EXT4_XATTR_REFCOUNT_MAX: u32 = 1024;

/// xattr 对齐（4字节对齐）
pub const EXT4_XATTR_PAD_BITS: u32 = 2;
/// 对齐字节数
pub const EXT4_XATTR_PAD: u32 = 1 << EXT4_XATTR_PAD_BITS;
/// 对齐掩码
pub const EXT4_XATTR_ROUND: u32 = EXT4_XATTR_PAD - 1;

/// 名称最大长度（e_name_len 为 u8）
pub const EXT4_XATTR_NAME_MAX: usize = 255;

/// 结束标记大小（entry 表以 4 个零字节结尾）
pub const EXT4_XATTR_SENTINEL_SIZE: usize = 4;

/// 块头部大小
pub const EXT4_XATTR_HEADER_SIZE: usize = 32;

/// entry 固定部分大小（不含名称）
pub const EXT4_XATTR_ENTRY_SIZE: usize = 16;

//=============================================================================
// xattr 命名空间索引
//=============================================================================

/// user.
pub const EXT4_XATTR_INDEX_USER: u8 = 1;
/// system.posix_acl_access
pub const EXT4_XATTR_INDEX_POSIX_ACL_ACCESS: u8 = 2;
/// system.posix_acl_default
pub const EXT4_XATTR_INDEX_POSIX_ACL_DEFAULT: u8 = 3;
/// trusted.
pub const EXT4_XATTR_INDEX_TRUSTED: u8 = 4;
/// lustre（保留，未映射前缀）
pub const EXT4_XATTR_INDEX_LUSTRE: u8 = 5;
/// security.
pub const EXT4_XATTR_INDEX_SECURITY: u8 = 6;

//=============================================================================
// 哈希计算相关
//=============================================================================

/// 名称字节的滚动位移
pub const NAME_HASH_SHIFT: u32 = 5;
/// 值字（u32）的滚动位移
pub const VALUE_HASH_SHIFT: u32 = 16;
/// 块哈希（遍历 e_hash）的滚动位移
pub const BLOCK_HASH_SHIFT: u32 = 16;

//=============================================================================
// 去重缓存
//=============================================================================

/// 默认哈希桶位数
pub const MB_CACHE_DEFAULT_BUCKET_BITS: u32 = 10;

/// 每个桶允许的平均 entry 数（容量 = 桶数 << 4）
pub const MB_CACHE_ENTRIES_PER_BUCKET_BITS: u32 = 4;

/// 默认块大小
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// 最小块大小
pub const MIN_BLOCK_SIZE: u32 = 1024;

/// 最大块大小（e_value_offs 为 u16，必须能寻址整个块）
pub const MAX_BLOCK_SIZE: u32 = 65536;
