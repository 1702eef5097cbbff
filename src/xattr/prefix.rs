//! xattr 命名空间前缀处理
//!
//! 磁盘上只保存命名空间索引和去掉前缀后的名称，完整名称（如
//! "user.comment"）在这里拆分和拼接。`list` 输出哪些命名空间由
//! [`VisibilityPolicy`] 决定。

use crate::consts::*;

/// 命名空间前缀表条目
struct XattrPrefix {
    prefix: &'static str,
    name_index: u8,
}

/// 命名空间前缀表
///
/// 以 '.' 结尾的前缀后面必须跟名称；posix ACL 两项是完整名称，
/// 磁盘上的名称为空。
static PREFIX_TABLE: &[XattrPrefix] = &[
    XattrPrefix {
        prefix: "user.",
        name_index: EXT4_XATTR_INDEX_USER,
    },
    XattrPrefix {
        prefix: "system.posix_acl_access",
        name_index: EXT4_XATTR_INDEX_POSIX_ACL_ACCESS,
    },
    XattrPrefix {
        prefix: "system.posix_acl_default",
        name_index: EXT4_XATTR_INDEX_POSIX_ACL_DEFAULT,
    },
    XattrPrefix {
        prefix: "trusted.",
        name_index: EXT4_XATTR_INDEX_TRUSTED,
    },
    XattrPrefix {
        prefix: "security.",
        name_index: EXT4_XATTR_INDEX_SECURITY,
    },
];

/// 从完整属性名中提取命名空间索引和属性名
///
/// # 返回
///
/// 返回 `(name_index, name)`，`name` 为去除前缀后的部分。
/// 没有匹配的前缀，或前缀要求名称但名称为空时返回 None。
///
/// # 示例
///
/// ```ignore
/// assert_eq!(extract_xattr_name("user.comment"), Some((1, "comment")));
/// assert_eq!(extract_xattr_name("system.posix_acl_access"), Some((2, "")));
/// ```
pub fn extract_xattr_name(full_name: &str) -> Option<(u8, &str)> {
    for entry in PREFIX_TABLE {
        let Some(rest) = full_name.strip_prefix(entry.prefix) else {
            continue;
        };

        if entry.prefix.ends_with('.') {
            if rest.is_empty() {
                return None;
            }
            return Some((entry.name_index, rest));
        }

        // 完整名称必须精确匹配
        if rest.is_empty() {
            return Some((entry.name_index, ""));
        }
    }

    None
}

/// 根据命名空间索引获取前缀字符串
pub fn get_xattr_name_prefix(name_index: u8) -> Option<&'static str> {
    PREFIX_TABLE
        .iter()
        .find(|entry| entry.name_index == name_index)
        .map(|entry| entry.prefix)
}

/// `list` 的可见性策略
pub trait VisibilityPolicy {
    /// 返回该命名空间对调用方可见时要输出的前缀，不可见时返回 None
    fn list_prefix(&self, name_index: u8) -> Option<&'static str>;
}

/// 默认的前缀可见性策略
///
/// - `user.` 只在启用 user_xattr 挂载选项时可见
/// - `trusted.` 只对有特权的调用方可见
/// - `system.posix_acl_*` 只在启用 ACL 时可见
/// - `security.` 总是可见
/// - 未知索引不可见
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixPolicy {
    /// user_xattr 挂载选项
    pub user_xattr: bool,
    /// 调用方有 CAP_SYS_ADMIN
    pub trusted_visible: bool,
    /// acl 挂载选项
    pub posix_acl: bool,
}

impl Default for PrefixPolicy {
    fn default() -> Self {
        Self {
            user_xattr: true,
            trusted_visible: false,
            posix_acl: true,
        }
    }
}

impl PrefixPolicy {
    /// 所有命名空间都可见
    pub fn privileged() -> Self {
        Self {
            user_xattr: true,
            trusted_visible: true,
            posix_acl: true,
        }
    }
}

impl VisibilityPolicy for PrefixPolicy {
    fn list_prefix(&self, name_index: u8) -> Option<&'static str> {
        let visible = match name_index {
            EXT4_XATTR_INDEX_USER => self.user_xattr,
            EXT4_XATTR_INDEX_TRUSTED => self.trusted_visible,
            EXT4_XATTR_INDEX_POSIX_ACL_ACCESS | EXT4_XATTR_INDEX_POSIX_ACL_DEFAULT => {
                self.posix_acl
            }
            EXT4_XATTR_INDEX_SECURITY => true,
            _ => false,
        };
        if visible {
            get_xattr_name_prefix(name_index)
        } else {
            None
        }
    }
}
