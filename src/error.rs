//! 错误类型定义
//!
//! 提供 xattr 块存储操作的错误类型。

use core::fmt;

/// xattr 操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
    detail: Option<usize>,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// I/O 错误（由块设备透传）
    Io,
    /// 无效参数
    InvalidInput,
    /// xattr 块损坏
    Corrupted,
    /// 没有 xattr 块或没有匹配的属性
    NotFound,
    /// 以 CREATE 方式设置已存在的属性
    AlreadyExists,
    /// 单个块放不下（或配额/设备空间不足）
    NoSpace,
    /// 调用方缓冲区太小
    RangeTooSmall,
    /// 名称或值超出格式允许的范围
    OutOfRange,
    /// 无效状态（缓存已销毁、锁嵌套等）
    InvalidState,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self {
            kind,
            message,
            detail: None,
        }
    }

    /// 创建带损坏偏移的错误
    pub const fn corrupted_at(message: &'static str, offset: usize) -> Self {
        Self {
            kind: ErrorKind::Corrupted,
            message,
            detail: Some(offset),
        }
    }

    /// 缓冲区不足，附带实际需要的大小
    pub const fn range_too_small(required: usize) -> Self {
        Self {
            kind: ErrorKind::RangeTooSmall,
            message: "buffer too small",
            detail: Some(required),
        }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }

    /// 损坏位置（块内字节偏移），仅 `Corrupted` 有效
    pub fn offset(&self) -> Option<usize> {
        match self.kind {
            ErrorKind::Corrupted => self.detail,
            _ => None,
        }
    }

    /// 需要的缓冲区大小，仅 `RangeTooSmall` 有效
    pub fn required_size(&self) -> Option<usize> {
        match self.kind {
            ErrorKind::RangeTooSmall => self.detail,
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.detail) {
            (ErrorKind::Corrupted, Some(offset)) => {
                write!(f, "{:?}: {} (offset {:#x})", self.kind, self.message, offset)
            }
            (ErrorKind::RangeTooSmall, Some(size)) => {
                write!(f, "{:?}: {} (need {} bytes)", self.kind, self.message, size)
            }
            _ => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for Error {}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;
