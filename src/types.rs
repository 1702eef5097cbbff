//! 数据结构定义
//!
//! xattr 块的磁盘结构。所有多字节字段均为小端序，读写时由
//! `byteorder` 完成转换，不依赖宿主字节序，也不做任何指针强转。

use crate::consts::*;
use byteorder::{ByteOrder, LittleEndian};

/// 计算 entry 的总大小（包括名称和对齐）
#[inline]
pub const fn xattr_len(name_len: usize) -> usize {
    (name_len + EXT4_XATTR_ROUND as usize + EXT4_XATTR_ENTRY_SIZE) & !(EXT4_XATTR_ROUND as usize)
}

/// 计算 value 的对齐后大小
#[inline]
pub const fn xattr_size(value_len: usize) -> usize {
    (value_len + EXT4_XATTR_ROUND as usize) & !(EXT4_XATTR_ROUND as usize)
}

/// xattr 块头部
///
/// 位于块的开头，共 32 字节：
///
/// ```text
/// 0x00 h_magic      魔数 EXT4_XATTR_MAGIC
/// 0x04 h_refcount   引用计数（块共享）
/// 0x08 h_blocks     使用的块数（单块格式固定为 1）
/// 0x0C h_hash       所有条目的哈希值（0 = 不参与共享）
/// 0x10 h_reserved   保留字段
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XattrHeader {
    /// 魔数
    pub h_magic: u32,
    /// 引用计数
    pub h_refcount: u32,
    /// 使用的块数
    pub h_blocks: u32,
    /// 块哈希
    pub h_hash: u32,
    /// 保留字段
    pub h_reserved: [u32; 4],
}

impl XattrHeader {
    /// 新块的头部（refcount = 1，hash 尚未计算）
    pub fn new() -> Self {
        Self {
            h_magic: EXT4_XATTR_MAGIC,
            h_refcount: 1,
            h_blocks: EXT4_XATTR_BLOCKS,
            h_hash: 0,
            h_reserved: [0; 4],
        }
    }

    /// 从字节解码（调用方保证 `buf.len() >= EXT4_XATTR_HEADER_SIZE`）
    pub fn decode(buf: &[u8]) -> Self {
        let mut h_reserved = [0u32; 4];
        LittleEndian::read_u32_into(&buf[16..32], &mut h_reserved);
        Self {
            h_magic: LittleEndian::read_u32(&buf[0..4]),
            h_refcount: LittleEndian::read_u32(&buf[4..8]),
            h_blocks: LittleEndian::read_u32(&buf[8..12]),
            h_hash: LittleEndian::read_u32(&buf[12..16]),
            h_reserved,
        }
    }

    /// 编码到字节
    pub fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(&mut buf[0..4], self.h_magic);
        LittleEndian::write_u32(&mut buf[4..8], self.h_refcount);
        LittleEndian::write_u32(&mut buf[8..12], self.h_blocks);
        LittleEndian::write_u32(&mut buf[12..16], self.h_hash);
        LittleEndian::write_u32_into(&self.h_reserved, &mut buf[16..32]);
    }
}

/// xattr 条目（固定部分）
///
/// 描述一个扩展属性的元数据，后面紧跟 `e_name_len` 字节的名称：
///
/// ```text
/// 0x00 e_name_len     名称长度
/// 0x01 e_name_index   命名空间索引
/// 0x02 e_value_offs   值在块内的偏移
/// 0x04 e_value_block  值所在的外部块（单块格式必须为 0）
/// 0x08 e_value_size   值长度
/// 0x0C e_hash         名称和值的哈希
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XattrEntry {
    /// 名称长度
    pub e_name_len: u8,
    /// 命名空间索引
    pub e_name_index: u8,
    /// 值偏移
    pub e_value_offs: u16,
    /// 外部值块
    pub e_value_block: u32,
    /// 值长度
    pub e_value_size: u32,
    /// entry 哈希
    pub e_hash: u32,
}

impl XattrEntry {
    /// 从字节解码（调用方保证 `buf.len() >= EXT4_XATTR_ENTRY_SIZE`）
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            e_name_len: buf[0],
            e_name_index: buf[1],
            e_value_offs: LittleEndian::read_u16(&buf[2..4]),
            e_value_block: LittleEndian::read_u32(&buf[4..8]),
            e_value_size: LittleEndian::read_u32(&buf[8..12]),
            e_hash: LittleEndian::read_u32(&buf[12..16]),
        }
    }

    /// 编码到字节
    pub fn encode(&self, buf: &mut [u8]) {
        buf[0] = self.e_name_len;
        buf[1] = self.e_name_index;
        LittleEndian::write_u16(&mut buf[2..4], self.e_value_offs);
        LittleEndian::write_u32(&mut buf[4..8], self.e_value_block);
        LittleEndian::write_u32(&mut buf[8..12], self.e_value_size);
        LittleEndian::write_u32(&mut buf[12..16], self.e_hash);
    }

    /// entry 在磁盘上占用的总长度
    #[inline]
    pub fn disk_len(&self) -> usize {
        xattr_len(self.e_name_len as usize)
    }

    /// 值是否存放在本块内
    #[inline]
    pub fn has_local_value(&self) -> bool {
        self.e_value_block == 0 && self.e_value_size != 0
    }
}

/// 检查偏移处是否为结束标记（前 4 字节为 0）
#[inline]
pub fn is_last_entry(data: &[u8], offset: usize) -> bool {
    match data.get(offset..offset + EXT4_XATTR_SENTINEL_SIZE) {
        Some(word) => LittleEndian::read_u32(word) == 0,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xattr_len() {
        // (4 + 3 + 16) & ~3 = 20
        assert_eq!(xattr_len(4), 20);
        // (7 + 3 + 16) & ~3 = 24
        assert_eq!(xattr_len(7), 24);
        assert_eq!(xattr_len(0), 16);
    }

    #[test]
    fn test_xattr_size() {
        assert_eq!(xattr_size(0), 0);
        assert_eq!(xattr_size(5), 8);
        assert_eq!(xattr_size(8), 8);
        assert_eq!(xattr_size(9), 12);
    }

    #[test]
    fn test_header_layout() {
        let mut buf = [0u8; 32];
        let mut header = XattrHeader::new();
        header.h_refcount = 3;
        header.h_hash = 0xdeadbeef;
        header.encode(&mut buf);

        assert_eq!(&buf[0..4], &[0x00, 0x00, 0x02, 0xEA]);
        assert_eq!(&buf[4..8], &[3, 0, 0, 0]);
        assert_eq!(&buf[8..12], &[1, 0, 0, 0]);
        assert_eq!(&buf[12..16], &[0xef, 0xbe, 0xad, 0xde]);
        assert_eq!(XattrHeader::decode(&buf), header);
    }

    #[test]
    fn test_entry_layout() {
        let entry = XattrEntry {
            e_name_len: 3,
            e_name_index: EXT4_XATTR_INDEX_USER,
            e_value_offs: 0x0ffc,
            e_value_block: 0,
            e_value_size: 3,
            e_hash: 0x01020304,
        };
        let mut buf = [0u8; 16];
        entry.encode(&mut buf);

        assert_eq!(buf[0], 3);
        assert_eq!(buf[1], 1);
        assert_eq!(&buf[2..4], &[0xfc, 0x0f]);
        assert_eq!(&buf[12..16], &[4, 3, 2, 1]);
        assert_eq!(XattrEntry::decode(&buf), entry);
        assert!(entry.has_local_value());
        assert_eq!(entry.disk_len(), 20);
    }

    #[test]
    fn test_is_last_entry() {
        let data = [0u8; 16];
        assert!(is_last_entry(&data, 0));

        let data = [1, 0, 0, 0, 0, 0, 0, 0];
        assert!(!is_last_entry(&data, 0));

        // 越界视为结束
        assert!(is_last_entry(&data, 6));
    }
}
