//! xattr 块编解码
//!
//! [`XattrBlock`] 持有一个块大小的字节缓冲区和从中解析出的 entry 索引
//! （偏移 + 解码后的 entry），所有访问都经过已校验的偏移，不做指针运算。
//!
//! 块布局：
//!
//! ```text
//! +--------+---------+---------+-----+----------+------ free ------+--------+--------+
//! | header | entry 0 | entry 1 | ... | sentinel |                  | value1 | value0 |
//! +--------+---------+---------+-----+----------+------------------+--------+--------+
//! 0        32                        last       last+4             min_offs          block_size
//! ```

use crate::{
    consts::*,
    error::{Error, ErrorKind, Result},
    types::{is_last_entry, xattr_size, XattrEntry, XattrHeader},
};
use byteorder::{ByteOrder, LittleEndian};

/// 块内一个 entry 的位置和内容
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRef {
    /// entry 在块内的偏移
    pub offset: usize,
    /// 解码后的 entry
    pub entry: XattrEntry,
}

/// 内存中的 xattr 块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XattrBlock {
    pub(super) data: Vec<u8>,
    pub(super) entries: Vec<EntryRef>,
    /// 结束标记的偏移
    pub(super) last: usize,
    /// 最低的值偏移，没有值时等于块大小
    pub(super) min_offs: usize,
}

impl XattrBlock {
    /// 创建空块（refcount = 1，没有 entry）
    pub fn new(block_size: usize) -> Self {
        let mut data = vec![0u8; block_size];
        XattrHeader::new().encode(&mut data[..EXT4_XATTR_HEADER_SIZE]);
        Self {
            data,
            entries: Vec::new(),
            last: EXT4_XATTR_HEADER_SIZE,
            min_offs: block_size,
        }
    }

    /// 解析并校验从磁盘读出的块
    ///
    /// 校验失败返回 `Corrupted`，错误中带有出问题的字节偏移。
    pub fn parse(data: Vec<u8>, block_size: usize) -> Result<Self> {
        let len = data.len();
        if len != block_size {
            return Err(Error::corrupted_at("xattr block length mismatch", len));
        }
        if len < EXT4_XATTR_HEADER_SIZE + EXT4_XATTR_SENTINEL_SIZE {
            return Err(Error::corrupted_at("xattr block too small", len));
        }

        let header = XattrHeader::decode(&data[..EXT4_XATTR_HEADER_SIZE]);
        if header.h_magic != EXT4_XATTR_MAGIC {
            return Err(Error::corrupted_at("bad xattr block magic", 0));
        }
        if header.h_blocks != EXT4_XATTR_BLOCKS {
            return Err(Error::corrupted_at("multi-block xattr not supported", 8));
        }

        let mut entries = Vec::new();
        let mut min_offs = len;
        let mut offset = EXT4_XATTR_HEADER_SIZE;
        // (值偏移, 对齐后大小, entry 偏移)
        let mut spans: Vec<(usize, usize, usize)> = Vec::new();

        loop {
            if offset + EXT4_XATTR_SENTINEL_SIZE > len {
                return Err(Error::corrupted_at("entry table runs past block end", offset));
            }
            if is_last_entry(&data, offset) {
                break;
            }
            if offset + EXT4_XATTR_ENTRY_SIZE > len {
                return Err(Error::corrupted_at("entry header out of bounds", offset));
            }

            let entry = XattrEntry::decode(&data[offset..offset + EXT4_XATTR_ENTRY_SIZE]);
            let next = offset + entry.disk_len();
            if next + EXT4_XATTR_SENTINEL_SIZE > len {
                return Err(Error::corrupted_at("entry name out of bounds", offset));
            }
            if entry.e_value_block != 0 {
                return Err(Error::corrupted_at("external value block", offset + 4));
            }

            let value_offs = entry.e_value_offs as usize;
            if entry.e_value_size == 0 {
                if value_offs != 0 {
                    return Err(Error::corrupted_at("empty value with offset", offset + 2));
                }
            } else {
                if entry.e_value_size as usize > len {
                    return Err(Error::corrupted_at("value out of bounds", offset + 2));
                }
                // 编辑按对齐后的大小移动值，所以校验也按对齐后的区间
                let size = xattr_size(entry.e_value_size as usize);
                if value_offs % EXT4_XATTR_PAD as usize != 0 {
                    return Err(Error::corrupted_at("misaligned value offset", offset + 2));
                }
                if value_offs < EXT4_XATTR_HEADER_SIZE || value_offs + size > len {
                    return Err(Error::corrupted_at("value out of bounds", offset + 2));
                }
                spans.push((value_offs, size, offset));
                min_offs = min_offs.min(value_offs);
            }

            log::trace!(
                "[XATTR] entry at {:#x}: index {} name_len {} value {}@{:#x}",
                offset,
                entry.e_name_index,
                entry.e_name_len,
                entry.e_value_size,
                value_offs
            );
            entries.push(EntryRef { offset, entry });
            offset = next;
        }

        if offset + EXT4_XATTR_SENTINEL_SIZE > min_offs {
            return Err(Error::corrupted_at("entry table overlaps values", offset));
        }

        spans.sort_unstable();
        for pair in spans.windows(2) {
            let (low_offs, low_size, _) = pair[0];
            let (high_offs, _, high_entry) = pair[1];
            if low_offs + low_size > high_offs {
                return Err(Error::corrupted_at("overlapping values", high_entry + 2));
            }
        }

        Ok(Self {
            data,
            entries,
            last: offset,
            min_offs,
        })
    }

    /// 编辑后重建 entry 索引
    pub(super) fn reindex(&mut self) {
        self.entries.clear();
        self.min_offs = self.data.len();
        let mut offset = EXT4_XATTR_HEADER_SIZE;
        while !is_last_entry(&self.data, offset) {
            let entry = XattrEntry::decode(&self.data[offset..offset + EXT4_XATTR_ENTRY_SIZE]);
            if entry.has_local_value() {
                self.min_offs = self.min_offs.min(entry.e_value_offs as usize);
            }
            self.entries.push(EntryRef { offset, entry });
            offset += entry.disk_len();
        }
        self.last = offset;
    }

    /// 把 `entries[i].entry` 写回字节缓冲区
    pub(super) fn store_entry(&mut self, i: usize) {
        let EntryRef { offset, entry } = self.entries[i];
        entry.encode(&mut self.data[offset..offset + EXT4_XATTR_ENTRY_SIZE]);
    }

    /// 块大小
    pub fn block_size(&self) -> usize {
        self.data.len()
    }

    /// 块头部
    pub fn header(&self) -> XattrHeader {
        XattrHeader::decode(&self.data[..EXT4_XATTR_HEADER_SIZE])
    }

    /// 引用计数
    pub fn refcount(&self) -> u32 {
        LittleEndian::read_u32(&self.data[4..8])
    }

    /// 设置引用计数
    pub fn set_refcount(&mut self, refcount: u32) {
        LittleEndian::write_u32(&mut self.data[4..8], refcount);
    }

    /// 块哈希（0 = 不参与共享）
    pub fn hash(&self) -> u32 {
        LittleEndian::read_u32(&self.data[12..16])
    }

    pub(super) fn set_hash(&mut self, hash: u32) {
        LittleEndian::write_u32(&mut self.data[12..16], hash);
    }

    /// 按排序顺序排列的 entry
    pub fn entries(&self) -> &[EntryRef] {
        &self.entries
    }

    /// entry 数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 块中是否只剩结束标记
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 第 i 个 entry 的名称（不含前缀）
    pub fn name(&self, i: usize) -> &[u8] {
        let EntryRef { offset, entry } = &self.entries[i];
        let start = offset + EXT4_XATTR_ENTRY_SIZE;
        &self.data[start..start + entry.e_name_len as usize]
    }

    /// 第 i 个 entry 的值
    pub fn value(&self, i: usize) -> &[u8] {
        let entry = &self.entries[i].entry;
        if !entry.has_local_value() {
            return &[];
        }
        let start = entry.e_value_offs as usize;
        &self.data[start..start + entry.e_value_size as usize]
    }

    /// 剩余可用空间 = 值区起点 - entry 表终点 - 结束标记
    pub fn free_space(&self) -> usize {
        self.min_offs
            .saturating_sub(self.last + EXT4_XATTR_SENTINEL_SIZE)
    }

    /// 所有值按对齐后大小的总和
    pub fn values_size(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.entry.has_local_value())
            .map(|e| xattr_size(e.entry.e_value_size as usize))
            .sum()
    }

    /// entry 表（header 之后，结束标记之前）的长度
    pub fn entries_size(&self) -> usize {
        self.last - EXT4_XATTR_HEADER_SIZE
    }

    /// 两个块是否保存了完全相同的属性集合
    ///
    /// 逐个比较 entry 的索引、名称、哈希和值，不比较偏移和头部，
    /// 所以哈希碰撞的块不会被当成相同。
    pub fn same_content(&self, other: &XattrBlock) -> bool {
        if self.entries.len() != other.entries.len() {
            return false;
        }
        for i in 0..self.entries.len() {
            let a = &self.entries[i].entry;
            let b = &other.entries[i].entry;
            if a.e_name_len != b.e_name_len
                || a.e_name_index != b.e_name_index
                || a.e_hash != b.e_hash
                || a.e_value_size != b.e_value_size
                || a.e_value_block != b.e_value_block
            {
                return false;
            }
            if self.name(i) != other.name(i) || self.value(i) != other.value(i) {
                return false;
            }
        }
        true
    }

    /// 块的原始字节
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// 检查名称和值是否可能放进一个空块
pub fn check_fits(block_size: usize, name_len: usize, value_len: usize) -> Result<()> {
    if name_len > EXT4_XATTR_NAME_MAX {
        return Err(Error::new(ErrorKind::OutOfRange, "xattr name too long"));
    }
    let needed = EXT4_XATTR_HEADER_SIZE
        + crate::types::xattr_len(name_len)
        + EXT4_XATTR_SENTINEL_SIZE
        + xattr_size(value_len);
    if needed > block_size {
        return Err(Error::new(ErrorKind::OutOfRange, "xattr value too large"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 手工构造一个带一个 entry 的块："user.foo" = "bar"
    fn sample_block() -> Vec<u8> {
        let mut data = vec![0u8; 1024];
        XattrHeader::new().encode(&mut data[..32]);
        let entry = XattrEntry {
            e_name_len: 3,
            e_name_index: EXT4_XATTR_INDEX_USER,
            e_value_offs: 1020,
            e_value_block: 0,
            e_value_size: 3,
            e_hash: 0x1234,
        };
        entry.encode(&mut data[32..48]);
        data[48..51].copy_from_slice(b"foo");
        data[1020..1023].copy_from_slice(b"bar");
        data
    }

    #[test]
    fn test_new_block() {
        let block = XattrBlock::new(1024);
        assert!(block.is_empty());
        assert_eq!(block.refcount(), 1);
        assert_eq!(block.header().h_magic, EXT4_XATTR_MAGIC);
        assert_eq!(block.free_space(), 1024 - 32 - 4);
    }

    #[test]
    fn test_parse_valid() {
        let block = XattrBlock::parse(sample_block(), 1024).unwrap();
        assert_eq!(block.len(), 1);
        assert_eq!(block.name(0), b"foo");
        assert_eq!(block.value(0), b"bar");
        assert_eq!(block.free_space(), 1020 - 52 - 4);
        assert_eq!(
            32 + block.entries_size() + 4 + block.values_size() + block.free_space(),
            1024
        );
    }

    #[test]
    fn test_parse_bad_magic() {
        let mut data = sample_block();
        data[0] = 0;
        let err = XattrBlock::parse(data, 1024).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
        assert_eq!(err.offset(), Some(0));
    }

    #[test]
    fn test_parse_bad_blocks() {
        let mut data = sample_block();
        data[8] = 2;
        assert_eq!(XattrBlock::parse(data, 1024).unwrap_err().offset(), Some(8));
    }

    #[test]
    fn test_parse_value_out_of_bounds() {
        let mut data = sample_block();
        // e_value_offs = 1024，值跨出块尾
        data[34..36].copy_from_slice(&1024u16.to_le_bytes());
        let err = XattrBlock::parse(data, 1024).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
        assert_eq!(err.offset(), Some(34));
    }

    #[test]
    fn test_parse_misaligned_value() {
        let mut data = sample_block();
        // 1021 + 3 没有越界，但对齐后的区间跨出块尾
        data[34..36].copy_from_slice(&1021u16.to_le_bytes());
        data[1021..1024].copy_from_slice(b"bar");
        let err = XattrBlock::parse(data, 1024).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
        assert_eq!(err.offset(), Some(34));
    }

    #[test]
    fn test_parse_overlapping_values() {
        let mut data = sample_block();
        // 第二个 entry "user.fop" 与 "user.foo" 共用值区
        let entry = XattrEntry {
            e_name_len: 3,
            e_name_index: EXT4_XATTR_INDEX_USER,
            e_value_offs: 1020,
            e_value_block: 0,
            e_value_size: 3,
            e_hash: 0x5678,
        };
        entry.encode(&mut data[52..68]);
        data[68..71].copy_from_slice(b"fop");
        let err = XattrBlock::parse(data.clone(), 1024).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
        assert_eq!(err.offset(), Some(54));

        // 紧挨着放是合法的
        data[54..56].copy_from_slice(&1016u16.to_le_bytes());
        data[1016..1019].copy_from_slice(b"baz");
        let block = XattrBlock::parse(data, 1024).unwrap();
        assert_eq!(block.value(1), b"baz");
    }

    #[test]
    fn test_parse_external_value_block() {
        let mut data = sample_block();
        data[36] = 9;
        assert_eq!(XattrBlock::parse(data, 1024).unwrap_err().offset(), Some(36));
    }

    #[test]
    fn test_parse_unterminated_table() {
        let mut data = vec![0xffu8; 1024];
        XattrHeader::new().encode(&mut data[..32]);
        let err = XattrBlock::parse(data, 1024).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
    }

    #[test]
    fn test_parse_length_mismatch() {
        let err = XattrBlock::parse(sample_block(), 2048).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
    }

    #[test]
    fn test_same_content_ignores_layout() {
        let a = XattrBlock::parse(sample_block(), 1024).unwrap();
        let mut data = sample_block();
        // 同样的内容，值放在不同偏移，refcount 不同
        data[4] = 7;
        data[1020..1023].fill(0);
        data[1000..1003].copy_from_slice(b"bar");
        data[34..36].copy_from_slice(&1000u16.to_le_bytes());
        let b = XattrBlock::parse(data, 1024).unwrap();
        assert!(a.same_content(&b));

        let mut data = sample_block();
        data[1022] = b'z';
        let c = XattrBlock::parse(data, 1024).unwrap();
        assert!(!a.same_content(&c));
    }

    #[test]
    fn test_check_fits() {
        assert!(check_fits(1024, 255, 100).is_ok());
        assert_eq!(
            check_fits(1024, 256, 0).unwrap_err().kind(),
            ErrorKind::OutOfRange
        );
        assert_eq!(
            check_fits(1024, 4, 1024).unwrap_err().kind(),
            ErrorKind::OutOfRange
        );
    }
}
