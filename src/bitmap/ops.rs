//! Bitmap 操作实现
//!
//! 供位图块分配器使用的按位读写和查找

use crate::error::{Error, ErrorKind, Result};

/// 测试位图中某一位是否被设置
///
/// 超出位图范围的索引视为未设置
pub fn test_bit(bitmap: &[u8], index: u32) -> bool {
    let byte_index = (index / 8) as usize;
    let bit_offset = (index % 8) as u8;

    match bitmap.get(byte_index) {
        Some(byte) => (byte & (1 << bit_offset)) != 0,
        None => false,
    }
}

/// 设置位图中的某一位
pub fn set_bit(bitmap: &mut [u8], index: u32) -> Result<()> {
    let byte_index = (index / 8) as usize;
    let bit_offset = (index % 8) as u8;

    let byte = bitmap
        .get_mut(byte_index)
        .ok_or(Error::new(ErrorKind::InvalidInput, "Bitmap index out of range"))?;
    *byte |= 1 << bit_offset;
    Ok(())
}

/// 清除位图中的某一位
pub fn clear_bit(bitmap: &mut [u8], index: u32) -> Result<()> {
    let byte_index = (index / 8) as usize;
    let bit_offset = (index % 8) as u8;

    let byte = bitmap
        .get_mut(byte_index)
        .ok_or(Error::new(ErrorKind::InvalidInput, "Bitmap index out of range"))?;
    *byte &= !(1 << bit_offset);
    Ok(())
}

/// 在 [start, end) 中查找第一个空闲位（值为 0 的位）
pub fn find_first_zero(bitmap: &[u8], start: u32, end: u32) -> Option<u32> {
    let max_bits = (bitmap.len() * 8) as u32;
    let end = end.min(max_bits);

    let mut i = start;
    while i < end {
        // 整字节已满时跳过
        if i % 8 == 0 && i + 8 <= end && bitmap[(i / 8) as usize] == 0xFF {
            i += 8;
            continue;
        }
        if !test_bit(bitmap, i) {
            return Some(i);
        }
        i += 1;
    }

    None
}

/// 统计 [start, end) 中为 0 的位数
pub fn count_zeros(bitmap: &[u8], start: u32, end: u32) -> u32 {
    let max_bits = (bitmap.len() * 8) as u32;
    let end = end.min(max_bits);
    (start..end).filter(|&i| !test_bit(bitmap, i)).count() as u32
}
