//! 块设备抽象
//!
//! 提供块设备接口和块级 I/O 操作。
//! block/device.rs 定义设备 trait 和带统计的 BlockDev 包装器
//! block/mem.rs 提供内存块设备
//! block/lock.rs 提供按块号加锁的锁表，同一线程同一时刻只能持有一把块锁

mod device;
mod lock;
mod mem;

pub use device::{BlockDevice, BlockDev};
pub use lock::{BlockGuard, BlockLocks};
pub use mem::MemDevice;
