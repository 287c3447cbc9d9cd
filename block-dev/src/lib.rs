//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，例如磁盘、光盘、U盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 文件系统只通过块缓存访问块设备，块大小与扇区大小一致。

#![no_std]

use core::any::Any;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any {
    /// 读出编号为 `block_id` 的整块，`buf` 的长度恰为块大小
    fn read_block(&self, block_id: usize, buf: &mut [u8]);
    /// 以 `buf` 覆写编号为 `block_id` 的整块
    fn write_block(&self, block_id: usize, buf: &[u8]);
}
