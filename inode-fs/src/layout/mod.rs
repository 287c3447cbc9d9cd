//! # 磁盘数据结构层
//!
//! inode-fs 的磁盘布局：
//! 空闲位图文件的 inode 头(0) | 根目录的 inode 头(1) | 其余扇区按需分配
//!
//! 除两个固定扇区外，所有扇区都经由空闲位图分配，
//! 可能是 inode 头、间接索引块或数据块。

mod inode;
pub use inode::{DiskInode, MAX_SECTORS};
#[cfg(test)]
pub use inode::DIRECT_COUNT;

/// 目录项，存放在目录自身的数据中
mod dir_entry;
pub use dir_entry::DirEntry;
