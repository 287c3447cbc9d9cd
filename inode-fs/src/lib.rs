#![no_std]

extern crate alloc;

/* inode-fs 的整体架构，自上而下 */

// 文件系统层：路径级别的创建、打开、删除与切换工作目录
mod fs;

// 打开文件层：带读写位置的文件句柄
mod file;

// 目录层：目录项的查找、增删与路径解析
mod directory;
mod path;

// 索引节点层：内存中共享的 inode 与打开表
mod inode;
mod volume;

// 磁盘数据结构层：inode 头、间接索引块与目录项
mod layout;

// 空闲扇区管理
mod free_map;

// 块缓存层：时钟置换的定长扇区缓存
mod buffer_cache;

mod sector;

#[cfg(test)]
mod mem_disk;

pub use self::{
    buffer_cache::BufferCache,
    directory::Dir,
    file::File,
    free_map::{FreeMap, SectorAllocator},
    fs::FileSystem,
    inode::Inode,
    sector::SectorId,
};
pub use block_dev::BlockDevice;

pub const SECTOR_SIZE: usize = 512;
/// 块缓存的槽位数
pub const CACHE_SLOTS: usize = 64;
/// 文件名的最大字节数
pub const NAME_MAX: usize = 14;
/// 空闲位图文件的 inode 头所在扇区
pub const FREE_MAP_SECTOR: SectorId = SectorId::new(0);
/// 根目录的 inode 头所在扇区
pub const ROOT_DIR_SECTOR: SectorId = SectorId::new(1);
pub const INODE_MAGIC: u32 = 0x494e4f44;

type DataBlock = [u8; SECTOR_SIZE];
