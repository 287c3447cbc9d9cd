//! 一个已挂载卷的全部运行时状态，由文件系统实例独占构造，
//! 再以 `Arc` 的形式被每个打开的 inode 共享。

use alloc::collections::BTreeMap;
use alloc::sync::Weak;

use spin::Mutex;

use crate::{BufferCache, FreeMap, Inode, SectorId};

pub(crate) struct Volume {
    pub cache: BufferCache,
    pub free_map: Mutex<FreeMap>,
    /// 打开表：每个扇区至多对应一个内存 inode
    pub open_inodes: Mutex<BTreeMap<SectorId, Weak<Inode>>>,
    /// 文件增长的全卷互斥区。
    /// 两个线程同时增长同一文件会争抢长度字段与同一块索引，
    /// 引入逐 inode 的增长锁之前都在这里串行。
    pub extend: Mutex<()>,
}

impl Volume {
    pub fn new(cache: BufferCache, free_map: FreeMap) -> Self {
        Self {
            cache,
            free_map: Mutex::new(free_map),
            open_inodes: Mutex::new(BTreeMap::new()),
            extend: Mutex::new(()),
        }
    }

    /// 写回空闲位图，再刷新整个块缓存
    pub fn sync(&self) {
        if !self.free_map.lock().store(&self.cache) {
            log::error!("failed to store the free map");
        }
        self.cache.flush_all();
    }
}

impl Drop for Volume {
    fn drop(&mut self) {
        self.sync();
    }
}
