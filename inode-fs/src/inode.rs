//! # 索引节点层
//!
//! 内存中的 [`Inode`] 被同一扇区的所有打开者共享：
//! 第一次打开时从磁盘读入 inode 头，之后的打开返回同一个 `Arc`，
//! 打开计数就是它的强引用计数，关闭即丢弃句柄。
//!
//! 删除只是打上标记，最后一个打开者关闭时才真正回收扇区。
//!
//! 本层不替调用者串行化多步操作；文件增长在卷的全局互斥区内进行。

use alloc::sync::{Arc, Weak};

use spin::Mutex;
use vfs::{InodeKind, Stat};

use crate::free_map::SectorAllocator;
use crate::layout::{DiskInode, MAX_SECTORS};
use crate::volume::Volume;
use crate::{SectorId, SECTOR_SIZE};

pub struct Inode {
    /// inode 头所在扇区，同时作为 inode 编号
    sector: SectorId,
    volume: Arc<Volume>,
    inner: Mutex<InodeInner>,
}

struct InodeInner {
    /// 非零时拒绝写入
    deny_write_count: usize,
    removed: bool,
    /// inode 头在内存中的副本，增长后立即写回
    disk_inode: DiskInode,
}

impl Inode {
    /// 在 `sector` 上建立长度为 `length` 的 inode，数据块全部清零。
    /// 超出容量或空间不足时返回 `false`。
    pub(crate) fn create(volume: &Volume, sector: SectorId, length: usize, is_dir: bool) -> bool {
        let mut disk_inode = DiskInode::new(is_dir);
        if !disk_inode.allocate(length, &volume.cache, &mut *volume.free_map.lock()) {
            return false;
        }
        disk_inode.set_len(length);
        disk_inode.store(&volume.cache, sector);

        log::debug!(
            "create inode {sector}: {length} bytes over {} sectors, is_dir={is_dir}",
            DiskInode::total_sector_count(length)
        );
        true
    }

    /// 打开 `sector` 上的 inode；已打开时返回共享的同一个
    pub(crate) fn open(volume: &Arc<Volume>, sector: SectorId) -> Option<Arc<Self>> {
        let mut open_inodes = volume.open_inodes.lock();
        if let Some(inode) = open_inodes.get(&sector).and_then(Weak::upgrade) {
            return Some(inode);
        }

        let disk_inode = DiskInode::load(&volume.cache, sector)?;
        let inode = Arc::new(Self {
            sector,
            volume: volume.clone(),
            inner: Mutex::new(InodeInner {
                deny_write_count: 0,
                removed: false,
                disk_inode,
            }),
        });
        open_inodes.insert(sector, Arc::downgrade(&inode));

        log::debug!("open inode {sector}");
        Some(inode)
    }

    #[inline]
    pub fn reopen(self: &Arc<Self>) -> Arc<Self> {
        Arc::clone(self)
    }

    #[inline]
    pub fn open_count(self: &Arc<Self>) -> usize {
        Arc::strong_count(self)
    }

    #[inline]
    pub fn inumber(&self) -> SectorId {
        self.sector
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.lock().disk_inode.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.inner.lock().disk_inode.is_dir()
    }

    #[inline]
    pub fn is_removed(&self) -> bool {
        self.inner.lock().removed
    }

    #[inline]
    pub fn is_write_denied(&self) -> bool {
        self.inner.lock().deny_write_count > 0
    }

    /// 标记删除，最后一个打开者关闭时回收
    pub fn remove(&self) {
        log::debug!("mark inode {} removed", self.sector);
        self.inner.lock().removed = true;
    }

    /// 每个打开者至多调用一次
    pub fn deny_write(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        inner.deny_write_count += 1;
        assert!(inner.deny_write_count <= Arc::strong_count(self));
    }

    /// 调用过 [`Inode::deny_write`] 的打开者须在关闭前调用一次
    pub fn allow_write(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        assert!(inner.deny_write_count > 0);
        assert!(inner.deny_write_count <= Arc::strong_count(self));
        inner.deny_write_count -= 1;
    }

    /// 从 `offset` 起读出至多 `buf.len()` 字节，越过文件末尾时返回较短的字节数
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        let inner = self.inner.lock();
        inner.disk_inode.read_at(offset, buf, &self.volume.cache)
    }

    /// 从 `offset` 起写入 `buf`，写到末尾之后时先增长文件。
    ///
    /// 拒绝写入或增长失败时返回 0，文件保持原长度。
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> usize {
        let mut inner = self.inner.lock();
        if inner.deny_write_count > 0 {
            log::warn!("write to inode {} denied", self.sector);
            return 0;
        }
        if buf.is_empty() {
            return 0;
        }

        let Some(end) = offset
            .checked_add(buf.len())
            .filter(|&end| end <= MAX_SECTORS * SECTOR_SIZE)
        else {
            log::warn!("write past the capacity of inode {}", self.sector);
            return 0;
        };
        if end > inner.disk_inode.len() {
            let _extend = self.volume.extend.lock();
            let grown = inner.disk_inode.allocate(
                end,
                &self.volume.cache,
                &mut *self.volume.free_map.lock(),
            );
            if !grown {
                log::warn!("failed to grow inode {} to {end} bytes", self.sector);
                return 0;
            }
            inner.disk_inode.set_len(end);
            inner.disk_inode.store(&self.volume.cache, self.sector);
        }

        inner.disk_inode.write_at(offset, buf, &self.volume.cache)
    }

    pub fn stat(&self) -> Stat {
        let inner = self.inner.lock();
        Stat {
            kind: if inner.disk_inode.is_dir() {
                InodeKind::Directory
            } else {
                InodeKind::Regular
            },
            inumber: self.sector.into(),
            size: inner.disk_inode.len() as u64,
        }
    }
}

impl Inode {
    #[inline]
    pub(crate) fn volume(&self) -> &Arc<Volume> {
        &self.volume
    }
}

impl Drop for Inode {
    fn drop(&mut self) {
        // 回收期间一直持有打开表，同一扇区上并发的打开要么等回收完成，
        // 要么读到已抹掉的 inode 头
        let mut open_inodes = self.volume.open_inodes.lock();
        // 表项可能已被同一扇区上新打开的 inode 取代
        if open_inodes
            .get(&self.sector)
            .is_some_and(|weak| weak.strong_count() == 0)
        {
            open_inodes.remove(&self.sector);
        }

        let inner = self.inner.get_mut();
        if inner.removed {
            log::debug!("reclaim inode {}", self.sector);
            let mut free_map = self.volume.free_map.lock();
            inner.disk_inode.release(&self.volume.cache, &mut *free_map);
            free_map.release(self.sector, 1);
            self.volume.cache.write(self.sector, &[0; SECTOR_SIZE]);
        }
    }
}
