//! # 目录层
//!
//! 目录就是数据为一串 [`DirEntry`] 的 inode。
//! 0 号槽位保存父目录的扇区号，查找与遍历都从 1 号槽位开始。
//! `.` 与 `..` 不落盘，查找时分别解析为目录自身与 0 号槽位。

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::layout::DirEntry;
use crate::volume::Volume;
use crate::{Inode, SectorId, ROOT_DIR_SECTOR};

/// 打开的目录。多个句柄可以共享同一个 inode，各自持有遍历位置。
pub struct Dir {
    inode: Arc<Inode>,
    pos: usize,
}

impl Dir {
    /// 在 `sector` 上建立可容纳 `entry_cnt` 个目录项（含 0 号槽位）的目录。
    ///
    /// 0 号槽位先指向自身，这正是根目录需要的；
    /// 子目录加入父目录时由 [`Dir::add`] 改写为父目录。
    pub(crate) fn create(volume: &Arc<Volume>, sector: SectorId, entry_cnt: usize) -> bool {
        let entry_cnt = entry_cnt.max(1);
        if !Inode::create(volume, sector, entry_cnt * DirEntry::SIZE, true) {
            return false;
        }
        let Some(inode) = Inode::open(volume, sector) else {
            return false;
        };
        inode.write_at(0, DirEntry::backlink(sector).as_bytes()) == DirEntry::SIZE
    }

    /// 非目录 inode 打不开
    pub fn open(inode: Arc<Inode>) -> Option<Self> {
        inode.is_dir().then_some(Self {
            inode,
            pos: DirEntry::SIZE,
        })
    }

    pub(crate) fn open_root(volume: &Arc<Volume>) -> Option<Self> {
        Inode::open(volume, ROOT_DIR_SECTOR).and_then(Self::open)
    }

    /// 共享同一 inode，遍历位置从头开始
    pub fn reopen(&self) -> Self {
        Self {
            inode: self.inode.reopen(),
            pos: DirEntry::SIZE,
        }
    }

    #[inline]
    pub fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }

    /// 0 号槽位记录的父目录
    pub fn parent(&self) -> Option<SectorId> {
        let mut backlink = DirEntry::default();
        (self.inode.read_at(0, backlink.as_bytes_mut()) == DirEntry::SIZE)
            .then(|| backlink.inode_sector())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Inode>> {
        let volume = self.inode.volume();
        match name {
            "." => Some(self.inode.reopen()),
            ".." => Inode::open(volume, self.parent()?),
            _ => {
                let (_, entry) = self.find(name)?;
                Inode::open(volume, entry.inode_sector())
            }
        }
    }

    /// 加入名为 `name`、指向 `sector` 的目录项。
    ///
    /// 名字非法或已存在时不做任何修改直接失败；
    /// `is_dir` 时把子目录的 0 号槽位改写为本目录。
    pub fn add(&self, name: &str, sector: SectorId, is_dir: bool) -> bool {
        if !DirEntry::is_valid_name(name) || name == "." || name == ".." {
            log::warn!("invalid name {name:?}");
            return false;
        }
        if self.find(name).is_some() {
            return false;
        }

        if is_dir {
            let Some(child) = Inode::open(self.inode.volume(), sector) else {
                return false;
            };
            let backlink = DirEntry::backlink(self.inode.inumber());
            if child.write_at(0, backlink.as_bytes()) != DirEntry::SIZE {
                return false;
            }
        }

        let offset = self
            .entries()
            .find(|(_, entry)| !entry.is_in_use())
            .map_or_else(|| self.inode.len(), |(offset, _)| offset);
        let entry = DirEntry::new(name, sector);
        if self.inode.write_at(offset, entry.as_bytes()) != DirEntry::SIZE {
            return false;
        }

        log::debug!("add {name:?} -> {sector} to dir {}", self.inode.inumber());
        true
    }

    /// 删除名为 `name` 的目录项并标记其 inode 删除。
    /// 目标是非空目录时不做任何修改直接失败。
    pub fn remove(&self, name: &str) -> bool {
        let Some((offset, mut entry)) = self.find(name) else {
            return false;
        };
        let Some(inode) = Inode::open(self.inode.volume(), entry.inode_sector()) else {
            return false;
        };
        if Self::open(inode.reopen()).is_some_and(|dir| !dir.is_empty()) {
            log::warn!("dir {name:?} is not empty");
            return false;
        }

        entry.set_in_use(false);
        if self.inode.write_at(offset, entry.as_bytes()) != DirEntry::SIZE {
            return false;
        }
        inode.remove();

        log::debug!("remove {name:?} from dir {}", self.inode.inumber());
        true
    }

    /// 0 号槽位之外没有在用的目录项
    pub fn is_empty(&self) -> bool {
        !self.entries().any(|(_, entry)| entry.is_in_use())
    }

    /// 从当前遍历位置起返回下一个在用目录项的名字，到头时返回空
    pub fn readdir(&mut self) -> Option<String> {
        loop {
            let mut entry = DirEntry::default();
            if self.inode.read_at(self.pos, entry.as_bytes_mut()) != DirEntry::SIZE {
                return None;
            }
            self.pos += DirEntry::SIZE;
            if entry.is_in_use() {
                return Some(entry.name().to_string());
            }
        }
    }

    /// 所有在用目录项的名字，不影响遍历位置
    pub fn ls(&self) -> Vec<String> {
        self.entries()
            .filter(|(_, entry)| entry.is_in_use())
            .map(|(_, entry)| entry.name().to_string())
            .collect()
    }
}

impl Dir {
    fn find(&self, name: &str) -> Option<(usize, DirEntry)> {
        self.entries()
            .find(|(_, entry)| entry.is_in_use() && entry.name() == name)
    }

    /// 从 1 号槽位起依次读出每个目录项及其偏移
    fn entries(&self) -> impl Iterator<Item = (usize, DirEntry)> + '_ {
        (DirEntry::SIZE..)
            .step_by(DirEntry::SIZE)
            .map_while(|offset| {
                let mut entry = DirEntry::default();
                (self.inode.read_at(offset, entry.as_bytes_mut()) == DirEntry::SIZE)
                    .then_some((offset, entry))
            })
    }
}
