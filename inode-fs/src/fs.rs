//! # 文件系统层
//!
//! [`FileSystem`] 是对外的入口：格式化或挂载一个块设备，
//! 然后以路径为单位创建、打开、删除文件与目录。
//! 下层只用 `bool`/`Option` 表示失败，这里统一转换成 [`vfs::Error`]。

use alloc::sync::Arc;

use block_dev::BlockDevice;
use spin::Mutex;
use vfs::{Error, Stat};

use crate::free_map::SectorAllocator;
use crate::layout::DirEntry;
use crate::path::split_path;
use crate::volume::Volume;
use crate::{BufferCache, Dir, File, FreeMap, Inode, FREE_MAP_SECTOR, ROOT_DIR_SECTOR};

/// 新建目录的初始目录项数
const DIR_INITIAL_ENTRIES: usize = 16;

pub struct FileSystem {
    volume: Arc<Volume>,
    root: Dir,
    /// 修改目录结构的多步操作在此串行
    namespace: Mutex<()>,
}

impl FileSystem {
    /// 在 `device` 的前 `total_sectors` 个扇区上建立空的文件系统。
    /// 扇区号是 32 位的，更大的设备无法编址。
    pub fn format(device: Arc<dyn BlockDevice>, total_sectors: usize) -> Result<Self, Error> {
        if total_sectors <= usize::from(ROOT_DIR_SECTOR) || u32::try_from(total_sectors).is_err() {
            return Err(Error::NoSpace);
        }

        let mut free_map = FreeMap::new(total_sectors);
        free_map.mark(FREE_MAP_SECTOR);
        free_map.mark(ROOT_DIR_SECTOR);
        let free_map_len = free_map.file_len();
        let volume = Arc::new(Volume::new(BufferCache::new(device), free_map));

        // 位图文件一次建到完整长度，此后保存位图不会再分配扇区
        if !Inode::create(&volume, FREE_MAP_SECTOR, free_map_len, false) {
            return Err(Error::NoSpace);
        }
        if !Dir::create(&volume, ROOT_DIR_SECTOR, DIR_INITIAL_ENTRIES) {
            return Err(Error::NoSpace);
        }
        volume.sync();

        log::info!("formatted {total_sectors} sectors");
        Self::with_volume(volume)
    }

    /// 挂载已格式化的设备
    pub fn mount(device: Arc<dyn BlockDevice>) -> Result<Self, Error> {
        let cache = BufferCache::new(device);
        let free_map = FreeMap::load(&cache).ok_or(Error::Corrupted)?;
        let volume = Arc::new(Volume::new(cache, free_map));

        let fs = Self::with_volume(volume)?;
        let capacity = fs.volume.free_map.lock().capacity();
        log::info!("mounted {capacity} sectors, {} free", fs.free_sectors());
        Ok(fs)
    }

    fn with_volume(volume: Arc<Volume>) -> Result<Self, Error> {
        let root = Dir::open_root(&volume).ok_or(Error::Corrupted)?;
        Ok(Self {
            volume,
            root,
            namespace: Mutex::new(()),
        })
    }

    /// 根目录的新句柄，也是工作目录的初始值
    #[inline]
    pub fn root(&self) -> Dir {
        self.root.reopen()
    }

    pub fn free_sectors(&self) -> usize {
        self.volume.free_map.lock().free_count()
    }

    /// 创建初始长度为 `initial_size` 字节的普通文件，内容全为零
    pub fn create(&self, path: &str, initial_size: usize, cwd: &Dir) -> Result<(), Error> {
        self.create_inode(path, cwd, Some(initial_size))
    }

    pub fn mkdir(&self, path: &str, cwd: &Dir) -> Result<(), Error> {
        self.create_inode(path, cwd, None)
    }

    /// 打开普通文件；目录请用 [`FileSystem::open_dir`]
    pub fn open(&self, path: &str, cwd: &Dir) -> Result<File, Error> {
        let inode = self.lookup(path, cwd)?;
        if inode.is_dir() {
            return Err(Error::IsADirectory);
        }
        Ok(File::open(inode))
    }

    pub fn open_dir(&self, path: &str, cwd: &Dir) -> Result<Dir, Error> {
        let inode = self.lookup(path, cwd)?;
        Dir::open(inode).ok_or(Error::NotADirectory)
    }

    /// 删除文件或空目录。仍被打开的 inode 在最后一个句柄关闭时才回收。
    pub fn remove(&self, path: &str, cwd: &Dir) -> Result<(), Error> {
        let (dir_path, name) = split_path(path);
        // 根目录、`.` 与 `..` 都不能删
        if name.is_empty() || name == "." || name == ".." {
            return Err(Error::InvalidName);
        }

        let _namespace = self.namespace.lock();
        let dir = Dir::open_path(dir_path, cwd).ok_or(Error::NotFound)?;
        let inode = dir.lookup(name).ok_or(Error::NotFound)?;
        if Dir::open(inode).is_some_and(|target| !target.is_empty()) {
            return Err(Error::DirectoryNotEmpty);
        }

        if dir.remove(name) {
            Ok(())
        } else {
            Err(Error::NotFound)
        }
    }

    /// 把工作目录切换到 `path`
    pub fn chdir(&self, path: &str, cwd: &mut Dir) -> Result<(), Error> {
        *cwd = self.open_dir(path, cwd)?;
        Ok(())
    }

    pub fn stat(&self, path: &str, cwd: &Dir) -> Result<Stat, Error> {
        self.lookup(path, cwd).map(|inode| inode.stat())
    }

    /// 写回空闲位图与所有脏扇区
    pub fn sync(&self) {
        self.volume.sync();
    }
}

impl FileSystem {
    fn lookup(&self, path: &str, cwd: &Dir) -> Result<Arc<Inode>, Error> {
        let (dir_path, name) = split_path(path);
        let dir = Dir::open_path(dir_path, cwd).ok_or(Error::NotFound)?;
        if name.is_empty() {
            // 只有 "/" 本身会拆出空的名字和非空的目录部分
            return if dir_path.is_empty() {
                Err(Error::NotFound)
            } else {
                Ok(dir.inode().reopen())
            };
        }
        dir.lookup(name).ok_or(Error::NotFound)
    }

    /// `length` 为空时创建目录
    fn create_inode(&self, path: &str, cwd: &Dir, length: Option<usize>) -> Result<(), Error> {
        let (dir_path, name) = split_path(path);
        if !DirEntry::is_valid_name(name) || name == "." || name == ".." {
            return Err(Error::InvalidName);
        }

        let _namespace = self.namespace.lock();
        let parent = Dir::open_path(dir_path, cwd).ok_or(Error::NotFound)?;
        if parent.lookup(name).is_some() {
            return Err(Error::AlreadyExists);
        }

        let sector = self
            .volume
            .free_map
            .lock()
            .allocate(1)
            .ok_or(Error::NoSpace)?;
        let created = match length {
            Some(length) => Inode::create(&self.volume, sector, length, false),
            None => Dir::create(&self.volume, sector, DIR_INITIAL_ENTRIES),
        };
        if !created {
            self.volume.free_map.lock().release(sector, 1);
            return Err(Error::NoSpace);
        }

        if !parent.add(name, sector, length.is_none()) {
            // 交给最后一次关闭去回收 inode 头与已分配的数据块
            if let Some(inode) = Inode::open(&self.volume, sector) {
                inode.remove();
            }
            return Err(Error::NoSpace);
        }
        Ok(())
    }
}

impl Drop for FileSystem {
    fn drop(&mut self) {
        self.sync();
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;
    use alloc::vec::Vec;

    use vfs::{Error, InodeKind};

    use super::FileSystem;
    use crate::mem_disk::MemDisk;
    use crate::{Dir, SectorId, ROOT_DIR_SECTOR, SECTOR_SIZE};

    const SECTORS: usize = 4096;

    fn format() -> (Arc<MemDisk>, FileSystem) {
        let disk = Arc::new(MemDisk::new(SECTORS));
        let fs = FileSystem::format(disk.clone(), SECTORS).unwrap();
        (disk, fs)
    }

    #[test]
    fn data_survives_remount() {
        let (disk, fs) = format();
        let root = fs.root();
        fs.mkdir("/docs", &root).unwrap();
        fs.create("/docs/note", 0, &root).unwrap();
        let mut file = fs.open("/docs/note", &root).unwrap();
        assert_eq!(file.write(&[0x5a; 3 * SECTOR_SIZE]), 3 * SECTOR_SIZE);
        let free = fs.free_sectors();
        drop((file, root, fs));

        let fs = FileSystem::mount(disk).unwrap();
        assert_eq!(fs.free_sectors(), free);
        let mut file = fs.open("docs/note", &fs.root()).unwrap();
        let mut buf = [0; 3 * SECTOR_SIZE];
        assert_eq!(file.read(&mut buf), buf.len());
        assert!(buf.iter().all(|&b| b == 0x5a));
    }

    #[test]
    fn format_rejects_unaddressable_sizes() {
        let disk = Arc::new(MemDisk::new(64));
        let too_many = u32::MAX as usize + 1;
        assert_eq!(FileSystem::format(disk.clone(), too_many).err(), Some(Error::NoSpace));
        assert_eq!(FileSystem::format(disk, 1).err(), Some(Error::NoSpace));
    }

    #[test]
    fn mount_rejects_blank_disk() {
        let disk = Arc::new(MemDisk::new(64));
        assert_eq!(FileSystem::mount(disk).err(), Some(Error::Corrupted));
    }

    #[test]
    fn foo_bar_scenario() {
        let (_disk, fs) = format();
        let root = fs.root();
        fs.mkdir("/foo", &root).unwrap();
        fs.mkdir("/foo/bar", &root).unwrap();

        let mut foo = fs.open_dir("/foo", &root).unwrap();
        let names: Vec<_> = core::iter::from_fn(|| foo.readdir()).collect();
        assert_eq!(names, ["bar"]);

        assert_eq!(fs.remove("/foo", &root), Err(Error::DirectoryNotEmpty));
        assert!(fs.open_dir("/foo/bar", &root).is_ok());
        fs.remove("/foo/bar", &root).unwrap();
        fs.remove("/foo", &root).unwrap();
        assert_eq!(fs.stat("/foo", &root).err(), Some(Error::NotFound));
    }

    #[test]
    fn absolute_and_relative_paths_agree() {
        let (_disk, fs) = format();
        let mut cwd = fs.root();
        fs.mkdir("/a", &cwd).unwrap();
        fs.mkdir("/a/b", &cwd).unwrap();
        fs.mkdir("/a/b/c", &cwd).unwrap();

        let absolute = Dir::open_path("/a/b/c", &cwd).unwrap();
        fs.chdir("/a", &mut cwd).unwrap();
        let relative = Dir::open_path("b/c", &cwd).unwrap();
        assert_eq!(absolute.inode().inumber(), relative.inode().inumber());

        // 从任意工作目录出发，绝对路径的结果都一样
        fs.chdir("b/c", &mut cwd).unwrap();
        let again = Dir::open_path("/a/b/c", &cwd).unwrap();
        assert_eq!(again.inode().inumber(), absolute.inode().inumber());
    }

    #[test]
    fn dotdot_walks_up() {
        let (_disk, fs) = format();
        let mut cwd = fs.root();
        fs.mkdir("/a", &cwd).unwrap();
        fs.mkdir("/a/b", &cwd).unwrap();
        let a = fs.stat("/a", &cwd).unwrap().inumber;
        let root = u32::from(ROOT_DIR_SECTOR);

        fs.chdir("/a/b", &mut cwd).unwrap();
        assert_eq!(Dir::open_path("..", &cwd).unwrap().inode().inumber(), SectorId::from(a));
        assert_eq!(fs.stat("../..", &cwd).unwrap().inumber, root);
        // 根目录的父目录是它自己
        assert_eq!(fs.stat("/..", &cwd).unwrap().inumber, root);
        assert_eq!(fs.stat("/./a/./b/..", &cwd).unwrap().inumber, a);
    }

    #[test]
    fn create_errors() {
        let (_disk, fs) = format();
        let root = fs.root();
        fs.create("/f", 10, &root).unwrap();

        assert_eq!(fs.create("/f", 0, &root), Err(Error::AlreadyExists));
        assert_eq!(fs.mkdir("/f", &root), Err(Error::AlreadyExists));
        assert_eq!(fs.create("/", 0, &root), Err(Error::InvalidName));
        assert_eq!(fs.create("/fifteen_chars__", 0, &root), Err(Error::InvalidName));
        assert_eq!(fs.create("/no/f", 0, &root), Err(Error::NotFound));
        assert_eq!(fs.create("/f/g", 0, &root), Err(Error::NotFound));

        assert_eq!(fs.open_dir("/f", &root).err(), Some(Error::NotADirectory));
        assert_eq!(fs.open("/", &root).err(), Some(Error::IsADirectory));
        assert_eq!(fs.open("", &root).err(), Some(Error::NotFound));
    }

    #[test]
    fn root_and_dots_cannot_be_removed() {
        let (_disk, fs) = format();
        let root = fs.root();
        assert_eq!(fs.remove("/", &root), Err(Error::InvalidName));
        assert_eq!(fs.remove(".", &root), Err(Error::InvalidName));
        assert_eq!(fs.remove("/..", &root), Err(Error::InvalidName));
        assert_eq!(fs.remove("/missing", &root), Err(Error::NotFound));
    }

    #[test]
    fn remove_reclaims_space() {
        let (_disk, fs) = format();
        let root = fs.root();
        let free = fs.free_sectors();

        fs.create("/big", 200 * SECTOR_SIZE, &root).unwrap();
        let file = fs.open("/big", &root).unwrap();
        fs.remove("/big", &root).unwrap();
        assert!(fs.open("/big", &root).is_err());
        // 仍被打开，空间暂不回收
        assert!(fs.free_sectors() < free);
        assert_eq!(file.len(), 200 * SECTOR_SIZE);

        drop(file);
        assert_eq!(fs.free_sectors(), free);
    }

    #[test]
    fn removed_cwd_rejects_relative_paths() {
        let (_disk, fs) = format();
        let mut cwd = fs.root();
        fs.mkdir("/gone", &cwd).unwrap();
        fs.chdir("/gone", &mut cwd).unwrap();
        fs.remove("/gone", &fs.root()).unwrap();

        assert_eq!(fs.create("f", 0, &cwd), Err(Error::NotFound));
        assert_eq!(fs.open_dir(".", &cwd).err(), Some(Error::NotFound));
        assert!(fs.create("/f", 0, &cwd).is_ok());
    }

    #[test]
    fn trailing_separators() {
        let (_disk, fs) = format();
        let root = fs.root();
        fs.mkdir("/d/", &root).unwrap();
        fs.create("//d//f", 0, &root).unwrap();

        let stat = fs.stat("/d//", &root).unwrap();
        assert_eq!(stat.kind, InodeKind::Directory);
        assert_eq!(fs.stat("d/f", &root).unwrap().kind, InodeKind::Regular);
    }

    #[test]
    fn create_beyond_free_space() {
        let disk = Arc::new(MemDisk::new(64));
        let fs = FileSystem::format(disk, 64).unwrap();
        let root = fs.root();

        assert_eq!(fs.create("/huge", 100 * SECTOR_SIZE, &root), Err(Error::NoSpace));
        assert_eq!(fs.stat("/huge", &root).err(), Some(Error::NotFound));
    }

    #[test]
    fn writes_grow_through_handles() {
        let (_disk, fs) = format();
        let root = fs.root();
        fs.create("/log", 0, &root).unwrap();
        let mut file = fs.open("/log", &root).unwrap();

        file.seek(70_000);
        assert_eq!(file.write(b"tail"), 4);
        assert_eq!(fs.stat("/log", &root).unwrap().size, 70_004);

        let mut exe = fs.open("/log", &root).unwrap();
        exe.deny_write();
        assert_eq!(file.write_at(0, b"x"), 0);
        drop(exe);
        assert_eq!(file.write_at(0, b"x"), 1);
    }
}
