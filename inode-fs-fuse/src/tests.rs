use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;

use inode_fs::{FileSystem, SECTOR_SIZE};
use typed_bytesize::ByteSizeIec;
use vfs::{Error, InodeKind};

use crate::BlockFile;

/// 宿主机临时目录下的镜像文件，测试结束时删除
struct Image {
    path: PathBuf,
    sectors: usize,
}

impl Image {
    fn new(name: &str, size: u64) -> Self {
        let path = std::env::temp_dir().join(format!(
            "inode-fs-{}-{name}.img",
            std::process::id()
        ));
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        fd.set_len(size).unwrap();

        Self {
            path,
            sectors: size as usize / SECTOR_SIZE,
        }
    }

    fn device(&self) -> Arc<BlockFile> {
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .unwrap();
        Arc::new(BlockFile::new(fd))
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn packed_tree_survives_remount() {
    let image = Image::new("remount", ByteSizeIec::mib(4).0);
    // 跨过直接块与一级间接块，落到二级间接块里
    let data = pattern(300 * 1024);

    {
        let fs = FileSystem::format(image.device(), image.sectors).unwrap();
        let root = fs.root();
        fs.mkdir("/usr", &root).unwrap();
        fs.mkdir("/usr/bin", &root).unwrap();
        fs.create("/usr/bin/app", 0, &root).unwrap();

        let mut app = fs.open("/usr/bin/app", &root).unwrap();
        app.write_all(&data).unwrap();
    }

    let fs = FileSystem::mount(image.device()).unwrap();
    let mut cwd = fs.root();
    fs.chdir("usr/bin", &mut cwd).unwrap();

    let stat = fs.stat("app", &cwd).unwrap();
    assert_eq!(stat.kind, InodeKind::Regular);
    assert_eq!(stat.size, data.len() as u64);

    let mut app = fs.open("app", &cwd).unwrap();
    let mut read_back = vec![0; data.len() + 100];
    assert_eq!(app.read(&mut read_back), data.len());
    assert_eq!(&read_back[..data.len()], &data[..]);

    let mut bin = fs.open_dir("/usr/bin", &cwd).unwrap();
    assert_eq!(bin.readdir().as_deref(), Some("app"));
    assert_eq!(bin.readdir(), None);
    assert_eq!(fs.stat("..", &cwd).unwrap().kind, InodeKind::Directory);
}

#[test]
fn removal_is_durable() {
    let image = Image::new("removal", ByteSizeIec::mib(1).0);
    let free = {
        let fs = FileSystem::format(image.device(), image.sectors).unwrap();
        let root = fs.root();
        let free = fs.free_sectors();
        fs.mkdir("/tmp", &root).unwrap();
        fs.create("/tmp/scratch", 64 * 1024, &root).unwrap();
        assert!(fs.free_sectors() < free);
        fs.remove("/tmp/scratch", &root).unwrap();
        fs.remove("/tmp", &root).unwrap();
        free
    };

    let fs = FileSystem::mount(image.device()).unwrap();
    let root = fs.root();
    assert_eq!(fs.free_sectors(), free);
    assert_eq!(fs.open_dir("/tmp", &root).err(), Some(Error::NotFound));
    assert!(fs.root().ls().is_empty());
}

#[test]
fn unformatted_image_is_rejected() {
    let image = Image::new("blank", ByteSizeIec::mib(1).0);
    assert_eq!(
        FileSystem::mount(image.device()).err(),
        Some(Error::Corrupted)
    );
}

#[test]
fn threads_grow_one_file() {
    const THREADS: usize = 4;
    const STRIDE: usize = 20 * 1024;
    const CHUNK: usize = 8 * 1024;

    let image = Image::new("threads", ByteSizeIec::mib(2).0);
    let fs = FileSystem::format(image.device(), image.sectors).unwrap();
    let root = fs.root();
    fs.create("/shared", 0, &root).unwrap();
    let free = fs.free_sectors();

    // 每个线程都越过当前末尾写入，增长互相交错
    std::thread::scope(|scope| {
        for t in 0..THREADS {
            let fs = &fs;
            scope.spawn(move || {
                let mut file = fs.open("/shared", &fs.root()).unwrap();
                file.seek(t * STRIDE);
                file.write_all(&vec![t as u8 + 1; CHUNK]).unwrap();
            });
        }
    });

    let end = (THREADS - 1) * STRIDE + CHUNK;
    let file = fs.open("/shared", &root).unwrap();
    assert_eq!(file.len(), end);

    for t in 0..THREADS {
        let mut buf = vec![0xff; STRIDE];
        let n = file.read_at(t * STRIDE, &mut buf);
        assert!(buf[..CHUNK].iter().all(|&b| b == t as u8 + 1));
        assert!(buf[CHUNK..n].iter().all(|&b| b == 0));
    }

    // 136 个数据块越过了 123 个直接索引，另需一个一级索引块
    assert_eq!(free - fs.free_sectors(), end.div_ceil(SECTOR_SIZE) + 1);
}
