mod cli;

use std::fs::{self, OpenOptions};
use std::io;
use std::sync::Arc;

use clap::Parser;
use cli::Cli;
use inode_fs::{FileSystem, SECTOR_SIZE};
use inode_fs_fuse::BlockFile;
use typed_bytesize::ByteSizeIec;

fn main() -> io::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    println!("source={:?}\nmount={:?}", cli.source, cli.mount);

    let disk_size = ByteSizeIec::mib(cli.size_mib).0;
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(cli.out_dir.join("fs.img"))?;
    fd.set_len(disk_size)?;

    let block_file = Arc::new(BlockFile::new(fd));
    let fs = FileSystem::format(block_file, disk_size as usize / SECTOR_SIZE)
        .map_err(io::Error::other)?;
    let mut cwd = fs.root();

    // 逐级建出目标目录
    let mut prefix = String::new();
    for name in cli.mount.split('/').filter(|name| !name.is_empty()) {
        prefix.push('/');
        prefix.push_str(name);
        match fs.mkdir(&prefix, &cwd) {
            Ok(()) | Err(vfs::Error::AlreadyExists) => {}
            Err(err) => return Err(io::Error::other(err)),
        }
    }
    fs.chdir(&cli.mount, &mut cwd).map_err(io::Error::other)?;

    for entry in fs::read_dir(&cli.source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            log::warn!("skip non-UTF-8 file name {:?}", entry.file_name());
            continue;
        };

        let data = fs::read(entry.path())?;
        match fs.create(&name, 0, &cwd) {
            Ok(()) => log::info!("pack {name:?}: {} bytes", data.len()),
            Err(vfs::Error::InvalidName) => {
                log::warn!("skip {name:?}: longer than {} bytes", inode_fs::NAME_MAX);
                continue;
            }
            Err(err) => return Err(io::Error::other(err)),
        }
        let mut file = fs.open(&name, &cwd).map_err(io::Error::other)?;
        file.write_all(&data).map_err(io::Error::other)?;
    }

    let mut names = Vec::new();
    while let Some(name) = cwd.readdir() {
        names.push(name);
    }
    println!("{}: {names:?}", cli.mount);
    log::info!("{} sectors free", fs.free_sectors());

    Ok(())
}
