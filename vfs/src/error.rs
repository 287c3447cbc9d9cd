use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    AlreadyExists,
    NotFound,
    /// 名字为空、过长，或是 `.`/`..`
    InvalidName,
    /// 超出三级索引的容量，或空闲扇区耗尽
    NoSpace,
    IsADirectory,
    NotADirectory,
    DirectoryNotEmpty,
    /// 文件正被执行，拒绝写入
    WriteDenied,
    /// 魔数不符
    Corrupted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::AlreadyExists => "entry already exists",
            Error::NotFound => "no such file or directory",
            Error::InvalidName => "invalid file name",
            Error::NoSpace => "no space left on device",
            Error::IsADirectory => "is a directory",
            Error::NotADirectory => "not a directory",
            Error::DirectoryNotEmpty => "directory not empty",
            Error::WriteDenied => "file is denied for writing",
            Error::Corrupted => "bad inode magic",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for Error {}
