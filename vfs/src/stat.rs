#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum InodeKind {
    #[default]
    Regular,
    Directory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub kind: InodeKind,
    /// inode 头所在扇区号
    pub inumber: u32,
    /// File size
    pub size: u64,
}
