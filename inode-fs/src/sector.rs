//! 扇区号的抽象

use core::fmt;

use derive_more::{From, Into};

/// 设备上的扇区号。
///
/// 0 号扇区恒为空闲位图文件的 inode 头，永远不会成为数据块，
/// 因此索引块中的 0 表示“尚未分配”。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[repr(transparent)]
pub struct SectorId(u32);

impl SectorId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl From<SectorId> for usize {
    #[inline]
    fn from(id: SectorId) -> Self {
        id.0 as usize
    }
}

impl fmt::Display for SectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
