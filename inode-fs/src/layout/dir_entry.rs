use core::{mem, ptr, slice};

use crate::{SectorId, NAME_MAX};

/// 目录项，目录的数据就是一串定长的目录项。
///
/// 每个目录的 0 号槽位保留给父目录的回指，
/// 它只有 `inode_sector` 有意义，且始终不处于使用状态。
#[derive(Debug, Default, Clone)]
#[repr(C)]
pub struct DirEntry {
    inode_sector: u32,
    // 最后一字节留给 \0
    name: [u8; NAME_MAX + 1],
    in_use: u8,
}

impl DirEntry {
    /// 目录项大小恒为20字节
    pub const SIZE: usize = 20;

    #[inline]
    pub fn new(name: &str, inode_sector: SectorId) -> Self {
        let bytes = name.as_bytes();
        let mut name = [0; NAME_MAX + 1];
        name[..bytes.len()].copy_from_slice(bytes);

        Self {
            inode_sector: inode_sector.into(),
            name,
            in_use: 1,
        }
    }

    /// 指向父目录的回指项
    #[inline]
    pub fn backlink(parent: SectorId) -> Self {
        Self {
            inode_sector: parent.into(),
            ..Default::default()
        }
    }

    /// 非空、不超过 [`NAME_MAX`] 字节、不含分隔符与 \0
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty() && name.len() <= NAME_MAX && !name.bytes().any(|c| c == b'/' || c == 0)
    }

    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&c| c == 0).unwrap_or(NAME_MAX);
        core::str::from_utf8(&self.name[..len]).unwrap_or_default()
    }

    #[inline]
    pub fn inode_sector(&self) -> SectorId {
        self.inode_sector.into()
    }

    #[inline]
    pub fn is_in_use(&self) -> bool {
        self.in_use != 0
    }

    #[inline]
    pub fn set_in_use(&mut self, in_use: bool) {
        self.in_use = in_use as u8;
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), Self::SIZE) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), Self::SIZE) }
    }
}

const _: () = assert!(mem::size_of::<DirEntry>() == DirEntry::SIZE);
