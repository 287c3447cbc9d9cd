//! # 空闲扇区管理
//!
//! 位图记录设备上每个扇区的占用情况，每个扇区对应一位。
//!
//! 位图本身作为一个普通文件存放在磁盘上，其 inode 头位于
//! [`FREE_MAP_SECTOR`]。格式化时就按位图的完整长度创建该文件，
//! 因此保存位图时文件不会增长，也就不会反过来向位图申请扇区。
//!
//! 文件内容：扇区总数(u32, 小端) | 位图(u64 组, 小端)

use alloc::vec;
use alloc::vec::Vec;

use crate::layout::DiskInode;
use crate::{BufferCache, SectorId, FREE_MAP_SECTOR};

/// 文件系统所消费的空闲空间分配器
pub trait SectorAllocator {
    /// 分配 `count` 个连续扇区并返回首个扇区号，空间不足时返回空
    fn allocate(&mut self, count: usize) -> Option<SectorId>;
    /// 归还从 `sector` 起的 `count` 个扇区
    fn release(&mut self, sector: SectorId, count: usize);
}

#[derive(Debug, Clone)]
pub struct FreeMap {
    bits: Vec<u64>,
    sectors: usize,
}

/// 文件头：扇区总数
const HEADER_LEN: usize = 4;

impl FreeMap {
    pub fn new(sectors: usize) -> Self {
        Self {
            bits: vec![0; sectors.div_ceil(64)],
            sectors,
        }
    }

    /// 位图所指示的扇区总数
    #[inline]
    pub fn capacity(&self) -> usize {
        self.sectors
    }

    pub fn free_count(&self) -> usize {
        self.sectors - self.bits.iter().map(|bits| bits.count_ones() as usize).sum::<usize>()
    }

    #[inline]
    pub fn is_used(&self, sector: SectorId) -> bool {
        self.test(sector.into())
    }

    /// 将指定扇区标为占用，格式化时用于保留固定扇区
    pub fn mark(&mut self, sector: SectorId) {
        let index = usize::from(sector);
        assert!(index < self.sectors);
        self.bits[index / 64] |= 1 << (index % 64);
    }

    /// 位图文件的字节长度
    #[inline]
    pub fn file_len(&self) -> usize {
        HEADER_LEN + self.bits.len() * 8
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.file_len());
        bytes.extend_from_slice(&(self.sectors as u32).to_le_bytes());
        for bits in &self.bits {
            bytes.extend_from_slice(&bits.to_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (header, body) = bytes.split_first_chunk::<HEADER_LEN>()?;
        let sectors = u32::from_le_bytes(*header) as usize;
        let words = sectors.div_ceil(64);
        if body.len() < words * 8 {
            return None;
        }

        let bits = body
            .chunks_exact(8)
            .take(words)
            .map(|word| {
                let mut raw = [0; 8];
                raw.copy_from_slice(word);
                u64::from_le_bytes(raw)
            })
            .collect();
        Some(Self { bits, sectors })
    }

    /// 从磁盘上的位图文件读出位图
    pub(crate) fn load(cache: &BufferCache) -> Option<Self> {
        let file = DiskInode::load(cache, FREE_MAP_SECTOR)?;
        let mut bytes = vec![0; file.len()];
        if file.read_at(0, &mut bytes, cache) != bytes.len() {
            return None;
        }
        Self::from_bytes(&bytes)
    }

    /// 将位图写回磁盘上的位图文件
    pub(crate) fn store(&self, cache: &BufferCache) -> bool {
        let Some(file) = DiskInode::load(cache, FREE_MAP_SECTOR) else {
            return false;
        };
        let bytes = self.to_bytes();
        // 格式化时文件已按完整长度创建，这里只覆写不增长
        assert!(bytes.len() <= file.len());
        file.write_at(0, &bytes, cache) == bytes.len()
    }
}

impl FreeMap {
    #[inline]
    fn test(&self, index: usize) -> bool {
        self.bits[index / 64] & (1 << (index % 64)) != 0
    }
}

impl SectorAllocator for FreeMap {
    // 首次适配：找到第一段足够长的连续空闲扇区
    fn allocate(&mut self, count: usize) -> Option<SectorId> {
        if count == 0 {
            return None;
        }

        let mut start = 0;
        let mut run = 0;
        let mut index = 0;
        while index < self.sectors {
            // 整组占满时直接跳过
            if run == 0 && index % 64 == 0 && self.bits[index / 64] == u64::MAX {
                index += 64;
                start = index;
                continue;
            }

            if self.test(index) {
                run = 0;
                start = index + 1;
            } else {
                run += 1;
                if run == count {
                    for i in start..start + count {
                        self.bits[i / 64] |= 1 << (i % 64);
                    }
                    return Some(SectorId::new(start as u32));
                }
            }
            index += 1;
        }

        log::warn!("free map exhausted: no run of {count} free sectors");
        None
    }

    fn release(&mut self, sector: SectorId, count: usize) {
        let start = usize::from(sector);
        for i in start..start + count {
            // 编号一定得有对应的位
            assert!(self.test(i), "releasing free sector #{i}");
            self.bits[i / 64] &= !(1 << (i % 64));
        }
    }
}
