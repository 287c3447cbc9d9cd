//! 磁盘上的 inode 头，恰好占据一个扇区。
//!
//! 数据块通过三级索引定位：
//! - 直接：头中的 [`DIRECT_COUNT`] 个块编号，各指向一个**数据块**
//! - 一级：整个块连续存储**块编号**，每个编号都指向一个**数据块**
//! - 二级：整个块连续存储**块编号**，每个编号都指向一个一级索引块
//!
//! ## 块索引编码
//!
//! - 深度为 d 的索引块中，每一项覆盖 `PTRS_PER_SECTOR^(d-1)` 个数据块
//! - 块索引除以覆盖数得到项的位置，取模得到下一层内的索引
//!
//! 索引块只在第一次需要时分配；新分配的扇区先清零再挂上索引，
//! 已删除文件残留在磁盘上的内容因此不会泄露。

use core::{mem, ptr, slice};

use crate::free_map::SectorAllocator;
use crate::{BufferCache, DataBlock, SectorId, INODE_MAGIC, SECTOR_SIZE};

/// 头中的直接索引个数
pub const DIRECT_COUNT: usize = 123;
/// 间接索引块的编号容量
pub const PTRS_PER_SECTOR: usize = SECTOR_SIZE / mem::size_of::<u32>();
/// 单个 inode 可编号的数据块上限
pub const MAX_SECTORS: usize = DIRECT_COUNT + PTRS_PER_SECTOR + PTRS_PER_SECTOR * PTRS_PER_SECTOR;

/// 间接索引块
type IndirectBlock = [u32; PTRS_PER_SECTOR];

const ZEROS: DataBlock = [0; SECTOR_SIZE];

#[derive(Clone)]
#[repr(C)]
pub struct DiskInode {
    /// 直接索引块，包含 DIRECT_COUNT 个块编号
    direct: [u32; DIRECT_COUNT],
    /// 指向一个一级索引块
    indirect: u32,
    /// 指向一个二级索引块
    doubly_indirect: u32,
    // 不用bool是为了让任意字节都是合法值
    is_dir: u8,
    _pad: [u8; 3],
    /// 字节长度
    length: i32,
    magic: u32,
}

const _: () = assert!(mem::size_of::<DiskInode>() == SECTOR_SIZE);

impl DiskInode {
    pub const fn new(is_dir: bool) -> Self {
        Self {
            is_dir: is_dir as u8,
            magic: INODE_MAGIC,
            ..Self::zeroed()
        }
    }

    /// 经缓存读出 `sector` 上的 inode 头，魔数不符时返回空
    pub fn load(cache: &BufferCache, sector: SectorId) -> Option<Self> {
        let mut disk_inode = Self::zeroed();
        cache.read(sector, disk_inode.as_bytes_mut());
        if disk_inode.magic != INODE_MAGIC {
            log::error!(
                "bad inode magic {:#010x} at sector {sector}",
                disk_inode.magic
            );
            return None;
        }
        Some(disk_inode)
    }

    #[inline]
    pub fn store(&self, cache: &BufferCache, sector: SectorId) {
        cache.write(sector, self.as_bytes());
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.is_dir != 0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.length.max(0) as usize
    }

    #[inline]
    pub fn set_len(&mut self, length: usize) {
        assert!(length <= MAX_SECTORS * SECTOR_SIZE);
        self.length = length as i32;
    }

    /// 逻辑上 inode 指向一系列数据块，此处传入的是这些数据块的索引（逻辑索引），
    /// 然后返回数据块所在扇区
    pub fn block_sector(&self, block_index: usize, cache: &BufferCache) -> Option<SectorId> {
        let mut index = block_index;
        if index < DIRECT_COUNT {
            return resolve(self.direct[index].into(), 0, 0, cache);
        }

        // 剔去直接索引的部分
        index -= DIRECT_COUNT;
        if index < PTRS_PER_SECTOR {
            return resolve(self.indirect.into(), index, 1, cache);
        }

        // 剔去使用了一级索引的部分
        index -= PTRS_PER_SECTOR;
        if index < PTRS_PER_SECTOR * PTRS_PER_SECTOR {
            return resolve(self.doubly_indirect.into(), index, 2, cache);
        }

        None
    }

    /// 字节偏移 `pos` 所在的扇区，超出长度时返回空
    #[inline]
    pub fn byte_to_sector(&self, pos: usize, cache: &BufferCache) -> Option<SectorId> {
        if pos < self.len() {
            self.block_sector(pos / SECTOR_SIZE, cache)
        } else {
            None
        }
    }

    /// 让索引树覆盖 `length` 字节，已有的块编号原样保留。
    ///
    /// 超出容量时不做任何修改直接失败；分配到一半空间耗尽时，
    /// 已挂上的块不会回滚。长度由调用者在成功后更新。
    pub fn allocate(
        &mut self,
        length: usize,
        cache: &BufferCache,
        alloc: &mut dyn SectorAllocator,
    ) -> bool {
        let sectors = Self::sector_count(length);
        if sectors > MAX_SECTORS {
            log::warn!("{length} bytes exceed the capacity of an inode");
            return false;
        }

        let [direct, single, double] = split_tiers(sectors);
        for ptr in &mut self.direct[..direct] {
            if !allocate_tree(ptr, 1, 0, cache, alloc) {
                return false;
            }
        }

        (single == 0 || allocate_tree(&mut self.indirect, single, 1, cache, alloc))
            && (double == 0 || allocate_tree(&mut self.doubly_indirect, double, 2, cache, alloc))
    }

    /// 归还长度所覆盖的全部数据块与索引块，叶子先于指向它的索引块归还
    pub fn release(&self, cache: &BufferCache, alloc: &mut dyn SectorAllocator) {
        let [direct, single, double] = split_tiers(Self::sector_count(self.len()));

        for &ptr in &self.direct[..direct] {
            release_tree(ptr.into(), 1, 0, cache, alloc);
        }
        if single > 0 {
            release_tree(self.indirect.into(), single, 1, cache, alloc);
        }
        if double > 0 {
            release_tree(self.doubly_indirect.into(), double, 2, cache, alloc);
        }
    }

    /// 从指定位置(字节偏移)读出数据填充`buf`，返回实际读取的字节数
    pub fn read_at(&self, offset: usize, buf: &mut [u8], cache: &BufferCache) -> usize {
        let length = self.len();
        let mut bounce = ZEROS;
        let mut offset = offset;
        let mut read_size = 0;

        while read_size < buf.len() {
            let Some(sector) = self.byte_to_sector(offset, cache) else {
                break;
            };
            // 绝对地址 % 块大小 = 块内偏移
            let sector_ofs = offset % SECTOR_SIZE;
            let chunk = (buf.len() - read_size)
                .min(length - offset)
                .min(SECTOR_SIZE - sector_ofs);
            let dest = &mut buf[read_size..read_size + chunk];

            if chunk == SECTOR_SIZE {
                cache.read(sector, dest);
            } else {
                cache.read(sector, &mut bounce);
                dest.copy_from_slice(&bounce[sector_ofs..sector_ofs + chunk]);
            }

            read_size += chunk;
            offset += chunk;
        }

        read_size
    }

    /// 在现有长度内写入，不会增长
    pub fn write_at(&self, offset: usize, buf: &[u8], cache: &BufferCache) -> usize {
        let length = self.len();
        let mut bounce = ZEROS;
        let mut offset = offset;
        let mut written_size = 0;

        while written_size < buf.len() {
            let Some(sector) = self.byte_to_sector(offset, cache) else {
                break;
            };
            let sector_ofs = offset % SECTOR_SIZE;
            let chunk = (buf.len() - written_size)
                .min(length - offset)
                .min(SECTOR_SIZE - sector_ofs);
            let src = &buf[written_size..written_size + chunk];

            if chunk == SECTOR_SIZE {
                cache.write(sector, src);
            } else {
                // 保住扇区中不在本次写入范围内的部分
                cache.read(sector, &mut bounce);
                bounce[sector_ofs..sector_ofs + chunk].copy_from_slice(src);
                cache.write(sector, &bounce);
            }

            written_size += chunk;
            offset += chunk;
        }

        written_size
    }

    /// 计算容纳指定数据量需要多少个**数据块**
    #[inline]
    pub fn sector_count(length: usize) -> usize {
        length.div_ceil(SECTOR_SIZE)
    }

    /// 计算容纳指定数据量需要多少个 **数据块** 和 **索引块**
    pub fn total_sector_count(length: usize) -> usize {
        let data = Self::sector_count(length);
        let [_, single, double] = split_tiers(data);
        let mut total = data;

        if single > 0 {
            total += 1;
        }
        if double > 0 {
            total += 1 + double.div_ceil(PTRS_PER_SECTOR);
        }

        total
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), SECTOR_SIZE) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), SECTOR_SIZE) }
    }
}

impl DiskInode {
    const fn zeroed() -> Self {
        Self {
            direct: [0; DIRECT_COUNT],
            indirect: 0,
            doubly_indirect: 0,
            is_dir: 0,
            _pad: [0; 3],
            length: 0,
            magic: 0,
        }
    }
}

/// 把数据块个数拆到三级索引上：[直接, 一级, 二级]
fn split_tiers(sectors: usize) -> [usize; 3] {
    let direct = sectors.min(DIRECT_COUNT);
    let rest = sectors - direct;
    let single = rest.min(PTRS_PER_SECTOR);
    [direct, single, rest - single]
}

/// 在以 `root` 为根、深度为 `depth` 的索引树中查找第 `index` 个数据块
fn resolve(root: SectorId, index: usize, depth: u32, cache: &BufferCache) -> Option<SectorId> {
    if root.is_null() {
        return None;
    }
    if depth == 0 {
        return Some(root);
    }

    let unit = PTRS_PER_SECTOR.pow(depth - 1);
    let block = read_indirect(cache, root);
    resolve(block[index / unit].into(), index % unit, depth - 1, cache)
}

/// 让 `ptr` 所指的深度为 `depth` 的索引树覆盖 `count` 个数据块
fn allocate_tree(
    ptr: &mut u32,
    count: usize,
    depth: u32,
    cache: &BufferCache,
    alloc: &mut dyn SectorAllocator,
) -> bool {
    if *ptr == 0 {
        let Some(sector) = alloc.allocate(1) else {
            return false;
        };
        cache.write(sector, &ZEROS);
        *ptr = sector.into();
    }
    if depth == 0 {
        return true;
    }

    let sector = SectorId::from(*ptr);
    let unit = PTRS_PER_SECTOR.pow(depth - 1);
    let mut block = read_indirect(cache, sector);
    let mut remain = count;
    let mut ok = true;
    for child in block.iter_mut().take(count.div_ceil(unit)) {
        let n = remain.min(unit);
        if !allocate_tree(child, n, depth - 1, cache, alloc) {
            ok = false;
            break;
        }
        remain -= n;
    }
    // 失败时也写回，已挂上的块在下次增长时会被复用
    write_indirect(cache, sector, &block);

    ok
}

fn release_tree(
    sector: SectorId,
    count: usize,
    depth: u32,
    cache: &BufferCache,
    alloc: &mut dyn SectorAllocator,
) {
    if depth > 0 {
        let unit = PTRS_PER_SECTOR.pow(depth - 1);
        let block = read_indirect(cache, sector);
        let mut remain = count;
        for &child in block.iter().take(count.div_ceil(unit)) {
            let n = remain.min(unit);
            release_tree(child.into(), n, depth - 1, cache, alloc);
            remain -= n;
        }
    }
    alloc.release(sector, 1);
}

fn read_indirect(cache: &BufferCache, sector: SectorId) -> IndirectBlock {
    let mut raw = ZEROS;
    cache.read(sector, &mut raw);

    let mut block = [0; PTRS_PER_SECTOR];
    for (ptr, bytes) in block.iter_mut().zip(raw.chunks_exact(4)) {
        let mut word = [0; 4];
        word.copy_from_slice(bytes);
        *ptr = u32::from_ne_bytes(word);
    }
    block
}

fn write_indirect(cache: &BufferCache, sector: SectorId, block: &IndirectBlock) {
    let mut raw = ZEROS;
    for (bytes, ptr) in raw.chunks_exact_mut(4).zip(block) {
        bytes.copy_from_slice(&ptr.to_ne_bytes());
    }
    cache.write(sector, &raw);
}
