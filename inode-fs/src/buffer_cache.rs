//! # 块缓存层
//!
//! 块设备读写速度一般慢于内存读写速度，因此我们在内存中开辟定长的槽位池，
//! 文件系统对扇区的一切访问都经过这里，块缓存层是唯一直接接触块设备的地方。
//!
//! - 命中时直接在槽位上拷贝数据；未命中时由**时钟算法**挑出一个槽位，
//!   先从设备读入扇区，再进行拷贝。
//! - 写入只落在槽位上并标记为脏，等到槽位被置换或 [`BufferCache::flush_all`]
//!   时才写回设备。
//! - 槽位从不以引用的形式交给使用者，使用者拿到的永远是拷贝。
//!
//! 整个槽位池由一把互斥锁保护，所有操作完全串行。

use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use enumflags2::{bitflags, BitFlags};
use spin::Mutex;

use crate::{DataBlock, SectorId, CACHE_SLOTS, SECTOR_SIZE};

pub struct BufferCache {
    /// 底层块设备的引用
    device: Arc<dyn BlockDevice>,
    pool: Mutex<ClockPool>,
}

/// 槽位池与时钟指针
struct ClockPool {
    slots: Vec<CacheSlot>,
    hand: usize,
}

/// 槽位的身份是它在池中的下标，而不是它当前缓存的扇区
struct CacheSlot {
    sector: SectorId,
    data: DataBlock,
    flags: BitFlags<SlotFlag>,
}

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotFlag {
    /// 槽位中存有某个扇区的数据
    Valid = 0b001,
    /// 数据比设备上的新
    Dirty = 0b010,
    /// 自时钟指针上次经过以来被访问过
    Access = 0b100,
}

impl BufferCache {
    #[inline]
    pub fn new(device: Arc<dyn BlockDevice>) -> Self {
        Self::with_capacity(device, CACHE_SLOTS)
    }

    pub fn with_capacity(device: Arc<dyn BlockDevice>, slots: usize) -> Self {
        assert!(slots > 0);
        Self {
            device,
            pool: Mutex::new(ClockPool {
                slots: (0..slots).map(|_| CacheSlot::empty()).collect(),
                hand: 0,
            }),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.pool.lock().slots.len()
    }

    /// 读出整个扇区，`buf` 的长度必须恰为 [`SECTOR_SIZE`]
    pub fn read(&self, sector: SectorId, buf: &mut [u8]) {
        assert_eq!(buf.len(), SECTOR_SIZE);
        let mut pool = self.pool.lock();
        let index = pool.fetch(sector, &*self.device);
        let slot = &mut pool.slots[index];
        slot.flags |= SlotFlag::Access;
        buf.copy_from_slice(&slot.data);
    }

    /// 覆写整个扇区，立即对之后的读可见，写回设备则推迟到置换或刷新时
    pub fn write(&self, sector: SectorId, buf: &[u8]) {
        assert_eq!(buf.len(), SECTOR_SIZE);
        let mut pool = self.pool.lock();
        let index = pool.fetch(sector, &*self.device);
        let slot = &mut pool.slots[index];
        slot.flags |= SlotFlag::Access | SlotFlag::Dirty;
        slot.data.copy_from_slice(buf);
    }

    /// 若 `sector` 在缓存中且为脏，立即写回设备
    pub fn flush(&self, sector: SectorId) {
        let mut pool = self.pool.lock();
        if let Some(index) = pool.lookup(sector) {
            let slot = &mut pool.slots[index];
            if slot.flags.contains(SlotFlag::Dirty) {
                slot.flush(&*self.device);
            }
        }
    }

    /// 将所有脏槽位写回设备
    pub fn flush_all(&self) {
        let mut pool = self.pool.lock();
        let mut flushed = 0;
        for slot in pool
            .slots
            .iter_mut()
            .filter(|slot| slot.flags.contains(SlotFlag::Valid | SlotFlag::Dirty))
        {
            slot.flush(&*self.device);
            flushed += 1;
        }
        log::debug!("flushed {flushed} dirty sectors");
    }
}

impl ClockPool {
    fn lookup(&self, sector: SectorId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.flags.contains(SlotFlag::Valid) && slot.sector == sector)
    }

    /// 返回缓存着 `sector` 的槽位下标，未命中则先装入
    fn fetch(&mut self, sector: SectorId, device: &dyn BlockDevice) -> usize {
        if let Some(index) = self.lookup(sector) {
            return index;
        }

        log::trace!("cache miss on sector {sector}");
        let index = self.select_victim(device);
        let slot = &mut self.slots[index];
        device.read_block(sector.into(), &mut slot.data);
        slot.sector = sector;
        slot.flags = SlotFlag::Valid.into();
        index
    }

    // 时钟置换：无效槽位立即可用；有访问位的清掉访问位给第二次机会
    fn select_victim(&mut self, device: &dyn BlockDevice) -> usize {
        loop {
            let index = self.hand;
            self.hand = (self.hand + 1) % self.slots.len();

            let slot = &mut self.slots[index];
            if !slot.flags.contains(SlotFlag::Valid) {
                return index;
            }
            if slot.flags.contains(SlotFlag::Access) {
                slot.flags.remove(SlotFlag::Access);
                continue;
            }

            log::trace!("evict sector {} from slot {index}", slot.sector);
            if slot.flags.contains(SlotFlag::Dirty) {
                slot.flush(device);
            }
            slot.flags.remove(SlotFlag::Valid);
            return index;
        }
    }
}

impl CacheSlot {
    fn empty() -> Self {
        Self {
            sector: SectorId::new(0),
            data: [0; SECTOR_SIZE],
            flags: BitFlags::empty(),
        }
    }

    fn flush(&mut self, device: &dyn BlockDevice) {
        device.write_block(self.sector.into(), &self.data);
        self.flags.remove(SlotFlag::Dirty);
    }
}
