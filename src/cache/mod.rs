/*
 * Block Cache
 *
 * A fixed-size write-back cache of disk-block-sized pages between the
 * caller and a block device. Each entry carries three flag bits:
 *
 * - V (valid): the entry holds a live block; when clear, the slot's block
 *   number is meaningless
 * - R (referenced): touched since the sweeper last decayed it
 * - M (modified): dirty since the last write-back; implies V
 *
 * Lookups only ever match valid entries, and at most one entry holds any
 * given block number. A miss fetches the block into a victim slot chosen by
 * an NRU cascade: invalid first, then R=0 M=0, then R=0, then M=0, then
 * slot 0 as a last resort. Whatever category fires, a valid dirty victim is
 * written back before being replaced.
 *
 * The sweeper thread (see sweeper.rs) approximates LRU by decaying R bits
 * and flushing dirty entries on a fixed cycle.
 *
 * The cache is single-threaded cooperative like the rest of the runtime:
 * no operation here suspends, so the spin lock on the global instance is
 * only ever taken uncontended.
 */

pub mod device;
pub mod sweeper;

use std::fmt::Write as _;

use spin::Mutex;

use device::BlockDevice;

/// Bytes per block.
pub const BLOCK_SIZE: usize = 512;

/// Number of cache slots.
pub const CACHE_SIZE: usize = 8;

bitflags::bitflags! {
    /// Per-entry state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryFlags: u8 {
        const VALID = 1 << 0;
        const REFERENCED = 1 << 1;
        const DIRTY = 1 << 2;
    }
}

struct CacheEntry {
    flags: EntryFlags,
    /// Sweeper aging counter, wraps at 20.
    counter: u32,
    block_no: u64,
    data: [u8; BLOCK_SIZE],
}

impl CacheEntry {
    fn empty() -> Self {
        Self {
            flags: EntryFlags::empty(),
            counter: 0,
            block_no: 0,
            data: [0u8; BLOCK_SIZE],
        }
    }
}

/// Fixed-size write-back block cache over a device.
pub struct BlockCache {
    entries: [CacheEntry; CACHE_SIZE],
    device: Box<dyn BlockDevice>,
}

impl BlockCache {
    pub fn new(device: Box<dyn BlockDevice>) -> Self {
        Self {
            entries: core::array::from_fn(|_| CacheEntry::empty()),
            device,
        }
    }

    /// Read a block through the cache.
    pub fn read(&mut self, block_no: u64, buf: &mut [u8; BLOCK_SIZE]) -> Result<(), &'static str> {
        if self.copy_out(block_no, buf) {
            return Ok(());
        }
        self.fetch(block_no)?;
        if self.copy_out(block_no, buf) {
            Ok(())
        } else {
            // A fetch that does not land the block is a victim-selection bug.
            panic!("block {} missing from cache after fetch", block_no);
        }
    }

    /// Write a block through the cache. The data stays dirty in the cache
    /// until eviction, sweeping or an explicit flush writes it back.
    pub fn write(&mut self, block_no: u64, buf: &[u8; BLOCK_SIZE]) -> Result<(), &'static str> {
        if self.copy_in(block_no, buf) {
            return Ok(());
        }
        self.fetch(block_no)?;
        if self.copy_in(block_no, buf) {
            Ok(())
        } else {
            panic!("block {} missing from cache after fetch", block_no);
        }
    }

    /// Drop any cached copy of the block. Dirty data is discarded; keeping
    /// it is the caller's responsibility.
    pub fn invalidate(&mut self, block_no: u64) {
        for entry in &mut self.entries {
            if entry.flags.contains(EntryFlags::VALID) && entry.block_no == block_no {
                entry.flags.remove(EntryFlags::VALID | EntryFlags::REFERENCED | EntryFlags::DIRTY);
            }
        }
    }

    /// Write every valid dirty entry back and invalidate the whole cache.
    pub fn flush_all(&mut self) -> Result<(), &'static str> {
        for i in 0..CACHE_SIZE {
            if self.entries[i].flags.contains(EntryFlags::VALID | EntryFlags::DIRTY) {
                self.write_back(i)?;
            }
        }
        for entry in &mut self.entries {
            entry.flags.remove(EntryFlags::VALID | EntryFlags::REFERENCED | EntryFlags::DIRTY);
        }
        Ok(())
    }

    /// (valid, dirty) entry counts.
    pub fn stats(&self) -> (usize, usize) {
        let valid = self
            .entries
            .iter()
            .filter(|e| e.flags.contains(EntryFlags::VALID))
            .count();
        let dirty = self
            .entries
            .iter()
            .filter(|e| e.flags.contains(EntryFlags::DIRTY))
            .count();
        (valid, dirty)
    }

    pub fn render_dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== block cache dump ===");
        for (i, entry) in self.entries.iter().enumerate() {
            let _ = writeln!(
                out,
                "entry {}: V={} R={} M={} counter={}",
                i,
                entry.flags.contains(EntryFlags::VALID) as u8,
                entry.flags.contains(EntryFlags::REFERENCED) as u8,
                entry.flags.contains(EntryFlags::DIRTY) as u8,
                entry.counter
            );
            if entry.flags.contains(EntryFlags::VALID) {
                let _ = writeln!(out, "  block {}", entry.block_no);
                let mut preview = String::new();
                for byte in &entry.data[..16] {
                    let _ = write!(preview, "{:02x} ", byte);
                }
                let _ = writeln!(out, "  {}", preview.trim_end());
            }
        }
        let _ = writeln!(out, "=== end dump ===");
        out
    }

    /// One sweeper pass: age every entry, decay R bits every 4 cycles,
    /// flush valid dirty entries every 10, wrap counters at 20.
    pub(crate) fn sweep(&mut self) {
        for i in 0..CACHE_SIZE {
            self.entries[i].counter += 1;
            let counter = self.entries[i].counter;
            if counter % 4 == 0 {
                self.entries[i].flags.remove(EntryFlags::REFERENCED);
            }
            if counter % 10 == 0
                && self.entries[i].flags.contains(EntryFlags::VALID | EntryFlags::DIRTY)
            {
                if let Err(err) = self.write_back(i) {
                    log::warn!(
                        "sweeper write-back of block {} failed: {}",
                        self.entries[i].block_no,
                        err
                    );
                }
            }
            if self.entries[i].counter == 20 {
                self.entries[i].counter = 0;
            }
        }
    }

    fn copy_out(&self, block_no: u64, buf: &mut [u8; BLOCK_SIZE]) -> bool {
        for entry in &self.entries {
            if entry.flags.contains(EntryFlags::VALID) && entry.block_no == block_no {
                buf.copy_from_slice(&entry.data);
                return true;
            }
        }
        false
    }

    fn copy_in(&mut self, block_no: u64, buf: &[u8; BLOCK_SIZE]) -> bool {
        for entry in &mut self.entries {
            if entry.flags.contains(EntryFlags::VALID) && entry.block_no == block_no {
                entry.data.copy_from_slice(buf);
                entry.flags.insert(EntryFlags::REFERENCED | EntryFlags::DIRTY);
                return true;
            }
        }
        false
    }

    fn write_back(&mut self, i: usize) -> Result<(), &'static str> {
        self.device
            .write(self.entries[i].block_no, &self.entries[i].data)?;
        self.entries[i].flags.remove(EntryFlags::DIRTY);
        Ok(())
    }

    /// Load a block from the device into a victim slot.
    fn fetch(&mut self, block_no: u64) -> Result<(), &'static str> {
        let victim = self.choose_victim();
        if self.entries[victim].flags.contains(EntryFlags::VALID | EntryFlags::DIRTY) {
            self.write_back(victim)?;
        }
        self.device.read(block_no, &mut self.entries[victim].data)?;
        let entry = &mut self.entries[victim];
        entry.block_no = block_no;
        entry.flags = EntryFlags::VALID | EntryFlags::REFERENCED;
        Ok(())
    }

    /// NRU victim cascade. Categories are tried in order and the first hit
    /// in the earliest non-empty category wins.
    fn choose_victim(&self) -> usize {
        if let Some(i) = self
            .entries
            .iter()
            .position(|e| !e.flags.contains(EntryFlags::VALID))
        {
            return i;
        }
        if let Some(i) = self.entries.iter().position(|e| {
            !e.flags.contains(EntryFlags::REFERENCED) && !e.flags.contains(EntryFlags::DIRTY)
        }) {
            return i;
        }
        if let Some(i) = self
            .entries
            .iter()
            .position(|e| !e.flags.contains(EntryFlags::REFERENCED))
        {
            return i;
        }
        if let Some(i) = self
            .entries
            .iter()
            .position(|e| !e.flags.contains(EntryFlags::DIRTY))
        {
            return i;
        }
        0
    }
}

// ============================================================================
// Global instance
// ============================================================================

/// Global block cache instance
pub(crate) static BLOCK_CACHE: Mutex<Option<BlockCache>> = Mutex::new(None);

/// Install the global block cache over `device` and start the sweeper
/// thread. The runtime must already be initialized.
pub fn init(device: Box<dyn BlockDevice>, sweep_interval_ns: u64) {
    *BLOCK_CACHE.lock() = Some(BlockCache::new(device));
    sweeper::start(sweep_interval_ns);
    log::info!(
        "block cache initialized ({} entries of {} bytes)",
        CACHE_SIZE,
        BLOCK_SIZE
    );
}

/// Read through the global cache.
pub fn read_block(block_no: u64, buf: &mut [u8; BLOCK_SIZE]) -> Result<(), &'static str> {
    match BLOCK_CACHE.lock().as_mut() {
        Some(cache) => cache.read(block_no, buf),
        None => Err("block cache not initialized"),
    }
}

/// Write through the global cache.
pub fn write_block(block_no: u64, buf: &[u8; BLOCK_SIZE]) -> Result<(), &'static str> {
    match BLOCK_CACHE.lock().as_mut() {
        Some(cache) => cache.write(block_no, buf),
        None => Err("block cache not initialized"),
    }
}

/// Drop any cached copy of the block from the global cache.
pub fn invalidate(block_no: u64) {
    if let Some(cache) = BLOCK_CACHE.lock().as_mut() {
        cache.invalidate(block_no);
    }
}

/// Flush the global cache.
pub fn flush_all() -> Result<(), &'static str> {
    match BLOCK_CACHE.lock().as_mut() {
        Some(cache) => cache.flush_all(),
        None => Ok(()),
    }
}

/// (valid, dirty) entry counts of the global cache.
pub fn stats() -> (usize, usize) {
    match BLOCK_CACHE.lock().as_ref() {
        Some(cache) => cache.stats(),
        None => (0, 0),
    }
}

/// Print a human-readable dump of the global cache.
pub fn dump() {
    if let Some(cache) = BLOCK_CACHE.lock().as_ref() {
        print!("{}", cache.render_dump());
    }
}
