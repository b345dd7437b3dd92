//! Physical address router over backing memory and registered regions.

use crate::fault::CoreFault;
use crate::memory::region::{Region, RegionHandler, RegionTable};
use crate::memory::AccessWidth;

/// Total, side-effecting physical access surface.
///
/// Every load/store, every instruction fetch, and every host inspection
/// passes through here. An address either falls in backing memory, falls
/// in exactly one registered region, or is an out-of-bound fault.
#[derive(Debug)]
pub struct SystemBus {
    mem_base: u32,
    ram: Box<[u8]>,
    regions: RegionTable,
}

impl SystemBus {
    /// Creates a bus with zeroed backing memory at `[mem_base, mem_base+mem_size)`.
    #[must_use]
    pub fn new(mem_base: u32, mem_size: u32) -> Self {
        Self {
            mem_base,
            ram: vec![0; mem_size as usize].into_boxed_slice(),
            regions: RegionTable::new(),
        }
    }

    /// Inclusive bounds of the configured backing-memory range.
    #[must_use]
    pub fn mem_range(&self) -> (u32, u32) {
        let len = u32::try_from(self.ram.len()).unwrap_or(u32::MAX);
        (self.mem_base, self.mem_base + len.saturating_sub(1))
    }

    fn in_ram(&self, addr: u32, bytes: u32) -> bool {
        u64::from(addr) >= u64::from(self.mem_base)
            && u64::from(addr) + u64::from(bytes)
                <= u64::from(self.mem_base) + self.ram.len() as u64
    }

    fn out_of_bound(&self, addr: u32, width: AccessWidth, pc: u32) -> CoreFault {
        let (mem_start, mem_end) = self.mem_range();
        CoreFault::OutOfBound {
            addr,
            width: width.bytes_u8(),
            pc,
            mem_start,
            mem_end,
        }
    }

    fn ram_read(&self, addr: u32, width: AccessWidth) -> u32 {
        let start = (addr - self.mem_base) as usize;
        let mut word = [0u8; 4];
        word[..width.bytes()].copy_from_slice(&self.ram[start..start + width.bytes()]);
        u32::from_le_bytes(word)
    }

    fn ram_write(&mut self, addr: u32, width: AccessWidth, value: u32) {
        let start = (addr - self.mem_base) as usize;
        self.ram[start..start + width.bytes()]
            .copy_from_slice(&value.to_le_bytes()[..width.bytes()]);
    }

    /// Registers a device region owning its handler by value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreFault::RegionExtent`] for empty or address-wrapping
    /// extents and [`CoreFault::RegionOverlap`] when the extent intersects
    /// backing memory or an already-registered region.
    pub fn register_region(
        &mut self,
        name: &str,
        base: u32,
        size: u32,
        handler: Box<dyn RegionHandler>,
    ) -> Result<(), CoreFault> {
        if size == 0 || u64::from(base) + u64::from(size) > 1 << 32 {
            return Err(CoreFault::RegionExtent {
                name: name.to_owned(),
                base,
                size,
            });
        }

        let ram_len = self.ram.len() as u64;
        let ram = u64::from(self.mem_base)..u64::from(self.mem_base) + ram_len;
        let new = u64::from(base)..u64::from(base) + u64::from(size);
        if ram.start < new.end && new.start < ram.end {
            return Err(CoreFault::RegionOverlap {
                name: name.to_owned(),
                base,
                size,
            });
        }

        self.regions.insert(Region::new(name, base, size, handler))
    }

    /// Registered regions in ascending base order.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        self.regions.entries()
    }

    /// Reads `width` bytes at `addr`, routing to memory or a region.
    ///
    /// `pc` is the program counter of the step performing the access and
    /// is reported in the out-of-bound diagnostic.
    ///
    /// # Errors
    ///
    /// Returns [`CoreFault::OutOfBound`] for unmatched addresses and
    /// [`CoreFault::MmioWidth`] for non-word region accesses.
    pub fn read(&mut self, addr: u32, width: AccessWidth, pc: u32) -> Result<u32, CoreFault> {
        if self.in_ram(addr, width.bytes_u32()) {
            return Ok(self.ram_read(addr, width));
        }
        match self.regions.find_mut(addr, width.bytes_u32()) {
            Some(region) => region.read(addr, width),
            None => Err(self.out_of_bound(addr, width, pc)),
        }
    }

    /// Writes `width` bytes at `addr`, routing to memory or a region.
    ///
    /// # Errors
    ///
    /// Returns [`CoreFault::OutOfBound`] for unmatched addresses and
    /// [`CoreFault::MmioWidth`] for non-word region accesses.
    pub fn write(
        &mut self,
        addr: u32,
        width: AccessWidth,
        value: u32,
        pc: u32,
    ) -> Result<(), CoreFault> {
        if self.in_ram(addr, width.bytes_u32()) {
            self.ram_write(addr, width, value);
            return Ok(());
        }
        match self.regions.find_mut(addr, width.bytes_u32()) {
            Some(region) => region.write(addr, width, value),
            None => Err(self.out_of_bound(addr, width, pc)),
        }
    }

    /// Copies a flat image into backing memory at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreFault::OutOfBound`] when any byte of the image falls
    /// outside backing memory; regions are not a valid image target.
    pub fn load_image(&mut self, addr: u32, image: &[u8]) -> Result<(), CoreFault> {
        let len = u32::try_from(image.len()).map_err(|_| self.out_of_bound(addr, AccessWidth::Byte, 0))?;
        if !self.in_ram(addr, len) {
            return Err(self.out_of_bound(addr, AccessWidth::Byte, 0));
        }
        let start = (addr - self.mem_base) as usize;
        self.ram[start..start + image.len()].copy_from_slice(image);
        Ok(())
    }
}
