//! STM32 Flash Program/Erase Backends
//!
//! ## Overview
//!
//! One [`NvmDevice`] implementation per supported family. The driver in
//! `crashguard_core::nvm` owns validation, sequencing and chunking; the
//! types here own the register map and nothing else.
//!
//! ```text
//! family   registers          erase unit            program unit
//! L4       KEYR/SR/CR         2 KiB page            8 B double word
//! F4       KEYR/SR/CR         16K/64K/128K sector   8 B as two x32 words
//! U5       NSKEYR/NSSR/NSCR   8 KiB page            16 B quad word
//! ```
//!
//! All three share the ST unlock handshake (two key words to the key
//! register) and signal completion through a BSY flag the core driver
//! polls. Error flags are write-one-to-clear and are collected and cleared
//! in `end_op` so a failure in one operation cannot leak into the next.
//!
//! ## Host Builds
//!
//! Construction, geometry queries and erase-target resolution are plain
//! arithmetic and run anywhere. Only the trait methods that touch registers
//! need the real part under them.

use crashguard_core::nvm::{NvmDevice, NvmGeometry, PageAddress};

use crate::regs;

/// ST flash key register unlock sequence, common to every family here.
const KEY1: u32 = 0x4567_0123;
const KEY2: u32 = 0xCDEF_89AB;

/// BSY flag position, shared by L4 SR, F4 SR and U5 NSSR.
const SR_BSY: u32 = 1 << 16;

/// End-of-operation flag, bit 0 of the status register on all families.
const SR_EOP: u32 = 1 << 0;

// ACR cache control bits. The instruction/data cache block has the same
// layout on L4 and on the F4 ART accelerator.
const ACR_ICEN: u32 = 1 << 9;
const ACR_DCEN: u32 = 1 << 10;
const ACR_ICRST: u32 = 1 << 11;
const ACR_DCRST: u32 = 1 << 12;

/// Disables instruction/data caching and reports which bits were on.
fn suspend_caches(acr: u32) -> u32 {
    let enabled = regs::read(acr) & (ACR_ICEN | ACR_DCEN);
    regs::modify(acr, |v| v & !(ACR_ICEN | ACR_DCEN));
    enabled
}

/// Flushes and re-enables the caches that `suspend_caches` turned off.
///
/// Stale cache lines over just-programmed flash must not survive the
/// operation, so each re-enabled cache is reset first.
fn restore_caches(acr: u32, enabled: u32) {
    if enabled & ACR_ICEN != 0 {
        regs::modify(acr, |v| v | ACR_ICRST);
        regs::modify(acr, |v| v & !ACR_ICRST);
    }
    if enabled & ACR_DCEN != 0 {
        regs::modify(acr, |v| v | ACR_DCRST);
        regs::modify(acr, |v| v & !ACR_DCRST);
    }
    regs::modify(acr, |v| v | enabled);
}

/// Programs `chunk` as consecutive little-endian words starting at `addr`.
///
/// L4 double-word and U5 quad-word programming require the words of one
/// unit to be written back to back with no intervening access.
fn program_words(addr: u32, chunk: &[u8]) {
    let mut at = addr;
    for word in chunk.chunks_exact(4) {
        regs::write(at, u32::from_le_bytes([word[0], word[1], word[2], word[3]]));
        at += 4;
    }
}

mod l4 {
    pub const BASE: u32 = 0x4002_2000;
    pub const ACR: u32 = BASE;
    pub const KEYR: u32 = BASE + 0x08;
    pub const SR: u32 = BASE + 0x10;
    pub const CR: u32 = BASE + 0x14;

    /// OPERR, PROGERR, WRPERR, PGAERR, SIZERR, PGSERR, MISERR, FASTERR,
    /// RDERR, OPTVERR.
    pub const ERR_MASK: u32 = 0xC3FA;

    pub const CR_PG: u32 = 1 << 0;
    pub const CR_PER: u32 = 1 << 1;
    pub const CR_PNB_SHIFT: u32 = 3;
    pub const CR_BKER: u32 = 1 << 11;
    pub const CR_STRT: u32 = 1 << 16;
    pub const CR_LOCK: u32 = 1 << 31;
}

/// CR value selecting a page erase on L4, without the start bit.
const fn l4_erase_command(target: PageAddress) -> u32 {
    let bank = if target.bank == 1 { l4::CR_BKER } else { 0 };
    l4::CR_PER | (target.page << l4::CR_PNB_SHIFT) | bank
}

/// STM32L4 flash: uniform dual-bank page grid, double-word programming.
#[derive(Debug)]
pub struct L4Flash {
    geometry: NvmGeometry,
    cache_bits: u32,
}

impl L4Flash {
    /// STM32L47x/L48x class part: 1 MiB in two banks of 2 KiB pages.
    pub const fn stm32l476() -> Self {
        Self::new(NvmGeometry {
            base: 0x0800_0000,
            page_size: 2048,
            pages: 512,
            banks: 2,
            write_bytes: 8,
        })
    }

    /// Any L4 part with a uniform page grid.
    pub const fn new(geometry: NvmGeometry) -> Self {
        Self {
            geometry,
            cache_bits: 0,
        }
    }
}

impl NvmDevice for L4Flash {
    fn geometry(&self) -> NvmGeometry {
        self.geometry
    }

    fn is_busy(&self) -> bool {
        regs::read(l4::SR) & SR_BSY != 0
    }

    fn unlock(&mut self) {
        if regs::read(l4::CR) & l4::CR_LOCK != 0 {
            regs::write(l4::KEYR, KEY1);
            regs::write(l4::KEYR, KEY2);
        }
    }

    fn begin_op(&mut self) {
        regs::write(l4::SR, l4::ERR_MASK | SR_EOP);
        self.cache_bits = suspend_caches(l4::ACR);
    }

    fn start_erase(&mut self, target: PageAddress) {
        let command = l4_erase_command(target);
        regs::write(l4::CR, command);
        regs::write(l4::CR, command | l4::CR_STRT);
    }

    fn program_unit(&mut self, addr: u32, chunk: &[u8]) {
        regs::write(l4::CR, l4::CR_PG);
        program_words(addr, chunk);
    }

    fn end_op(&mut self) -> u32 {
        let errors = regs::read(l4::SR) & l4::ERR_MASK;
        regs::write(l4::SR, errors | SR_EOP);
        regs::write(l4::CR, l4::CR_LOCK);
        restore_caches(l4::ACR, self.cache_bits);
        errors
    }

    fn read(&self, addr: u32, buf: &mut [u8]) {
        regs::read_bytes(addr, buf);
    }
}

mod f4 {
    pub const BASE: u32 = 0x4002_3C00;
    pub const ACR: u32 = BASE;
    pub const KEYR: u32 = BASE + 0x04;
    pub const SR: u32 = BASE + 0x0C;
    pub const CR: u32 = BASE + 0x10;

    /// WRPERR, PGAERR, PGPERR, PGSERR, RDERR.
    pub const ERR_MASK: u32 = 0x1F0;

    pub const CR_PG: u32 = 1 << 0;
    pub const CR_SER: u32 = 1 << 1;
    pub const CR_SNB_SHIFT: u32 = 3;
    /// Program parallelism x32, legal down to 2.7 V supplies.
    pub const CR_PSIZE_X32: u32 = 0b10 << 8;
    pub const CR_STRT: u32 = 1 << 16;
    pub const CR_LOCK: u32 = 1 << 31;
}

/// F40x/F41x 1 MiB sector layout as `(offset, bytes)` pairs.
const F4_SECTORS: [(u32, u32); 12] = [
    (0x0000_0000, 16 * 1024),
    (0x0000_4000, 16 * 1024),
    (0x0000_8000, 16 * 1024),
    (0x0000_C000, 16 * 1024),
    (0x0001_0000, 64 * 1024),
    (0x0002_0000, 128 * 1024),
    (0x0004_0000, 128 * 1024),
    (0x0006_0000, 128 * 1024),
    (0x0008_0000, 128 * 1024),
    (0x000A_0000, 128 * 1024),
    (0x000C_0000, 128 * 1024),
    (0x000E_0000, 128 * 1024),
];

/// Sector index whose start is exactly `offset`, if any.
const fn f4_sector_at(offset: u32) -> Option<u32> {
    let mut i = 0;
    while i < F4_SECTORS.len() {
        if F4_SECTORS[i].0 == offset {
            return Some(i as u32);
        }
        i += 1;
    }
    None
}

/// CR value selecting a sector erase on F4, without the start bit.
const fn f4_erase_command(sector: u32) -> u32 {
    f4::CR_SER | (sector << f4::CR_SNB_SHIFT) | f4::CR_PSIZE_X32
}

/// STM32F4 flash: irregular sector grid, word-at-a-time programming.
#[derive(Debug)]
pub struct F4Flash {
    geometry: NvmGeometry,
    cache_bits: u32,
}

impl F4Flash {
    /// STM32F40x/F41x class part: 1 MiB of 16K/64K/128K sectors.
    ///
    /// The geometry is a span descriptor only; erase coordinates come from
    /// the sector table via [`NvmDevice::erase_target`].
    pub const fn stm32f407() -> Self {
        Self {
            geometry: NvmGeometry {
                base: 0x0800_0000,
                page_size: 16 * 1024,
                pages: 64,
                banks: 1,
                write_bytes: 8,
            },
            cache_bits: 0,
        }
    }
}

impl NvmDevice for F4Flash {
    fn geometry(&self) -> NvmGeometry {
        self.geometry
    }

    fn erase_target(&self, addr: u32) -> Option<PageAddress> {
        if addr < self.geometry.base {
            return None;
        }
        let offset = addr - self.geometry.base;
        if offset >= self.geometry.size() {
            return None;
        }
        f4_sector_at(offset).map(|sector| PageAddress {
            page: sector,
            bank: 0,
        })
    }

    fn is_busy(&self) -> bool {
        regs::read(f4::SR) & SR_BSY != 0
    }

    fn unlock(&mut self) {
        if regs::read(f4::CR) & f4::CR_LOCK != 0 {
            regs::write(f4::KEYR, KEY1);
            regs::write(f4::KEYR, KEY2);
        }
    }

    fn begin_op(&mut self) {
        regs::write(f4::SR, f4::ERR_MASK | SR_EOP);
        self.cache_bits = suspend_caches(f4::ACR);
    }

    fn start_erase(&mut self, target: PageAddress) {
        let command = f4_erase_command(target.page);
        regs::write(f4::CR, command);
        regs::write(f4::CR, command | f4::CR_STRT);
    }

    fn program_unit(&mut self, addr: u32, chunk: &[u8]) {
        regs::write(f4::CR, f4::CR_PG | f4::CR_PSIZE_X32);
        let mut at = addr;
        for word in chunk.chunks_exact(4) {
            // x32 parallelism programs one word per command; BSY must clear
            // before the next word is issued.
            while regs::read(f4::SR) & SR_BSY != 0 {}
            regs::write(at, u32::from_le_bytes([word[0], word[1], word[2], word[3]]));
            at += 4;
        }
    }

    fn end_op(&mut self) -> u32 {
        let errors = regs::read(f4::SR) & f4::ERR_MASK;
        regs::write(f4::SR, errors | SR_EOP);
        regs::write(f4::CR, f4::CR_LOCK);
        restore_caches(f4::ACR, self.cache_bits);
        errors
    }

    fn read(&self, addr: u32, buf: &mut [u8]) {
        regs::read_bytes(addr, buf);
    }
}

mod u5 {
    pub const BASE: u32 = 0x4002_2000;
    pub const NSKEYR: u32 = BASE + 0x08;
    pub const NSSR: u32 = BASE + 0x20;
    pub const NSCR: u32 = BASE + 0x28;

    /// OPERR, PROGERR, WRPERR, PGAERR, SIZERR, PGSERR, OPTWERR.
    pub const ERR_MASK: u32 = 0x20FA;

    pub const CR_PG: u32 = 1 << 0;
    pub const CR_PER: u32 = 1 << 1;
    pub const CR_PNB_SHIFT: u32 = 3;
    pub const CR_BKER: u32 = 1 << 11;
    pub const CR_STRT: u32 = 1 << 16;
    pub const CR_LOCK: u32 = 1 << 31;
}

/// NSCR value selecting a page erase on U5, without the start bit.
const fn u5_erase_command(target: PageAddress) -> u32 {
    let bank = if target.bank == 1 { u5::CR_BKER } else { 0 };
    u5::CR_PER | (target.page << u5::CR_PNB_SHIFT) | bank
}

/// STM32U5 flash, non-secure register map: dual-bank page grid, quad-word
/// programming.
#[derive(Debug)]
pub struct U5Flash {
    geometry: NvmGeometry,
}

impl U5Flash {
    /// STM32U575/U585 class part: 2 MiB in two banks of 8 KiB pages.
    pub const fn stm32u575() -> Self {
        Self::new(NvmGeometry {
            base: 0x0800_0000,
            page_size: 8192,
            pages: 256,
            banks: 2,
            write_bytes: 16,
        })
    }

    /// Any U5 part with a uniform page grid.
    pub const fn new(geometry: NvmGeometry) -> Self {
        Self { geometry }
    }
}

impl NvmDevice for U5Flash {
    fn geometry(&self) -> NvmGeometry {
        self.geometry
    }

    fn is_busy(&self) -> bool {
        regs::read(u5::NSSR) & SR_BSY != 0
    }

    fn unlock(&mut self) {
        if regs::read(u5::NSCR) & u5::CR_LOCK != 0 {
            regs::write(u5::NSKEYR, KEY1);
            regs::write(u5::NSKEYR, KEY2);
        }
    }

    fn begin_op(&mut self) {
        regs::write(u5::NSSR, u5::ERR_MASK | SR_EOP);
    }

    fn start_erase(&mut self, target: PageAddress) {
        let command = u5_erase_command(target);
        regs::write(u5::NSCR, command);
        regs::write(u5::NSCR, command | u5::CR_STRT);
    }

    fn program_unit(&mut self, addr: u32, chunk: &[u8]) {
        regs::write(u5::NSCR, u5::CR_PG);
        program_words(addr, chunk);
    }

    fn end_op(&mut self) -> u32 {
        let errors = regs::read(u5::NSSR) & u5::ERR_MASK;
        regs::write(u5::NSSR, errors | SR_EOP);
        regs::write(u5::NSCR, u5::CR_LOCK);
        errors
    }

    fn read(&self, addr: u32, buf: &mut [u8]) {
        regs::read_bytes(addr, buf);
    }
}
