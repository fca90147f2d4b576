//! Property tests for the storage driver: validation never lets a bad
//! request touch the device, and valid requests round-trip exactly.

use proptest::prelude::*;

use crashguard_core::errors::Error;
use crashguard_core::nvm::device::NvmGeometry;
use crashguard_core::nvm::memory::MemNvm;
use crashguard_core::nvm::NvmDriver;

const BASE: u32 = 0x1000;
const PAGE: u32 = 256;
const PAGES: u32 = 8;
const UNIT: u32 = 8;

fn driver() -> NvmDriver<MemNvm<2048>> {
    NvmDriver::new(MemNvm::new(NvmGeometry {
        base: BASE,
        page_size: PAGE,
        pages: PAGES,
        banks: 2,
        write_bytes: UNIT,
    }))
}

fn aligned_data() -> impl Strategy<Value = Vec<u8>> {
    (1usize..=4).prop_flat_map(|units| prop::collection::vec(any::<u8>(), units * UNIT as usize))
}

proptest! {
    #[test]
    fn aligned_writes_read_back_identical(
        page in 0u32..PAGES,
        off_units in 0u32..8,
        data in aligned_data(),
    ) {
        let mut d = driver();
        let page_addr = BASE + page * PAGE;
        let addr = page_addr + off_units * UNIT;

        d.erase_page(page_addr).unwrap();
        d.write(addr, &data).unwrap();

        let mut back = vec![0u8; data.len()];
        d.read(addr, &mut back).unwrap();
        prop_assert_eq!(back, data);
    }

    #[test]
    fn misaligned_address_is_rejected_without_touching_the_device(
        misalign in 1u32..UNIT,
        data in prop::collection::vec(any::<u8>(), UNIT as usize),
    ) {
        let mut d = driver();
        let err = d.write(BASE + misalign, &data).unwrap_err();
        prop_assert_eq!(err, Error::InvalidArg);
        prop_assert_eq!(d.device().touches(), 0);
    }

    #[test]
    fn ragged_length_is_rejected_without_touching_the_device(
        units in 0usize..3,
        extra in 1usize..UNIT as usize,
    ) {
        let mut d = driver();
        let data = vec![0x5A; units * UNIT as usize + extra];
        let err = d.write(BASE, &data).unwrap_err();
        prop_assert_eq!(err, Error::InvalidArg);
        prop_assert_eq!(d.device().touches(), 0);
    }

    #[test]
    fn out_of_range_writes_are_rejected(
        beyond in 0u32..64,
        data in prop::collection::vec(any::<u8>(), UNIT as usize),
    ) {
        let mut d = driver();
        let end = BASE + PAGE * PAGES;
        let err = d.write(end + beyond * UNIT, &data).unwrap_err();
        prop_assert_eq!(err, Error::InvalidArg);
        prop_assert_eq!(d.device().touches(), 0);
    }

    #[test]
    fn erase_requires_a_page_aligned_address(
        off in 1u32..PAGE,
    ) {
        let mut d = driver();
        let err = d.erase_page(BASE + off).unwrap_err();
        prop_assert_eq!(err, Error::InvalidArg);
        prop_assert_eq!(d.device().touches(), 0);
    }

    #[test]
    fn erase_restores_the_erased_pattern(
        page in 0u32..PAGES,
        data in aligned_data(),
    ) {
        let mut d = driver();
        let page_addr = BASE + page * PAGE;
        d.write(page_addr, &data).unwrap();
        d.erase_page(page_addr).unwrap();

        let mut back = vec![0u8; data.len()];
        d.read(page_addr, &mut back).unwrap();
        prop_assert!(back.iter().all(|&b| b == 0xFF));
    }
}
