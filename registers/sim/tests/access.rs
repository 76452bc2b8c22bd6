// Licensed under the Apache-2.0 license

use futures::executor::block_on;
use log::LevelFilter;
use ral_runtime::{
    Access, AsyncRegister, CacheOptions, EnumDef, FieldGeometry, FieldSpec, FieldValue, Memory,
    MemorySpec, RalError, Register, RegisterArray, RegisterSpec,
};
use ral_sim::Simulator;
use rand::Rng;
use simple_logger::SimpleLogger;
use std::sync::Arc;

fn init_logging() {
    let _ = SimpleLogger::new().with_level(LevelFilter::Info).init();
}

fn reg_a(address: u64) -> RegisterSpec {
    let encoding = Arc::new(EnumDef::new(
        "second_field_e",
        &[(0, "value1"), (1, "value2")],
    ));
    RegisterSpec::new("top.reg_a", address, 32, 32)
        .with_field(FieldSpec::new(
            "first_field",
            FieldGeometry::lsb0(0, 15).unwrap(),
            Access::ReadWrite,
        ))
        .with_field(
            FieldSpec::new(
                "second_field",
                FieldGeometry::lsb0(16, 17).unwrap(),
                Access::ReadWrite,
            )
            .with_encoding(encoding),
        )
}

#[test]
fn test_write_fields_is_one_read_modify_write() {
    init_logging();
    let sim = Arc::new(Simulator::new());
    sim.preload(0x0, 0x3FFFF);
    let reg = Register::new(reg_a(0x0), sim.clone());

    reg.write_fields(&[("first_field", FieldValue::Int(0xABCD))])
        .unwrap();
    let stats = sim.stats();
    assert_eq!(stats.total_reads(), 1);
    assert_eq!(stats.total_writes(), 1);
    assert_eq!(sim.peek(0x0), 0x3ABCD);

    sim.reset_stats();
    assert!(matches!(
        reg.write_fields(&[]),
        Err(RalError::NoFieldArguments { .. })
    ));
    assert_eq!(sim.stats().total_reads() + sim.stats().total_writes(), 0);
}

#[test]
fn test_enum_values_outside_definition() {
    init_logging();
    let sim = Arc::new(Simulator::new());
    let reg = Register::new(reg_a(0x0), sim.clone());
    for raw in [2u64, 3] {
        sim.preload(0x0, raw << 16);
        assert!(matches!(
            reg.read_fields(),
            Err(RalError::NotEnumMember { .. })
        ));
    }
    sim.reset_stats();
    assert!(matches!(
        reg.field("second_field").unwrap().write(2u64),
        Err(RalError::WrongType { .. })
    ));
    assert_eq!(sim.stats().total_writes(), 0);
}

#[test]
fn test_random_field_values() {
    init_logging();
    let sim = Arc::new(Simulator::new());
    let reg = Register::new(reg_a(0x40), sim.clone());
    let field = reg.field("first_field").unwrap();
    let mut rng = rand::thread_rng();
    sim.preload(0x40, 0x1_0000);
    for _ in 0..100 {
        let value: u128 = rng.gen_range(0..=0xffff);
        field.write(value).unwrap();
        assert_eq!(field.read().unwrap(), value);
        assert_eq!(sim.peek(0x40) >> 16, 1);
    }
}

#[test]
fn test_array_block_and_single_reads_agree() {
    init_logging();
    let block = Arc::new(Simulator::new());
    let single = Arc::new(Simulator::without_block_access());
    for (i, v) in [10u64, 11, 12, 13].into_iter().enumerate() {
        block.preload(0x100 + 4 * i as u64, v);
        single.preload(0x100 + 4 * i as u64, v);
    }
    let element = reg_a(0x100);
    let a = RegisterArray::new(element.clone(), vec![4], 4, block.clone());
    let b = RegisterArray::new(element, vec![4], 4, single.clone());
    assert_eq!(a.read_fields_all().unwrap(), b.read_fields_all().unwrap());
    assert_eq!(block.stats().block_reads, 1);
    assert_eq!(single.stats().reads, 4);
}

#[test]
fn test_cached_verify_mismatch() {
    init_logging();
    let sim = Arc::new(Simulator::new());
    let mem = Memory::new(
        MemorySpec {
            name: "top.mem".to_string(),
            address: 0x1000,
            entries: 16,
            width: 32,
            accesswidth: 32,
            access: Access::ReadWrite,
        },
        sim.clone(),
    );
    sim.override_read(0x1004, 0xdead);
    let result = mem.with_cached(CacheOptions::verified(), 0, 4, |values| {
        values.copy_from_slice(&[1, 2, 3, 4]);
        Ok(())
    });
    assert_eq!(
        result,
        Err(RalError::VerifyMismatch {
            address: 0x1004,
            expected: 2,
            actual: 0xdead
        })
    );
    assert_eq!(sim.peek(0x1004), 2);
    let stats = sim.stats();
    assert_eq!(stats.block_reads, 2);
    assert_eq!(stats.block_writes, 1);
}

#[test]
fn test_async_matches_blocking() {
    init_logging();
    let sim = Arc::new(Simulator::new());
    sim.preload(0x8, 0x1FFFF);
    let reg = AsyncRegister::new(reg_a(0x8), sim.clone());
    block_on(reg.write_fields(&[("first_field", FieldValue::Int(0xABCD))])).unwrap();
    assert_eq!(sim.peek(0x8), 0x1ABCD);
    let values = block_on(reg.read_fields()).unwrap();
    assert_eq!(values[0].1, FieldValue::Int(0xABCD));
}

fn wide_reg(address: u64, accesswidth: u32) -> RegisterSpec {
    RegisterSpec::new("top.wide", address, 128, accesswidth)
        .with_field(FieldSpec::new(
            "low",
            FieldGeometry::lsb0(0, 63).unwrap(),
            Access::ReadWrite,
        ))
        .with_field(FieldSpec::new(
            "tag",
            FieldGeometry::msb0(64, 79).unwrap(),
            Access::ReadWrite,
        ))
        .with_field(FieldSpec::new(
            "top",
            FieldGeometry::lsb0(120, 127).unwrap(),
            Access::ReadOnly,
        ))
}

#[test]
fn test_128_bit_register_with_msb0_field() {
    init_logging();
    let sim = Arc::new(Simulator::new());
    sim.preload(0x20, 0xffff_ffff);
    sim.preload(0x2c, 0xa500_0000);
    let reg = Register::new(wide_reg(0x20, 32), sim.clone());

    reg.write_fields(&[("tag", FieldValue::Int(0x1))]).unwrap();
    // the four sub-words move as one block read and one block write
    let stats = sim.stats();
    assert_eq!(stats.block_reads, 1);
    assert_eq!(stats.block_writes, 1);
    assert_eq!(stats.reads + stats.writes, 0);
    // logical bit 0 of an msb0 field is its highest physical bit
    assert_eq!(sim.peek(0x28), 0x8000);
    assert_eq!(sim.peek(0x20), 0xffff_ffff);
    assert_eq!(sim.peek(0x2c), 0xa500_0000);

    let values = reg.read_fields().unwrap();
    assert_eq!(values[0].1, FieldValue::Int(0xffff_ffff));
    assert_eq!(values[1].1, FieldValue::Int(0x1));
    assert_eq!(values[2].1, FieldValue::Int(0xa5));
    assert_eq!(reg.read().unwrap(), (0xa5 << 120) | (0x8000 << 64) | 0xffff_ffff);

    let tag = reg.field("tag").unwrap();
    let mut rng = rand::thread_rng();
    for _ in 0..50 {
        let value: u128 = rng.gen_range(0..=0xffff);
        tag.write(value).unwrap();
        assert_eq!(tag.read().unwrap(), value);
        assert_eq!(reg.field("top").unwrap().read().unwrap(), 0xa5);
    }
    assert!(matches!(
        tag.write(0x1_0000u64),
        Err(RalError::TooLarge { .. })
    ));
}

#[test]
fn test_wide_array_and_memory_use_block_access() {
    init_logging();
    let sim = Arc::new(Simulator::new());
    let regs = RegisterArray::new(wide_reg(0x100, 64), vec![4], 16, sim.clone());
    let values: Vec<u128> = (0..4).map(|i| (i << 64) | i).collect();
    regs.write_all(&values).unwrap();
    assert_eq!(regs.read_all().unwrap(), values);
    assert_eq!(sim.peek(0x118), 1);
    let stats = sim.stats();
    assert_eq!(stats.block_writes, 1);
    assert_eq!(stats.block_reads, 1);

    let mem = Memory::new(
        MemorySpec {
            name: "top.wide_mem".to_string(),
            address: 0x1000,
            entries: 8,
            width: 128,
            accesswidth: 64,
            access: Access::ReadWrite,
        },
        sim.clone(),
    );
    mem.write_entry(7, u128::MAX - 1).unwrap();
    assert_eq!(sim.peek(0x1070), u64::MAX - 1);
    assert_eq!(sim.peek(0x1078), u64::MAX);
    assert_eq!(mem.read(6, 2).unwrap(), vec![0, u128::MAX - 1]);
}

#[test]
fn test_async_wide_register() {
    init_logging();
    let sim = Arc::new(Simulator::new());
    let reg = AsyncRegister::new(wide_reg(0x40, 64), sim.clone());
    block_on(reg.write_fields(&[("tag", FieldValue::Int(0x8000))])).unwrap();
    assert_eq!(sim.peek(0x48), 1);
    assert_eq!(block_on(reg.read()).unwrap(), 1 << 64);
}
