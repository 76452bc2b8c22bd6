// Licensed under the Apache-2.0 license

//! Builds and tests exported packages against the in-tree runtime.
//!
//! Runs cargo and needs registry access, so it is opt-in:
//! `cargo test -p ral-generator --test package_build -- --ignored`

use ral_generator::{export, ExportConfig};
use ral_model::World;
use serde_json::json;
use std::path::Path;
use std::process::Command;

fn world() -> World {
    World::from_value(json!({
        "kind": "addrmap",
        "inst_name": "soc",
        "type_name": "soc_t",
        "children": [
            {
                "kind": "reg", "inst_name": "ctrl", "type_name": "ctrl_t", "regwidth": 32,
                "children": [
                    {"kind": "field", "inst_name": "enable", "lsb": 0, "msb": 0, "reset": 1},
                    {
                        "kind": "field", "inst_name": "mode", "lsb": 4, "msb": 5,
                        "encode": {"name": "mode_e", "entries": [
                            {"value": 0, "name": "idle"},
                            {"value": 2, "name": "run"}
                        ]}
                    },
                    {"kind": "field", "inst_name": "busy", "lsb": 8, "msb": 8, "sw": "r"}
                ]
            },
            {
                "kind": "reg", "inst_name": "kick", "address_offset": 4, "regwidth": 32,
                "children": [
                    {"kind": "field", "inst_name": "go", "lsb": 0, "msb": 0, "sw": "w"},
                    {"kind": "field", "inst_name": "lane", "lsb": 8, "msb": 11, "sw": "w"}
                ]
            },
            {
                "kind": "reg", "inst_name": "key", "type_name": "key_t",
                "address_offset": 0x10, "regwidth": 128, "accesswidth": 32,
                "children": [
                    {"kind": "field", "inst_name": "low", "lsb": 0, "msb": 63},
                    {"kind": "field", "inst_name": "tag", "msb": 64, "lsb": 79, "reset": 3},
                    {"kind": "field", "inst_name": "id", "lsb": 120, "msb": 127, "sw": "r"}
                ]
            },
            {
                "kind": "regfile", "inst_name": "chan", "type_name": "chan_t",
                "address_offset": 0x100,
                "array": {"dimensions": [2], "stride": 0x10},
                "children": [{
                    "kind": "reg", "inst_name": "cfg", "regwidth": 32,
                    "children": [{"kind": "field", "inst_name": "depth", "lsb": 0, "msb": 7}]
                }]
            },
            {
                "kind": "addrmap", "inst_name": "store", "address_offset": 0x1000,
                "children": [
                    {"kind": "mem", "inst_name": "ram", "mementries": 16, "memwidth": 32},
                    {"kind": "mem", "inst_name": "wide_ram", "address_offset": 0x100,
                     "mementries": 4, "memwidth": 128},
                    {"kind": "mem", "inst_name": "rom", "address_offset": 0x200, "sw": "r",
                     "mementries": 4, "memwidth": 64}
                ]
            }
        ]
    }))
    .unwrap()
}

fn cargo_test(package: &Path, target: &Path) {
    let cargo = std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());
    let status = Command::new(cargo)
        .arg("test")
        .arg("--quiet")
        .arg("--manifest-path")
        .arg(package.join("Cargo.toml"))
        .env("CARGO_TARGET_DIR", target)
        .status()
        .unwrap();
    assert!(status.success(), "cargo test failed in {}", package.display());
}

#[test]
#[ignore = "compiles generated packages with cargo"]
fn test_generated_packages_build() {
    let world = world();
    let registers = Path::new(env!("CARGO_MANIFEST_DIR")).parent().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("target");
    let flavors = [
        ("soc-blocking", ExportConfig::with_defaults()),
        ("soc-async", ExportConfig::with_defaults().asynchronous()),
        ("soc-legacy", ExportConfig::with_defaults().legacy_block_access()),
    ];
    for (name, config) in flavors {
        let config = config.package_name(name).runtime_path(registers);
        let summary = export(&world, &config, dir.path()).unwrap();
        cargo_test(&summary.package, &target);
    }
}
