// Licensed under the Apache-2.0 license

use super::*;
use crate::hash::ClassHash;
use crate::names::accessor_names;
use ral_model::{NodeIdx, World};
use serde_json::json;
use std::cell::Cell;
use std::path::Path;

fn sample() -> serde_json::Value {
    json!({
        "kind": "addrmap",
        "inst_name": "top",
        "type_name": "top_map",
        "children": [
            {
                "kind": "reg",
                "inst_name": "reg_a",
                "type_name": "reg_a_t",
                "scope_path": "top_map",
                "address_offset": 0,
                "regwidth": 32,
                "children": [
                    {"kind": "field", "inst_name": "first_field", "lsb": 0, "msb": 15, "reset": 5},
                    {
                        "kind": "field", "inst_name": "second_field", "lsb": 16, "msb": 17,
                        "sw": "r",
                        "encode": {"name": "mode_e", "entries": [
                            {"value": 0, "name": "value1"},
                            {"value": 1, "name": "value2"}
                        ]}
                    }
                ]
            },
            {
                "kind": "reg",
                "inst_name": "reg_b",
                "type_name": "reg_a_t",
                "scope_path": "top_map",
                "address_offset": 4,
                "regwidth": 32,
                "children": [
                    {"kind": "field", "inst_name": "first_field", "lsb": 0, "msb": 15, "reset": 5},
                    {
                        "kind": "field", "inst_name": "second_field", "lsb": 16, "msb": 17,
                        "sw": "r",
                        "encode": {"name": "mode_e", "entries": [
                            {"value": 0, "name": "value1"},
                            {"value": 1, "name": "value2"}
                        ]}
                    }
                ]
            },
            {
                "kind": "regfile",
                "inst_name": "block",
                "address_offset": 256,
                "array": {"dimensions": [2], "stride": 16},
                "children": [
                    {
                        "kind": "reg", "inst_name": "ctrl", "address_offset": 4,
                        "regwidth": 32,
                        "children": [
                            {"kind": "field", "inst_name": "go", "lsb": 0, "msb": 0, "sw": "w"}
                        ]
                    }
                ]
            },
            {
                "kind": "addrmap",
                "inst_name": "sub",
                "address_offset": 4096,
                "children": [
                    {"kind": "mem", "inst_name": "ram", "mementries": 16, "memwidth": 32},
                    {"kind": "signal", "inst_name": "irq"}
                ]
            }
        ]
    })
}

fn world() -> World {
    World::from_value(sample()).unwrap()
}

fn idx(world: &World, path: &str) -> NodeIdx {
    world.find(path).unwrap()
}

fn class_hash(value: serde_json::Value, config: &ExportConfig, path: &str) -> ClassHash {
    let world = World::from_value(value).unwrap();
    let mut engine = HashEngine::new(&world, config).unwrap();
    engine.class_hash(idx(&world, path)).unwrap()
}

//=============================================================================
// Hashing
//=============================================================================

#[test]
fn test_plain_field_is_sentinel() {
    let config = ExportConfig::with_defaults();
    assert_eq!(
        class_hash(sample(), &config, "top.reg_a.first_field"),
        ClassHash::Sentinel
    );
    // The enumeration alone makes the field a type of its own.
    assert!(matches!(
        class_hash(sample(), &config, "top.reg_a.second_field"),
        ClassHash::Value(_)
    ));
}

#[test]
fn test_any_extra_attribute_breaks_sentinel() {
    let config = ExportConfig::with_defaults();

    let mut named = sample();
    named["children"][0]["children"][0]["name"] = json!("First");
    assert!(matches!(
        class_hash(named.clone(), &config, "top.reg_a.first_field"),
        ClassHash::Value(_)
    ));
    assert_eq!(
        class_hash(named, &config.clone().without_name_and_desc(), "top.reg_a.first_field"),
        ClassHash::Sentinel
    );

    let mut described = sample();
    described["children"][0]["children"][0]["desc"] = json!("Lower half");
    assert!(matches!(
        class_hash(described, &config, "top.reg_a.first_field"),
        ClassHash::Value(_)
    ));

    let mut flagged = sample();
    flagged["children"][0]["children"][0]["properties"] = json!({"secure": true});
    assert_eq!(
        class_hash(flagged.clone(), &config, "top.reg_a.first_field"),
        ClassHash::Sentinel
    );
    assert!(matches!(
        class_hash(flagged, &config.add_udp("secure"), "top.reg_a.first_field"),
        ClassHash::Value(_)
    ));
}

#[test]
fn test_class_hash_ignores_position() {
    let world = world();
    let config = ExportConfig::with_defaults();
    let mut engine = HashEngine::new(&world, &config).unwrap();
    let reg_a = idx(&world, "top.reg_a");
    let reg_b = idx(&world, "top.reg_b");
    assert_eq!(
        engine.class_hash(reg_a).unwrap(),
        engine.class_hash(reg_b).unwrap()
    );
    assert_ne!(
        engine.instance_hash(reg_a).unwrap(),
        engine.instance_hash(reg_b).unwrap()
    );
}

#[test]
fn test_field_position_changes_register_hash() {
    let config = ExportConfig::with_defaults();
    let mut moved = sample();
    moved["children"][1]["children"][0]["msb"] = json!(14);
    let world = World::from_value(moved).unwrap();
    let mut engine = HashEngine::new(&world, &config).unwrap();
    let a = engine.class_hash(idx(&world, "top.reg_a")).unwrap();
    let b = engine.class_hash(idx(&world, "top.reg_b")).unwrap();
    assert_ne!(a, b);

    // Same field class, different placement.
    assert_eq!(
        engine.class_hash(idx(&world, "top.reg_a.first_field")).unwrap(),
        engine.class_hash(idx(&world, "top.reg_b.first_field")).unwrap()
    );
}

#[test]
fn test_sha256_is_stable_across_engines() {
    let world = world();
    let config = ExportConfig::with_defaults();
    let top = world.top();
    let first = HashEngine::new(&world, &config)
        .unwrap()
        .class_hash(top)
        .unwrap();
    let second = HashEngine::new(&world, &config)
        .unwrap()
        .class_hash(top)
        .unwrap();
    assert_eq!(first, second);
    assert!(matches!(first, ClassHash::Value(_)));
}

#[test]
fn test_fast_hash_is_stable_within_engine() {
    let world = world();
    let config = ExportConfig::with_defaults().hash_algorithm(HashAlgorithm::Fast);
    let mut engine = HashEngine::new(&world, &config).unwrap();
    let items = HashItem::List(vec![HashItem::Str("Register".into()), HashItem::UInt(32)]);
    assert_eq!(engine.digest(&items).unwrap(), engine.digest(&items).unwrap());
    let reg_a = idx(&world, "top.reg_a");
    assert_eq!(
        engine.instance_hash(reg_a).unwrap(),
        engine.instance_hash(reg_a).unwrap()
    );
}

#[test]
fn test_signal_has_no_class() {
    let world = world();
    let config = ExportConfig::with_defaults();
    let mut engine = HashEngine::new(&world, &config).unwrap();
    assert!(matches!(
        engine.class_hash(idx(&world, "top.sub.irq")),
        Err(GeneratorError::UnsupportedKind { .. })
    ));
}

#[test]
fn test_memory_hash() {
    let config = ExportConfig::with_defaults();
    let memory = |entries: u64, width: u32, sw: &str| {
        json!({
            "kind": "addrmap",
            "inst_name": "top",
            "children": [{
                "kind": "mem", "inst_name": "ram", "type_name": "ram_t",
                "mementries": entries, "memwidth": width, "sw": sw
            }]
        })
    };
    let base = class_hash(memory(16, 32, "rw"), &config, "top.ram");
    assert_eq!(base, class_hash(memory(16, 32, "rw"), &config, "top.ram"));
    assert_ne!(base, class_hash(memory(16, 64, "rw"), &config, "top.ram"));
    assert_ne!(base, class_hash(memory(32, 32, "rw"), &config, "top.ram"));
    assert_ne!(base, class_hash(memory(16, 32, "r"), &config, "top.ram"));
    assert_ne!(
        class_hash(memory(16, 64, "rw"), &config, "top.ram"),
        class_hash(memory(32, 32, "rw"), &config, "top.ram")
    );

    let split = |access: u32| {
        let mut value = memory(16, 128, "rw");
        value["children"][0]["accesswidth"] = json!(access);
        class_hash(value, &config, "top.ram")
    };
    assert_eq!(class_hash(memory(16, 128, "rw"), &config, "top.ram"), split(64));
    assert_ne!(split(64), split(32));
}

#[test]
fn test_hash_algorithm_from_str() {
    assert_eq!("fast".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Fast));
    assert_eq!("sha256".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Sha256));
    assert!("md5".parse::<HashAlgorithm>().is_err());
}

//=============================================================================
// Plan
//=============================================================================

#[test]
fn test_plan_shares_types() {
    let world = world();
    let (plan, _) = generate(&world, &ExportConfig::with_defaults(), None).unwrap();
    // top, reg_a_t, second_field, block, ctrl, sub, ram
    assert_eq!(plan.records().len(), 7);
    assert_eq!(plan.enums().len(), 1);

    let reg_a = plan.class_of(idx(&world, "top.reg_a")).unwrap();
    let reg_b = plan.class_of(idx(&world, "top.reg_b")).unwrap();
    assert_eq!(reg_a, reg_b);
    assert!(reg_a.name.starts_with("top_map_reg_a_t_"));
    assert!(plan.is_plain_field(idx(&world, "top.reg_a.first_field")));

    // Dependencies first, the top last.
    let position = |ident: &str| plan.records().iter().position(|r| r.ident == ident);
    let top = plan.records().last().unwrap();
    assert_eq!(top.node, world.top());
    assert!(position(&reg_a.ident) < position(&top.ident));
    let ctrl = plan.class_of(idx(&world, "top.block.ctrl")).unwrap();
    let block = plan.class_of(idx(&world, "top.block")).unwrap();
    assert!(position(&ctrl.ident) < position(&block.ident));
}

#[test]
fn test_anonymous_definitions_share_types() {
    let anonymous = |inst: &str, offset: u64| {
        json!({
            "kind": "reg", "inst_name": inst, "address_offset": offset, "regwidth": 32,
            "children": [{"kind": "field", "inst_name": "en", "lsb": 0, "msb": 0}]
        })
    };
    let value = json!({
        "kind": "addrmap",
        "inst_name": "top",
        "type_name": "top_map",
        "children": [anonymous("ctrl0", 0), anonymous("ctrl1", 4)]
    });
    let config = ExportConfig::with_defaults();
    assert_eq!(
        class_hash(value.clone(), &config, "top.ctrl0"),
        class_hash(value.clone(), &config, "top.ctrl1")
    );

    let world = World::from_value(value).unwrap();
    let (plan, _) = generate(&world, &config, None).unwrap();
    // top and one register type
    assert_eq!(plan.records().len(), 2);
    let ctrl0 = plan.class_of(idx(&world, "top.ctrl0")).unwrap();
    assert_eq!(ctrl0, plan.class_of(idx(&world, "top.ctrl1")).unwrap());
    assert!(ctrl0.name.starts_with("anon_reg_"));
}

#[test]
fn test_hidden_nodes() {
    let mut value = sample();
    value["children"][2]["properties"] = json!({"ral_hide": true});
    let world = World::from_value(value).unwrap();
    let (plan, package) = generate(&world, &ExportConfig::with_defaults(), None).unwrap();
    assert!(plan.class_of(idx(&world, "top.block")).is_none());
    assert!(plan.class_of(idx(&world, "top.block.ctrl")).is_none());
    assert!(!package.file("src/reg_model/top.rs").unwrap().contains("fn block("));

    let config = ExportConfig::with_defaults()
        .ignore_hide_property()
        .hide_pattern(r"top\.sub");
    let (plan, _) = generate(&world, &config, None).unwrap();
    assert!(plan.class_of(idx(&world, "top.block")).is_some());
    assert!(plan.class_of(idx(&world, "top.sub")).is_none());

    let config = ExportConfig::with_defaults().hide_pattern("top");
    assert!(matches!(
        generate(&world, &config, None),
        Err(GeneratorError::TopHidden(_))
    ));

    let config = ExportConfig::with_defaults().hide_pattern("(");
    assert!(matches!(
        generate(&world, &config, None),
        Err(GeneratorError::InvalidHidePattern { .. })
    ));
}

#[test]
fn test_register_without_visible_fields_is_hidden() {
    let world = world();
    let config = ExportConfig::with_defaults().hide_pattern(r"top\.block\.ctrl\.go");
    let (plan, _) = generate(&world, &config, None).unwrap();
    assert!(plan.class_of(idx(&world, "top.block.ctrl")).is_none());
    assert!(plan.children(idx(&world, "top.block")).is_empty());
}

#[test]
fn test_inconsistent_hide_predicate() {
    let world = world();
    let flip = Cell::new(false);
    let predicate: HidePredicate = Box::new(move |world: &World, idx: NodeIdx| {
        if world.node(idx).inst_name != "reg_b" {
            return false;
        }
        let answer = flip.get();
        flip.set(!answer);
        answer
    });
    assert!(matches!(
        generate(&world, &ExportConfig::with_defaults(), Some(predicate)),
        Err(GeneratorError::InconsistentHidePredicate { path }) if path == "top.reg_b"
    ));
}

#[test]
fn test_reserved_properties() {
    let world = world();
    let config = ExportConfig::with_defaults().add_udp("ral_inst_name");
    assert!(matches!(
        config.validate(),
        Err(GeneratorError::ReservedProperty(p)) if p == "ral_inst_name"
    ));
    assert!(HashEngine::new(&world, &config).is_err());
    assert!(generate(&world, &config, None).is_err());
}

#[test]
fn test_accessor_names() {
    let world = World::from_value(json!({
        "kind": "addrmap",
        "inst_name": "top",
        "children": [{
            "kind": "reg", "inst_name": "r", "regwidth": 32,
            "children": [
                {"kind": "field", "inst_name": "read", "lsb": 0, "msb": 0},
                {"kind": "field", "inst_name": "type", "lsb": 1, "msb": 1},
                {"kind": "field", "inst_name": "f2", "lsb": 2, "msb": 2,
                 "properties": {"ral_inst_name": "Write"}},
                {"kind": "field", "inst_name": "read_", "lsb": 3, "msb": 3}
            ]
        }]
    }))
    .unwrap();
    let reg = idx(&world, "top.r");
    let fields = world.node(reg).children.clone();
    assert_eq!(
        accessor_names(&world, reg, &fields),
        vec!["read_", "type_", "write_", "read__"]
    );
}

//=============================================================================
// Package
//=============================================================================

#[test]
fn test_render_package() {
    let world = world();
    let (plan, package) = generate(&world, &ExportConfig::with_defaults(), None).unwrap();
    assert_eq!(package.name, "top_ral");
    for path in [
        "Cargo.toml",
        "src/lib.rs",
        "src/reg_model/mod.rs",
        "src/reg_model/top.rs",
        "src/sim.rs",
        "src/tests/mod.rs",
        "src/tests/top.rs",
        "src/tests/top_sub.rs",
        "demos/demo.rs",
    ] {
        assert!(package.file(path).is_some(), "missing {path}");
    }

    let model = package.file("src/reg_model/top.rs").unwrap();
    let reg_ident = &plan.class_of(idx(&world, "top.reg_a")).unwrap().ident;
    let top_ident = &plan.records().last().unwrap().ident;
    assert_eq!(model.matches(&format!("pub struct {reg_ident} ")).count(), 1);
    assert!(model.contains(&format!("pub fn build(callbacks: Arc<dyn CallbackSet>) -> RalResult<{top_ident}>")));
    assert!(model.contains("impl FieldEnum for "));
    assert!(model.contains("const ENUM_NAME: &'static str = \"mode_e\";"));
    assert!(model.contains("FieldGeometry::from_msb_lsb(15, 0)?, Access::ReadWrite).with_reset(5))"));
    assert!(model.contains("pub fn first_field(&self) -> Field {"));
    assert!(model.contains("NodeArray::try_from_fn(vec![2], |flat, index| {"));
    assert!(model.contains("address + 0x100 + flat as u64 * 0x10,"));
    assert!(model.contains("pub fn read_entry(&self, index: u64) -> RalResult<u128> {"));
    assert!(model.contains("            width: 32,\n            accesswidth: 32,\n"));

    let sim = package.file("src/sim.rs").unwrap();
    assert!(sim.contains("    (0, 5),\n    (4, 5),\n];"));

    let tests = package.file("src/tests/top.rs").unwrap();
    assert!(tests.contains("fn test_reg_a() {"));
    assert!(tests.contains("for n0 in dut.block().iter() {"));
    assert!(tests.contains("reg.write_fields(&[(\"go\", FieldValue::from(1_u128))]).unwrap();"));
    assert!(package
        .file("src/tests/top_sub.rs")
        .unwrap()
        .contains("fn test_ram() {"));

    let manifest = package.file("Cargo.toml").unwrap();
    assert!(manifest.contains("name = \"top_ral\""));
    assert!(!manifest.contains("futures"));
}

#[test]
fn test_render_wide_register_and_memory() {
    let world = World::from_value(json!({
        "kind": "addrmap",
        "inst_name": "top",
        "children": [
            {
                "kind": "reg", "inst_name": "wide", "type_name": "wide_t", "regwidth": 128,
                "children": [
                    {"kind": "field", "inst_name": "low", "lsb": 0, "msb": 63},
                    {"kind": "field", "inst_name": "tag", "msb": 64, "lsb": 71, "reset": 0xd5}
                ]
            },
            {"kind": "mem", "inst_name": "rom", "address_offset": 0x100, "sw": "r",
             "mementries": 4, "memwidth": 128}
        ]
    }))
    .unwrap();
    let (_, package) = generate(&world, &ExportConfig::with_defaults(), None).unwrap();

    let model = package.file("src/reg_model/top.rs").unwrap();
    assert!(model.contains("RegisterSpec::new(name, address, 128, 64)"));
    assert!(model.contains("FieldGeometry::from_msb_lsb(64, 71)?, Access::ReadWrite).with_reset(0xd5))"));
    assert!(model.contains("pub fn read(&self) -> RalResult<u128> {"));
    assert!(model.contains("            width: 128,\n            accesswidth: 64,\n"));

    // msb0 reset 0xd5 reversed into the upper access word
    let sim = package.file("src/sim.rs").unwrap();
    assert!(sim.contains("    (8, 0xab),\n];"));

    let tests = package.file("src/tests/mod.rs").unwrap();
    assert!(tests.contains("pub(crate) fn preload_register(sim: &Simulator, spec: &RegisterSpec, raw: u128) {"));
    let tests = package.file("src/tests/top.rs").unwrap();
    assert!(tests.contains("reg.tag().write(0xff_u128).unwrap();"));
    assert!(tests.contains("sim.preload(mem.memory().spec().address + 8, 0xffff_ffff_ffff_ffff);"));
    assert!(tests.contains(
        "assert_eq!(mem.read_entry(0).unwrap(), 0xffff_ffff_ffff_ffff_ffff_ffff_ffff_ffff);"
    ));
}

#[test]
fn test_render_flavors() {
    let world = world();
    let config = ExportConfig::with_defaults()
        .asynchronous()
        .legacy_block_access()
        .skip_tests()
        .package_name("top-model")
        .runtime_path(Path::new("/opt/registers"));
    let (_, package) = generate(&world, &config, None).unwrap();
    let model = package.file("src/reg_model/top.rs").unwrap();
    assert!(model.contains("pub async fn read(&self) -> RalResult<u128> {"));
    assert!(model.contains("Arc<dyn AsyncCallbackSet>"));
    assert!(model.contains("pub async fn read(&self, start: u64, count: usize) -> RalResult<TypedBuffer> {"));
    assert!(package.file("src/tests/mod.rs").is_none());
    assert!(!package.file("src/lib.rs").unwrap().contains("mod tests;"));

    let manifest = package.file("Cargo.toml").unwrap();
    assert!(manifest.contains("futures = "));
    assert!(manifest.contains("ral-runtime = { path = \"/opt/registers/runtime\" }"));
    assert!(package
        .file("demos/demo.rs")
        .unwrap()
        .contains("use top_model::reg_model::build;"));
}

#[test]
fn test_generation_is_reproducible() {
    let world = world();
    let config = ExportConfig::with_defaults();
    let (_, first) = generate(&world, &config, None).unwrap();
    let (_, second) = generate(&world, &config, None).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_export_writes_package() {
    let world = world();
    let dir = tempfile::tempdir().unwrap();
    let summary = export(&world, &ExportConfig::with_defaults(), dir.path()).unwrap();
    assert_eq!(summary.package, dir.path().join("top_ral"));
    assert_eq!(summary.types, 7);
    assert!(summary.package.join("src/reg_model/top.rs").is_file());
    assert!(summary.package.join("demos/demo.rs").is_file());
}

//=============================================================================
// Configuration
//=============================================================================

#[test]
fn test_config_from_toml() {
    let text = r#"
udp = ["secure"]
hash_algorithm = "fast"
asynchronous = true

[hide]
patterns = ['top\.debug_.*']

[runtime]
path = "../registers"
"#;
    let config = ExportConfig::from_toml_str(text, Path::new("ral.toml")).unwrap();
    assert_eq!(config.udp, vec!["secure"]);
    assert_eq!(config.hash_algorithm, HashAlgorithm::Fast);
    assert!(config.asynchronous);
    assert!(config.hide.honor_ral_hide);
    assert!(config.include_name_and_desc);
    assert_eq!(config.runtime, RuntimeSource::Path("../registers".into()));

    assert!(matches!(
        ExportConfig::from_toml_str("udp = [\"ral_hide\"]", Path::new("ral.toml")),
        Err(GeneratorError::ReservedProperty(_))
    ));
    assert!(matches!(
        ExportConfig::from_toml_str("colour = 1", Path::new("ral.toml")),
        Err(GeneratorError::Config { .. })
    ));
}

#[test]
fn test_config_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ral.toml");
    std::fs::write(&path, "skip_test_case_generation = true\n").unwrap();
    assert!(ExportConfig::load(&path).unwrap().skip_test_case_generation);
    assert!(matches!(
        ExportConfig::load(&dir.path().join("missing.toml")),
        Err(GeneratorError::Io { .. })
    ));
}
