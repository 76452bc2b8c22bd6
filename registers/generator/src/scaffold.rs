// Licensed under the Apache-2.0 license

//! Everything in a generated package besides the register model: Cargo
//! manifest, simulator preload, generated tests and the demo program.

use crate::config::{ExportConfig, RuntimeSource};
use crate::error::{GeneratorError, GeneratorResult};
use crate::output::{variant_idents, Flavor};
use crate::unique::{ExportPlan, UniqueRecord};
use crate::util::{hex_const, hex_const_wide, snake_case};
use ral_model::{NodeIdx, NodeKind, World};
use ral_runtime::bits::{low_mask, split_words, value_mask};
use ral_runtime::callbacks::entry_bytes;
use std::collections::HashSet;
use std::fmt::Write;

const FUTURES_VERSION: &str = "0.3.31";

/// One accessor call on the way from the top to a register or memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    pub accessor: String,
    pub array: bool,
}

/// A register or memory reachable from the top, possibly through arrays.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Site {
    pub steps: Vec<Step>,
    /// Node describing the type, which may sit elsewhere in the tree.
    pub node: NodeIdx,
    pub kind: NodeKind,
    /// Test module, named after the enclosing address map.
    pub module: String,
    /// Steps leading to the enclosing address map.
    pub depth: usize,
}

impl Site {
    pub fn test_name(&self) -> String {
        let tail: Vec<&str> = self.steps[self.depth..]
            .iter()
            .map(|s| s.accessor.trim_end_matches('_'))
            .collect();
        format!("test_{}", tail.join("_"))
    }
}

pub struct PackageEmitter<'a> {
    world: &'a World,
    plan: &'a ExportPlan,
    config: &'a ExportConfig,
    flavor: Flavor,
}

impl<'a> PackageEmitter<'a> {
    pub fn new(world: &'a World, plan: &'a ExportPlan, config: &'a ExportConfig) -> Self {
        Self {
            world,
            plan,
            config,
            flavor: Flavor::for_config(config),
        }
    }

    pub fn top_module(&self) -> String {
        snake_case(&self.world.top_node().inst_name)
    }

    pub fn package_name(&self) -> String {
        self.config
            .package_name
            .clone()
            .unwrap_or_else(|| format!("{}_ral", self.top_module()))
    }

    fn crate_ident(&self) -> String {
        self.package_name().replace('-', "_")
    }

    fn class(&self, idx: NodeIdx) -> GeneratorResult<&'a UniqueRecord> {
        self.plan
            .class_of(idx)
            .ok_or_else(|| GeneratorError::MissingClass {
                path: self.world.path(idx),
            })
    }

    fn header(&self, output: &mut String) {
        writeln!(output, "// Licensed under the Apache-2.0 license").unwrap();
        writeln!(output, "//").unwrap();
        writeln!(output, "// Generated by ral-generator. Do not edit.").unwrap();
        writeln!(output).unwrap();
    }

    //=========================================================================
    // Manifest and module roots
    //=========================================================================

    pub fn cargo_toml(&self) -> String {
        let mut output = String::new();
        writeln!(output, "# Generated by ral-generator. Do not edit.").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "[package]").unwrap();
        writeln!(output, "name = {:?}", self.package_name()).unwrap();
        writeln!(output, "version = \"0.1.0\"").unwrap();
        writeln!(output, "edition = \"2021\"").unwrap();
        writeln!(output, "publish = false").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "[dependencies]").unwrap();
        match &self.config.runtime {
            RuntimeSource::Path(path) => {
                let runtime = path.join("runtime");
                let sim = path.join("sim");
                writeln!(
                    output,
                    "ral-runtime = {{ path = {:?} }}",
                    runtime.display().to_string()
                )
                .unwrap();
                writeln!(output, "ral-sim = {{ path = {:?} }}", sim.display().to_string()).unwrap();
            }
            RuntimeSource::Version(version) => {
                writeln!(output, "ral-runtime = {version:?}").unwrap();
                writeln!(output, "ral-sim = {version:?}").unwrap();
            }
        }
        if self.flavor.is_async() {
            writeln!(output, "futures = {FUTURES_VERSION:?}").unwrap();
        }
        writeln!(output).unwrap();
        writeln!(output, "[[example]]").unwrap();
        writeln!(output, "name = \"demo\"").unwrap();
        writeln!(output, "path = \"demos/demo.rs\"").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "[workspace]").unwrap();
        output
    }

    pub fn lib_rs(&self) -> String {
        let mut output = String::new();
        self.header(&mut output);
        writeln!(
            output,
            "//! Register access layer for the `{}` address map.",
            self.world.top_node().inst_name
        )
        .unwrap();
        writeln!(output).unwrap();
        writeln!(output, "pub mod reg_model;").unwrap();
        writeln!(output, "pub mod sim;").unwrap();
        if !self.config.skip_test_case_generation {
            writeln!(output).unwrap();
            writeln!(output, "#[cfg(test)]").unwrap();
            writeln!(output, "mod tests;").unwrap();
        }
        output
    }

    pub fn reg_model_mod_rs(&self) -> String {
        let mut output = String::new();
        self.header(&mut output);
        writeln!(output, "pub mod {};", self.top_module()).unwrap();
        writeln!(output).unwrap();
        writeln!(output, "pub use {}::build;", self.top_module()).unwrap();
        output
    }

    //=========================================================================
    // Simulator
    //=========================================================================

    /// Non-zero reset words of every register element, by byte address.
    pub fn reset_values(&self) -> GeneratorResult<Vec<(u64, u64)>> {
        let mut values = Vec::new();
        let top = self.class(self.world.top())?;
        self.collect_resets(
            top.node,
            self.world.absolute_address(self.world.top()),
            &mut values,
        )?;
        Ok(values)
    }

    fn collect_resets(
        &self,
        rep: NodeIdx,
        base: u64,
        values: &mut Vec<(u64, u64)>,
    ) -> GeneratorResult<()> {
        for (child, _) in self.plan.children(rep) {
            let node = self.world.node(*child);
            let (count, stride) = match &node.array {
                Some(array) => (array.len() as u64, array.stride),
                None => (1, 0),
            };
            let class = self.class(*child)?;
            for element in 0..count {
                let address = base + node.address_offset + element * stride;
                match node.kind {
                    NodeKind::Reg => self.register_reset(class.node, address, values),
                    NodeKind::RegFile | NodeKind::AddrMap => {
                        self.collect_resets(class.node, address, values)?
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn register_reset(&self, rep: NodeIdx, address: u64, values: &mut Vec<(u64, u64)>) {
        let Some(reg) = self.world.node(rep).as_reg() else {
            return;
        };
        let value = self
            .plan
            .children(rep)
            .iter()
            .filter_map(|(f, _)| self.world.node(*f).as_field())
            .filter_map(|f| f.reset.and_then(|r| f.geometry.encode(r).ok()))
            .fold(0, |acc, v| acc | v);
        let words = split_words(value, reg.regwidth, reg.accesswidth);
        for (i, word) in words.into_iter().enumerate() {
            if word != 0 {
                values.push((address + i as u64 * entry_bytes(reg.accesswidth), word));
            }
        }
    }

    pub fn sim_rs(&self) -> GeneratorResult<String> {
        let mut output = String::new();
        self.header(&mut output);
        writeln!(output, "use ral_sim::Simulator;").unwrap();
        writeln!(output, "use std::sync::Arc;").unwrap();
        writeln!(output).unwrap();
        writeln!(
            output,
            "/// Register reset values by byte address. Zero words are left out."
        )
        .unwrap();
        writeln!(output, "pub const RESET_VALUES: &[(u64, u64)] = &[").unwrap();
        for (address, value) in self.reset_values()? {
            writeln!(output, "    ({}, {}),", hex_const(address), hex_const(value)).unwrap();
        }
        writeln!(output, "];").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "/// Simulator holding every register at its reset value.").unwrap();
        writeln!(output, "pub fn simulator() -> Arc<Simulator> {{").unwrap();
        writeln!(output, "    let sim = Simulator::new();").unwrap();
        writeln!(output, "    sim.preload_all(RESET_VALUES);").unwrap();
        writeln!(output, "    Arc::new(sim)").unwrap();
        writeln!(output, "}}").unwrap();
        Ok(output)
    }

    //=========================================================================
    // Demo
    //=========================================================================

    pub fn demo_rs(&self) -> GeneratorResult<String> {
        let mut output = String::new();
        let krate = self.crate_ident();
        self.header(&mut output);
        writeln!(output, "use {krate}::reg_model::build;").unwrap();
        writeln!(output, "use {krate}::sim::simulator;").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "fn main() {{").unwrap();
        writeln!(output, "    let sim = simulator();").unwrap();
        writeln!(output, "    let top = match build(sim.clone()) {{").unwrap();
        writeln!(output, "        Ok(top) => top,").unwrap();
        writeln!(output, "        Err(e) => {{").unwrap();
        writeln!(output, "            eprintln!(\"Error: {{}}\", e);").unwrap();
        writeln!(output, "            std::process::exit(1);").unwrap();
        writeln!(output, "        }}").unwrap();
        writeln!(output, "    }};").unwrap();
        writeln!(
            output,
            "    println!(\"{{}} @ {{:#x}}\", top.name(), top.address());"
        )
        .unwrap();

        let top = self.class(self.world.top())?;
        let first_readable = self.plan.children(top.node).iter().find(|(c, _)| {
            let node = self.world.node(*c);
            node.kind == NodeKind::Reg
                && !node.is_array()
                && self
                    .plan
                    .class_of(*c)
                    .is_some_and(|r| self.world.reg_readable(r.node))
        });
        if let Some((_, accessor)) = first_readable {
            let read = if self.flavor.is_async() {
                format!("futures::executor::block_on(top.{accessor}().read())")
            } else {
                format!("top.{accessor}().read()")
            };
            writeln!(output, "    match {read} {{").unwrap();
            writeln!(
                output,
                "        Ok(value) => println!(\"{accessor} = {{:#x}}\", value),"
            )
            .unwrap();
            writeln!(output, "        Err(e) => eprintln!(\"{accessor}: {{}}\", e),").unwrap();
            writeln!(output, "    }}").unwrap();
        }
        writeln!(output, "    let stats = sim.stats();").unwrap();
        writeln!(
            output,
            "    println!(\"{{}} reads, {{}} writes\", stats.total_reads(), stats.total_writes());"
        )
        .unwrap();
        writeln!(output, "}}").unwrap();
        Ok(output)
    }

    //=========================================================================
    // Tests
    //=========================================================================

    /// Every register and memory reachable from the top, grouped by the
    /// address map enclosing it.
    pub fn sites(&self) -> GeneratorResult<Vec<Site>> {
        let mut sites = Vec::new();
        let top = self.class(self.world.top())?;
        self.collect_sites(top.node, &mut Vec::new(), (&self.top_module(), 0), &mut sites)?;
        Ok(sites)
    }

    fn collect_sites(
        &self,
        rep: NodeIdx,
        steps: &mut Vec<Step>,
        (module, depth): (&str, usize),
        sites: &mut Vec<Site>,
    ) -> GeneratorResult<()> {
        for (child, accessor) in self.plan.children(rep) {
            let node = self.world.node(*child);
            let class = self.class(*child)?;
            steps.push(Step {
                accessor: accessor.clone(),
                array: node.is_array(),
            });
            match node.kind {
                NodeKind::Reg | NodeKind::Mem => sites.push(Site {
                    steps: steps.clone(),
                    node: class.node,
                    kind: node.kind,
                    module: module.to_string(),
                    depth,
                }),
                NodeKind::RegFile => {
                    self.collect_sites(class.node, steps, (module, depth), sites)?
                }
                NodeKind::AddrMap => {
                    let nested = format!("{module}_{}", accessor.trim_end_matches('_'));
                    let depth = steps.len();
                    self.collect_sites(class.node, steps, (&nested, depth), sites)?
                }
                _ => {}
            }
            steps.pop();
        }
        Ok(())
    }

    /// `src/tests/mod.rs` and one `(module, source)` pair per address map.
    pub fn tests(&self) -> GeneratorResult<(String, Vec<(String, String)>)> {
        let sites = self.sites()?;
        let mut modules: Vec<String> = Vec::new();
        for site in &sites {
            if !modules.contains(&site.module) {
                modules.push(site.module.clone());
            }
        }

        let mut mod_rs = String::new();
        self.header(&mut mod_rs);
        for module in &modules {
            writeln!(mod_rs, "mod {module};").unwrap();
        }
        writeln!(mod_rs).unwrap();
        writeln!(mod_rs, "use ral_runtime::bits::split_words;").unwrap();
        writeln!(mod_rs, "use ral_runtime::callbacks::entry_bytes;").unwrap();
        writeln!(mod_rs, "use ral_runtime::RegisterSpec;").unwrap();
        writeln!(mod_rs, "use ral_sim::Simulator;").unwrap();
        writeln!(mod_rs).unwrap();
        writeln!(
            mod_rs,
            "/// Stores `raw` the way the register's sub-word accesses see it."
        )
        .unwrap();
        writeln!(
            mod_rs,
            "pub(crate) fn preload_register(sim: &Simulator, spec: &RegisterSpec, raw: u128) {{"
        )
        .unwrap();
        writeln!(
            mod_rs,
            "    let words = split_words(raw, spec.width, spec.accesswidth);"
        )
        .unwrap();
        writeln!(mod_rs, "    for (i, word) in words.into_iter().enumerate() {{").unwrap();
        writeln!(
            mod_rs,
            "        sim.preload(spec.address + i as u64 * entry_bytes(spec.accesswidth), word);"
        )
        .unwrap();
        writeln!(mod_rs, "    }}").unwrap();
        writeln!(mod_rs, "}}").unwrap();

        let mut files = Vec::new();
        for module in &modules {
            let mut output = String::new();
            self.header(&mut output);
            writeln!(output, "#![allow(unused_imports)]").unwrap();
            writeln!(output).unwrap();
            writeln!(output, "use super::preload_register;").unwrap();
            writeln!(output, "use crate::reg_model::build;").unwrap();
            writeln!(output, "use crate::reg_model::{}::*;", self.top_module()).unwrap();
            writeln!(output, "use crate::sim::simulator;").unwrap();
            if self.flavor.is_async() {
                writeln!(output, "use futures::executor::block_on;").unwrap();
            }
            writeln!(output, "use ral_runtime::{{FieldEnum, FieldValue, TypedBuffer}};").unwrap();

            let mut names = HashSet::new();
            for site in sites.iter().filter(|s| &s.module == module) {
                let mut name = site.test_name();
                while !names.insert(name.clone()) {
                    name.push('_');
                }
                writeln!(output).unwrap();
                self.emit_site_test(&mut output, site, &name)?;
            }
            files.push((module.clone(), output));
        }
        Ok((mod_rs, files))
    }

    fn emit_site_test(&self, output: &mut String, site: &Site, name: &str) -> GeneratorResult<()> {
        let is_async = self.flavor.is_async();
        let mut indent = String::from("    ");
        writeln!(output, "#[test]").unwrap();
        writeln!(output, "fn {name}() {{").unwrap();
        if is_async {
            writeln!(output, "    block_on(async {{").unwrap();
            indent.push_str("    ");
        }
        writeln!(output, "{indent}let sim = simulator();").unwrap();
        writeln!(output, "{indent}let dut = build(sim.clone()).unwrap();").unwrap();

        let target = if site.kind == NodeKind::Mem { "mem" } else { "reg" };
        let mut current = String::from("dut");
        let mut open = 0;
        for (i, step) in site.steps.iter().enumerate() {
            let var = if i + 1 == site.steps.len() {
                target.to_string()
            } else {
                format!("n{i}")
            };
            if step.array {
                writeln!(
                    output,
                    "{indent}for {var} in {current}.{}().iter() {{",
                    step.accessor
                )
                .unwrap();
                indent.push_str("    ");
                open += 1;
            } else {
                writeln!(output, "{indent}let {var} = {current}.{}();", step.accessor).unwrap();
            }
            current = var;
        }

        let mut body = String::new();
        if site.kind == NodeKind::Mem {
            self.memory_body(&mut body, site.node)?;
        } else {
            self.register_body(&mut body, site.node)?;
        }
        for line in body.lines() {
            writeln!(output, "{indent}{line}").unwrap();
        }

        for _ in 0..open {
            indent.truncate(indent.len() - 4);
            writeln!(output, "{indent}}}").unwrap();
        }
        if is_async {
            writeln!(output, "    }});").unwrap();
        }
        writeln!(output, "}}").unwrap();
        Ok(())
    }

    /// Boundary values of a field as (Rust expression, encoded register bits).
    fn field_values(&self, field: NodeIdx) -> Vec<(String, u128)> {
        let Some(info) = self.world.node(field).as_field() else {
            return Vec::new();
        };
        match self.plan.enum_of(field) {
            Some(record) => variant_idents(record)
                .into_iter()
                .zip(&record.encoding.entries)
                .filter_map(|(variant, entry)| {
                    info.geometry
                        .encode(entry.value)
                        .ok()
                        .map(|raw| (format!("{}::{variant}", record.ident), raw))
                })
                .collect(),
            None => {
                let max = info.geometry.max_value();
                [0, max]
                    .into_iter()
                    .filter_map(|v| {
                        info.geometry
                            .encode_unsigned(v)
                            .ok()
                            .map(|raw| (format!("{}_u128", hex_const_wide(v)), raw))
                    })
                    .collect()
            }
        }
    }

    fn register_body(&self, output: &mut String, rep: NodeIdx) -> GeneratorResult<()> {
        let aw = self.flavor.await_suffix;
        let Some(reg) = self.world.node(rep).as_reg() else {
            return Ok(());
        };
        let wide = reg.regwidth > reg.accesswidth;
        let fields: Vec<_> = self
            .plan
            .children(rep)
            .iter()
            .filter_map(|(f, accessor)| {
                self.world
                    .node(*f)
                    .as_field()
                    .map(|info| (*f, accessor.as_str(), info))
            })
            .collect();
        let readable = fields.iter().any(|(_, _, info)| info.sw.readable());

        if readable {
            for (field, accessor, info) in &fields {
                for (value, raw) in self.field_values(*field) {
                    match (info.sw.readable(), info.sw.writable()) {
                        (true, true) => {
                            writeln!(output, "reg.{accessor}().write({value}){aw}.unwrap();").unwrap();
                            writeln!(
                                output,
                                "assert_eq!(reg.{accessor}().read(){aw}.unwrap(), {value});"
                            )
                            .unwrap();
                        }
                        (true, false) => {
                            writeln!(
                                output,
                                "preload_register(&sim, reg.register().spec(), {});",
                                hex_const_wide(raw)
                            )
                            .unwrap();
                            writeln!(
                                output,
                                "assert_eq!(reg.{accessor}().read(){aw}.unwrap(), {value});"
                            )
                            .unwrap();
                        }
                        _ => {
                            writeln!(output, "reg.{accessor}().write({value}){aw}.unwrap();").unwrap();
                            if !wide {
                                writeln!(
                                    output,
                                    "assert_eq!(sim.peek(reg.register().address()) & {}, {});",
                                    hex_const_wide(info.geometry.bitmask()),
                                    hex_const_wide(raw)
                                )
                                .unwrap();
                            }
                        }
                    }
                }
            }
            return Ok(());
        }

        // Write-only register: every write names every field.
        for pick_last in [false, true] {
            let mut args = Vec::new();
            let mut expected = 0;
            for (field, _, _) in &fields {
                let values = self.field_values(*field);
                let chosen = if pick_last { values.last() } else { values.first() };
                let Some((value, raw)) = chosen else {
                    continue;
                };
                let name = &self.world.node(*field).inst_name;
                let arg = if self.plan.enum_of(*field).is_some() {
                    format!("({name:?}, {value}.into_value())")
                } else {
                    format!("({name:?}, FieldValue::from({value}))")
                };
                args.push(arg);
                expected |= raw;
            }
            writeln!(output, "reg.write_fields(&[{}]){aw}.unwrap();", args.join(", ")).unwrap();
            if !wide {
                writeln!(
                    output,
                    "assert_eq!(sim.peek(reg.register().address()), {});",
                    hex_const_wide(expected)
                )
                .unwrap();
            }
        }
        Ok(())
    }

    fn memory_body(&self, output: &mut String, rep: NodeIdx) -> GeneratorResult<()> {
        let aw = self.flavor.await_suffix;
        let Some(mem) = self.world.node(rep).as_mem() else {
            return Ok(());
        };
        let max = hex_const_wide(value_mask(mem.memwidth));
        // Physical words holding entry 0, as (byte offset, all-ones word).
        let sub_words: Vec<(String, String)> = (0..mem.memwidth / mem.accesswidth)
            .map(|i| {
                (
                    hex_const(u64::from(i) * entry_bytes(mem.accesswidth)),
                    hex_const(low_mask(mem.accesswidth)),
                )
            })
            .collect();
        let count = mem.mementries.min(4);
        writeln!(output, "let last = mem.entries() - 1;").unwrap();
        match (mem.sw.readable(), mem.sw.writable()) {
            (true, true) => {
                writeln!(output, "mem.write_entry(0, {max}){aw}.unwrap();").unwrap();
                writeln!(output, "assert_eq!(mem.read_entry(0){aw}.unwrap(), {max});").unwrap();
                writeln!(output, "mem.write_entry(last, 1){aw}.unwrap();").unwrap();
                writeln!(output, "assert_eq!(mem.read_entry(last){aw}.unwrap(), 1);").unwrap();
                writeln!(
                    output,
                    "let words: Vec<u128> = (0..{count}).map(|i| (i + 1) & {max}).collect();"
                )
                .unwrap();
                if self.config.legacy_block_access {
                    writeln!(
                        output,
                        "mem.write(0, &TypedBuffer::from_words({}, &words)){aw}.unwrap();",
                        mem.memwidth
                    )
                    .unwrap();
                    writeln!(
                        output,
                        "assert_eq!(mem.read(0, {count}){aw}.unwrap().to_words(), words);"
                    )
                    .unwrap();
                } else {
                    writeln!(output, "mem.write(0, &words){aw}.unwrap();").unwrap();
                    writeln!(output, "assert_eq!(mem.read(0, {count}){aw}.unwrap(), words);").unwrap();
                }
            }
            (true, false) => {
                for (offset, word) in &sub_words {
                    writeln!(
                        output,
                        "sim.preload(mem.memory().spec().address + {offset}, {word});"
                    )
                    .unwrap();
                }
                writeln!(output, "assert_eq!(mem.read_entry(0){aw}.unwrap(), {max});").unwrap();
                if mem.mementries > 1 {
                    writeln!(output, "assert_eq!(mem.read_entry(last){aw}.unwrap(), 0);").unwrap();
                }
            }
            _ => {
                writeln!(output, "mem.write_entry(0, {max}){aw}.unwrap();").unwrap();
                for (offset, word) in &sub_words {
                    writeln!(
                        output,
                        "assert_eq!(sim.peek(mem.memory().spec().address + {offset}), {word});"
                    )
                    .unwrap();
                }
                writeln!(output, "mem.write_entry(last, 1){aw}.unwrap();").unwrap();
            }
        }
        Ok(())
    }
}
