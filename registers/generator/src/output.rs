// Licensed under the Apache-2.0 license

//! Rust source for the register model of one export.
//!
//! ## Code Generation Flow
//!
//! ```text
//! ExportPlan → reg_model/<top>.rs
//!              ├── EnumRecord[]            → enum + FieldEnum impl
//!              ├── UniqueRecord (field)    → newtype over Field
//!              ├── UniqueRecord (reg)      → struct over Register + layout()
//!              ├── UniqueRecord (mem)      → struct over Memory
//!              ├── UniqueRecord (regfile)  → struct holding children
//!              ├── UniqueRecord (addrmap)  → struct holding children
//!              └── build()                 → binds the top to callbacks
//! ```
//!
//! The same emitter produces blocking and async models; [`Flavor`] carries
//! the type and keyword differences.

use crate::config::ExportConfig;
use crate::error::{GeneratorError, GeneratorResult};
use crate::unique::{EnumRecord, ExportPlan, UniqueRecord};
use crate::util::{camel_case, doc_lines, hex_const, snake_case};
use ral_model::{Node, NodeIdx, NodeKind, PropertyValue, World};
use ral_runtime::Access;
use std::collections::HashSet;
use std::fmt::Write;

//=============================================================================
// Flavor
//=============================================================================

/// Names that differ between the blocking and the async model.
#[derive(Clone, Copy, Debug)]
pub struct Flavor {
    pub callbacks: &'static str,
    pub register: &'static str,
    pub field: &'static str,
    pub register_array: &'static str,
    pub typed_array: &'static str,
    pub from_register: &'static str,
    pub memory: &'static str,
    /// `"async "` or empty, placed before `fn`.
    pub fn_prefix: &'static str,
    /// `".await"` or empty, placed after a physical access.
    pub await_suffix: &'static str,
}

impl Flavor {
    pub const BLOCKING: Flavor = Flavor {
        callbacks: "CallbackSet",
        register: "Register",
        field: "Field",
        register_array: "RegisterArray",
        typed_array: "TypedRegisterArray",
        from_register: "FromRegister",
        memory: "Memory",
        fn_prefix: "",
        await_suffix: "",
    };

    pub const ASYNC: Flavor = Flavor {
        callbacks: "AsyncCallbackSet",
        register: "AsyncRegister",
        field: "AsyncField",
        register_array: "AsyncRegisterArray",
        typed_array: "AsyncTypedRegisterArray",
        from_register: "AsyncFromRegister",
        memory: "AsyncMemory",
        fn_prefix: "async ",
        await_suffix: ".await",
    };

    pub fn for_config(config: &ExportConfig) -> Flavor {
        if config.asynchronous {
            Flavor::ASYNC
        } else {
            Flavor::BLOCKING
        }
    }

    pub fn is_async(&self) -> bool {
        !self.await_suffix.is_empty()
    }
}

//=============================================================================
// Helpers
//=============================================================================

pub fn access_variant(access: Access) -> &'static str {
    match access {
        Access::ReadWrite => "Access::ReadWrite",
        Access::ReadOnly => "Access::ReadOnly",
        Access::WriteOnly => "Access::WriteOnly",
    }
}

/// Byte address expression `base + offset`, without the `+ 0`.
pub fn offset_expr(base: &str, offset: u64) -> String {
    if offset == 0 {
        base.to_string()
    } else {
        format!("{base} + {}", hex_const(offset))
    }
}

fn property_const(name: &str, value: &PropertyValue) -> String {
    let ident = snake_case(name).to_uppercase();
    match value {
        PropertyValue::Bool(b) => format!("pub const {ident}: bool = {b};"),
        PropertyValue::Int(i) => format!("pub const {ident}: i64 = {i};"),
        PropertyValue::String(s) => format!("pub const {ident}: &'static str = {s:?};"),
    }
}

/// Variant identifiers of an enumeration, in entry order.
pub fn variant_idents(record: &EnumRecord) -> Vec<String> {
    let mut taken = HashSet::new();
    record
        .encoding
        .entries
        .iter()
        .map(|e| {
            let mut ident = camel_case(&e.name);
            if !taken.insert(ident.clone()) {
                ident = format!("{ident}V{}", e.value);
                taken.insert(ident.clone());
            }
            ident
        })
        .collect()
}

//=============================================================================
// ModelEmitter
//=============================================================================

pub struct ModelEmitter<'a> {
    world: &'a World,
    plan: &'a ExportPlan,
    udp: Vec<String>,
    flavor: Flavor,
    legacy_block_access: bool,
}

impl<'a> ModelEmitter<'a> {
    pub fn new(world: &'a World, plan: &'a ExportPlan, config: &ExportConfig) -> Self {
        let mut udp = config.udp.clone();
        udp.sort();
        udp.dedup();
        Self {
            world,
            plan,
            udp,
            flavor: Flavor::for_config(config),
            legacy_block_access: config.legacy_block_access,
        }
    }

    fn class(&self, idx: NodeIdx) -> GeneratorResult<&'a UniqueRecord> {
        self.plan
            .class_of(idx)
            .ok_or_else(|| GeneratorError::MissingClass {
                path: self.world.path(idx),
            })
    }

    /// Complete `reg_model/<top>.rs`.
    pub fn render(&self) -> GeneratorResult<String> {
        let mut output = String::new();
        let top = self.world.top_node();
        let f = self.flavor;
        writeln!(output, "// Licensed under the Apache-2.0 license").unwrap();
        writeln!(output, "//").unwrap();
        writeln!(
            output,
            "// Generated by ral-generator from the `{}` address map. Do not edit.",
            top.inst_name
        )
        .unwrap();
        writeln!(output).unwrap();
        writeln!(output, "#![allow(dead_code, unused_imports)]").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "use ral_runtime::{{").unwrap();
        writeln!(
            output,
            "    index_suffix, Access, CacheOptions, EnumDef, FieldEnum, FieldGeometry, FieldSpec,"
        )
        .unwrap();
        writeln!(
            output,
            "    FieldValue, FieldValues, MemorySpec, NodeArray, RalResult, RegisterSpec, TypedBuffer,"
        )
        .unwrap();
        writeln!(
            output,
            "    {}, {}, {}, {}, {}, {}, {},",
            f.callbacks, f.field, f.from_register, f.memory, f.register, f.register_array, f.typed_array
        )
        .unwrap();
        if f.is_async() {
            writeln!(
                output,
                "    AsyncCachedArray, AsyncCachedMemory, AsyncCachedRegister,"
            )
            .unwrap();
        } else {
            writeln!(output, "    CachedRegister,").unwrap();
        }
        writeln!(output, "}};").unwrap();
        writeln!(output, "use std::sync::Arc;").unwrap();

        for record in self.plan.enums() {
            writeln!(output).unwrap();
            self.emit_enum(&mut output, record);
        }
        for record in self.plan.records() {
            writeln!(output).unwrap();
            let node = self.world.node(record.node);
            match node.kind {
                NodeKind::Field => self.emit_field(&mut output, record, node)?,
                NodeKind::Reg => self.emit_register(&mut output, record, node)?,
                NodeKind::Mem => self.emit_memory(&mut output, record, node)?,
                NodeKind::RegFile | NodeKind::AddrMap => {
                    self.emit_container(&mut output, record, node)?
                }
                NodeKind::Signal => {
                    return Err(GeneratorError::UnsupportedKind {
                        path: self.world.path(record.node),
                        kind: node.kind,
                    })
                }
            }
        }

        let top_class = self.class(self.world.top())?;
        writeln!(output).unwrap();
        writeln!(
            output,
            "/// Binds the `{}` address map at {} to `callbacks`.",
            top.inst_name,
            hex_const(self.world.absolute_address(self.world.top()))
        )
        .unwrap();
        writeln!(
            output,
            "pub fn build(callbacks: Arc<dyn {}>) -> RalResult<{}> {{",
            f.callbacks, top_class.ident
        )
        .unwrap();
        writeln!(
            output,
            "    {}::new({:?}, {}, callbacks)",
            top_class.ident,
            top.inst_name,
            hex_const(self.world.absolute_address(self.world.top()))
        )
        .unwrap();
        writeln!(output, "}}").unwrap();
        Ok(output)
    }

    fn emit_docs(&self, output: &mut String, indent: &str, node: &Node) {
        output.push_str(&doc_lines(indent, node.name.as_deref(), node.desc.as_deref()));
    }

    fn emit_properties(&self, output: &mut String, node: &Node) {
        for udp in &self.udp {
            if let Some(value) = node.property(udp) {
                writeln!(output, "    {}", property_const(udp, value)).unwrap();
            }
        }
    }

    fn emit_enum(&self, output: &mut String, record: &EnumRecord) {
        let ident = &record.ident;
        let variants = variant_idents(record);
        let entries = &record.encoding.entries;
        writeln!(output, "/// `{}`", record.encoding.name).unwrap();
        writeln!(output, "#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]").unwrap();
        writeln!(output, "pub enum {ident} {{").unwrap();
        for (variant, entry) in variants.iter().zip(entries) {
            output.push_str(&doc_lines("    ", None, entry.desc.as_deref()));
            writeln!(output, "    {variant},").unwrap();
        }
        writeln!(output, "}}").unwrap();
        writeln!(output).unwrap();

        writeln!(output, "impl {ident} {{").unwrap();
        writeln!(output, "    pub const MEMBERS: &'static [Self] = &[").unwrap();
        for variant in &variants {
            writeln!(output, "        Self::{variant},").unwrap();
        }
        writeln!(output, "    ];").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "    pub fn encoding() -> Arc<EnumDef> {{").unwrap();
        let pairs: Vec<String> = entries
            .iter()
            .map(|e| format!("({}, {:?})", hex_const(e.value), e.name))
            .collect();
        writeln!(
            output,
            "        Arc::new(EnumDef::new({:?}, &[{}]))",
            record.encoding.name,
            pairs.join(", ")
        )
        .unwrap();
        writeln!(output, "    }}").unwrap();
        writeln!(output, "}}").unwrap();
        writeln!(output).unwrap();

        writeln!(output, "impl FieldEnum for {ident} {{").unwrap();
        writeln!(
            output,
            "    const ENUM_NAME: &'static str = {:?};",
            record.encoding.name
        )
        .unwrap();
        writeln!(output).unwrap();
        writeln!(output, "    fn value(self) -> u64 {{").unwrap();
        writeln!(output, "        match self {{").unwrap();
        for (variant, entry) in variants.iter().zip(entries) {
            writeln!(output, "            Self::{variant} => {},", hex_const(entry.value)).unwrap();
        }
        writeln!(output, "        }}").unwrap();
        writeln!(output, "    }}").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "    fn name(self) -> &'static str {{").unwrap();
        writeln!(output, "        match self {{").unwrap();
        for (variant, entry) in variants.iter().zip(entries) {
            writeln!(output, "            Self::{variant} => {:?},", entry.name).unwrap();
        }
        writeln!(output, "        }}").unwrap();
        writeln!(output, "    }}").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "    fn from_value(value: u64) -> Option<Self> {{").unwrap();
        writeln!(output, "        match value {{").unwrap();
        let mut seen = HashSet::new();
        for (variant, entry) in variants.iter().zip(entries) {
            if seen.insert(entry.value) {
                writeln!(
                    output,
                    "            {} => Some(Self::{variant}),",
                    hex_const(entry.value)
                )
                .unwrap();
            }
        }
        writeln!(output, "            _ => None,").unwrap();
        writeln!(output, "        }}").unwrap();
        writeln!(output, "    }}").unwrap();
        writeln!(output, "}}").unwrap();
    }

    /// Typed wrapper for a field with its own type.
    fn emit_field(
        &self,
        output: &mut String,
        record: &UniqueRecord,
        node: &Node,
    ) -> GeneratorResult<()> {
        let f = self.flavor;
        let ident = &record.ident;
        let info = node.as_field().ok_or_else(|| GeneratorError::UnsupportedKind {
            path: self.world.path(record.node),
            kind: node.kind,
        })?;
        let encoding = self.plan.enum_of(record.node);

        self.emit_docs(output, "", node);
        writeln!(output, "#[derive(Clone)]").unwrap();
        writeln!(output, "pub struct {ident}({});", f.field).unwrap();
        writeln!(output).unwrap();
        writeln!(output, "impl {ident} {{").unwrap();
        self.emit_properties(output, node);
        writeln!(output, "    pub fn field(&self) -> &{} {{", f.field).unwrap();
        writeln!(output, "        &self.0").unwrap();
        writeln!(output, "    }}").unwrap();
        let (value_ty, read_call, write_call) = match encoding {
            Some(e) => (e.ident.as_str(), "read_enum", "write_enum"),
            None => ("u128", "read", "write"),
        };
        if info.sw.readable() {
            writeln!(output).unwrap();
            writeln!(
                output,
                "    pub {}fn read(&self) -> RalResult<{value_ty}> {{",
                f.fn_prefix
            )
            .unwrap();
            writeln!(output, "        self.0.{read_call}(){}", f.await_suffix).unwrap();
            writeln!(output, "    }}").unwrap();
        }
        if info.sw.writable() {
            writeln!(output).unwrap();
            writeln!(
                output,
                "    pub {}fn write(&self, value: {value_ty}) -> RalResult<()> {{",
                f.fn_prefix
            )
            .unwrap();
            writeln!(output, "        self.0.{write_call}(value){}", f.await_suffix).unwrap();
            writeln!(output, "    }}").unwrap();
        }
        writeln!(output, "}}").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "impl From<{}> for {ident} {{", f.field).unwrap();
        writeln!(output, "    fn from(field: {}) -> Self {{", f.field).unwrap();
        writeln!(output, "        Self(field)").unwrap();
        writeln!(output, "    }}").unwrap();
        writeln!(output, "}}").unwrap();
        Ok(())
    }

    fn emit_register(
        &self,
        output: &mut String,
        record: &UniqueRecord,
        node: &Node,
    ) -> GeneratorResult<()> {
        let f = self.flavor;
        let ident = &record.ident;
        let reg = node.as_reg().ok_or_else(|| GeneratorError::UnsupportedKind {
            path: self.world.path(record.node),
            kind: node.kind,
        })?;
        let fields = self.plan.children(record.node);
        let infos: Vec<_> = fields
            .iter()
            .filter_map(|(c, _)| self.world.node(*c).as_field())
            .collect();
        let readable = infos.iter().any(|i| i.sw.readable());
        let writable = infos.iter().any(|i| i.sw.writable());

        self.emit_docs(output, "", node);
        writeln!(output, "#[derive(Clone)]").unwrap();
        writeln!(output, "pub struct {ident} {{").unwrap();
        writeln!(output, "    reg: {},", f.register).unwrap();
        writeln!(output, "}}").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "impl {ident} {{").unwrap();
        self.emit_properties(output, node);

        writeln!(
            output,
            "    pub fn layout(name: &str, address: u64) -> RalResult<RegisterSpec> {{"
        )
        .unwrap();
        writeln!(
            output,
            "        Ok(RegisterSpec::new(name, address, {}, {})",
            reg.regwidth, reg.accesswidth
        )
        .unwrap();
        for (child, _) in fields {
            let field = self.world.node(*child);
            let Some(info) = field.as_field() else {
                continue;
            };
            write!(
                output,
                "            .with_field(FieldSpec::new({:?}, FieldGeometry::from_msb_lsb({}, {})?, {})",
                field.inst_name,
                info.geometry.msb(),
                info.geometry.lsb(),
                access_variant(info.sw)
            )
            .unwrap();
            if let Some(reset) = info.reset {
                write!(output, ".with_reset({})", hex_const(reset)).unwrap();
            }
            if let Some(e) = self.plan.enum_of(*child) {
                write!(output, ".with_encoding({}::encoding())", e.ident).unwrap();
            }
            writeln!(output, ")").unwrap();
        }
        writeln!(output, "        )").unwrap();
        writeln!(output, "    }}").unwrap();
        writeln!(output).unwrap();

        writeln!(
            output,
            "    pub fn new(name: &str, address: u64, callbacks: Arc<dyn {}>) -> RalResult<Self> {{",
            f.callbacks
        )
        .unwrap();
        writeln!(output, "        Ok(Self {{").unwrap();
        writeln!(
            output,
            "            reg: {}::new(Self::layout(name, address)?, callbacks),",
            f.register
        )
        .unwrap();
        writeln!(output, "        }})").unwrap();
        writeln!(output, "    }}").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "    pub fn register(&self) -> &{} {{", f.register).unwrap();
        writeln!(output, "        &self.reg").unwrap();
        writeln!(output, "    }}").unwrap();

        if readable {
            writeln!(output).unwrap();
            writeln!(output, "    pub {}fn read(&self) -> RalResult<u128> {{", f.fn_prefix).unwrap();
            writeln!(output, "        self.reg.read(){}", f.await_suffix).unwrap();
            writeln!(output, "    }}").unwrap();
            writeln!(output).unwrap();
            writeln!(
                output,
                "    /// Every readable field from a single register read."
            )
            .unwrap();
            writeln!(
                output,
                "    pub {}fn read_fields(&self) -> RalResult<FieldValues> {{",
                f.fn_prefix
            )
            .unwrap();
            writeln!(output, "        self.reg.read_fields(){}", f.await_suffix).unwrap();
            writeln!(output, "    }}").unwrap();
        }
        if writable {
            writeln!(output).unwrap();
            writeln!(
                output,
                "    pub {}fn write(&self, value: u128) -> RalResult<()> {{",
                f.fn_prefix
            )
            .unwrap();
            writeln!(output, "        self.reg.write(value){}", f.await_suffix).unwrap();
            writeln!(output, "    }}").unwrap();
            writeln!(output).unwrap();
            writeln!(
                output,
                "    /// Updates the named fields with one read-modify-write."
            )
            .unwrap();
            writeln!(
                output,
                "    pub {}fn write_fields(&self, args: &[(&str, FieldValue)]) -> RalResult<()> {{",
                f.fn_prefix
            )
            .unwrap();
            writeln!(output, "        self.reg.write_fields(args){}", f.await_suffix).unwrap();
            writeln!(output, "    }}").unwrap();
        }
        writeln!(output).unwrap();
        if f.is_async() {
            writeln!(
                output,
                "    pub async fn cached(&self, options: CacheOptions) -> RalResult<AsyncCachedRegister> {{"
            )
            .unwrap();
            writeln!(output, "        self.reg.cached(options).await").unwrap();
            writeln!(output, "    }}").unwrap();
        } else {
            writeln!(output, "    pub fn with_cached<T>(").unwrap();
            writeln!(output, "        &self,").unwrap();
            writeln!(output, "        options: CacheOptions,").unwrap();
            writeln!(
                output,
                "        f: impl FnOnce(&mut CachedRegister) -> RalResult<T>,"
            )
            .unwrap();
            writeln!(output, "    ) -> RalResult<T> {{").unwrap();
            writeln!(output, "        self.reg.with_cached(options, f)").unwrap();
            writeln!(output, "    }}").unwrap();
        }

        for (index, (child, accessor)) in fields.iter().enumerate() {
            let field = self.world.node(*child);
            writeln!(output).unwrap();
            self.emit_docs(output, "    ", field);
            if self.plan.is_plain_field(*child) {
                writeln!(output, "    pub fn {accessor}(&self) -> {} {{", f.field).unwrap();
                writeln!(output, "        self.reg.field_at({index})").unwrap();
            } else {
                let class = self.class(*child)?;
                writeln!(output, "    pub fn {accessor}(&self) -> {} {{", class.ident).unwrap();
                writeln!(output, "        {}(self.reg.field_at({index}))", class.ident).unwrap();
            }
            writeln!(output, "    }}").unwrap();
        }
        writeln!(output, "}}").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "impl {} for {ident} {{", f.from_register).unwrap();
        writeln!(output, "    fn from_register(reg: {}) -> Self {{", f.register).unwrap();
        writeln!(output, "        Self {{ reg }}").unwrap();
        writeln!(output, "    }}").unwrap();
        writeln!(output, "}}").unwrap();
        Ok(())
    }

    /// Field declaration, constructor expression and accessor return type
    /// for one child of a container or memory.
    fn child_parts(&self, child: NodeIdx) -> GeneratorResult<(String, String)> {
        let f = self.flavor;
        let node = self.world.node(child);
        let class = self.class(child)?;
        let path = format!("&format!(\"{{name}}.{}\")", node.inst_name);
        let address = offset_expr("address", node.address_offset);
        Ok(match (&node.array, node.kind) {
            (None, _) => (
                class.ident.clone(),
                format!("{}::new({path}, {address}, callbacks.clone())?", class.ident),
            ),
            (Some(array), NodeKind::Reg) => (
                format!("{}<{}>", f.typed_array, class.ident),
                format!(
                    "{}::new({}::new({}::layout({path}, {address})?, vec!{:?}, {}, callbacks.clone()))",
                    f.typed_array,
                    f.register_array,
                    class.ident,
                    array.dimensions,
                    hex_const(array.stride)
                ),
            ),
            (Some(array), _) => (
                format!("NodeArray<{}>", class.ident),
                format!(
                    "NodeArray::try_from_fn(vec!{:?}, |flat, index| {{\n                {}::new(\n                    &format!(\"{{name}}.{}{{}}\", index_suffix(index)),\n                    {} + flat as u64 * {},\n                    callbacks.clone(),\n                )\n            }})?",
                    array.dimensions,
                    class.ident,
                    node.inst_name,
                    address,
                    hex_const(array.stride)
                ),
            ),
        })
    }

    fn emit_children(
        &self,
        output: &mut String,
        children: &[(NodeIdx, String)],
    ) -> GeneratorResult<()> {
        for (child, accessor) in children {
            let (ty, _) = self.child_parts(*child)?;
            writeln!(output).unwrap();
            self.emit_docs(output, "    ", self.world.node(*child));
            writeln!(output, "    pub fn {accessor}(&self) -> &{ty} {{").unwrap();
            writeln!(output, "        &self.{accessor}").unwrap();
            writeln!(output, "    }}").unwrap();
        }
        Ok(())
    }

    fn emit_container(
        &self,
        output: &mut String,
        record: &UniqueRecord,
        node: &Node,
    ) -> GeneratorResult<()> {
        let f = self.flavor;
        let ident = &record.ident;
        let children = self.plan.children(record.node);

        self.emit_docs(output, "", node);
        writeln!(output, "pub struct {ident} {{").unwrap();
        writeln!(output, "    name: String,").unwrap();
        writeln!(output, "    address: u64,").unwrap();
        for (child, accessor) in children {
            let (ty, _) = self.child_parts(*child)?;
            writeln!(output, "    {accessor}: {ty},").unwrap();
        }
        writeln!(output, "}}").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "impl {ident} {{").unwrap();
        self.emit_properties(output, node);
        writeln!(
            output,
            "    pub fn new(name: &str, address: u64, callbacks: Arc<dyn {}>) -> RalResult<Self> {{",
            f.callbacks
        )
        .unwrap();
        writeln!(output, "        Ok(Self {{").unwrap();
        for (child, accessor) in children {
            let (_, ctor) = self.child_parts(*child)?;
            writeln!(output, "            {accessor}: {ctor},").unwrap();
        }
        writeln!(output, "            name: name.to_string(),").unwrap();
        writeln!(output, "            address,").unwrap();
        writeln!(output, "        }})").unwrap();
        writeln!(output, "    }}").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "    pub fn name(&self) -> &str {{").unwrap();
        writeln!(output, "        &self.name").unwrap();
        writeln!(output, "    }}").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "    pub fn address(&self) -> u64 {{").unwrap();
        writeln!(output, "        self.address").unwrap();
        writeln!(output, "    }}").unwrap();
        self.emit_children(output, children)?;
        writeln!(output, "}}").unwrap();
        Ok(())
    }

    fn emit_memory(
        &self,
        output: &mut String,
        record: &UniqueRecord,
        node: &Node,
    ) -> GeneratorResult<()> {
        let f = self.flavor;
        let ident = &record.ident;
        let mem = node.as_mem().ok_or_else(|| GeneratorError::UnsupportedKind {
            path: self.world.path(record.node),
            kind: node.kind,
        })?;
        let children = self.plan.children(record.node);
        let (block_ty, block_arg, read_call, write_call) = if self.legacy_block_access {
            ("TypedBuffer", "&TypedBuffer", "read_typed", "write_typed")
        } else {
            ("Vec<u128>", "&[u128]", "read", "write")
        };

        self.emit_docs(output, "", node);
        writeln!(output, "pub struct {ident} {{").unwrap();
        writeln!(output, "    mem: {},", f.memory).unwrap();
        for (child, accessor) in children {
            let (ty, _) = self.child_parts(*child)?;
            writeln!(output, "    {accessor}: {ty},").unwrap();
        }
        writeln!(output, "}}").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "impl {ident} {{").unwrap();
        self.emit_properties(output, node);
        writeln!(
            output,
            "    pub fn new(name: &str, address: u64, callbacks: Arc<dyn {}>) -> RalResult<Self> {{",
            f.callbacks
        )
        .unwrap();
        writeln!(output, "        let spec = MemorySpec {{").unwrap();
        writeln!(output, "            name: name.to_string(),").unwrap();
        writeln!(output, "            address,").unwrap();
        writeln!(output, "            entries: {},", hex_const(mem.mementries)).unwrap();
        writeln!(output, "            width: {},", mem.memwidth).unwrap();
        writeln!(output, "            accesswidth: {},", mem.accesswidth).unwrap();
        writeln!(output, "            access: {},", access_variant(mem.sw)).unwrap();
        writeln!(output, "        }};").unwrap();
        writeln!(output, "        Ok(Self {{").unwrap();
        for (child, accessor) in children {
            let (_, ctor) = self.child_parts(*child)?;
            writeln!(output, "            {accessor}: {ctor},").unwrap();
        }
        writeln!(
            output,
            "            mem: {}::new(spec, callbacks),",
            f.memory
        )
        .unwrap();
        writeln!(output, "        }})").unwrap();
        writeln!(output, "    }}").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "    pub fn memory(&self) -> &{} {{", f.memory).unwrap();
        writeln!(output, "        &self.mem").unwrap();
        writeln!(output, "    }}").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "    pub fn entries(&self) -> u64 {{").unwrap();
        writeln!(output, "        self.mem.entries()").unwrap();
        writeln!(output, "    }}").unwrap();
        if mem.sw.readable() {
            writeln!(output).unwrap();
            writeln!(
                output,
                "    pub {}fn read(&self, start: u64, count: usize) -> RalResult<{block_ty}> {{",
                f.fn_prefix
            )
            .unwrap();
            writeln!(output, "        self.mem.{read_call}(start, count){}", f.await_suffix).unwrap();
            writeln!(output, "    }}").unwrap();
            writeln!(output).unwrap();
            writeln!(
                output,
                "    pub {}fn read_entry(&self, index: u64) -> RalResult<u128> {{",
                f.fn_prefix
            )
            .unwrap();
            writeln!(output, "        self.mem.read_entry(index){}", f.await_suffix).unwrap();
            writeln!(output, "    }}").unwrap();
        }
        if mem.sw.writable() {
            writeln!(output).unwrap();
            writeln!(
                output,
                "    pub {}fn write(&self, start: u64, data: {block_arg}) -> RalResult<()> {{",
                f.fn_prefix
            )
            .unwrap();
            writeln!(output, "        self.mem.{write_call}(start, data){}", f.await_suffix).unwrap();
            writeln!(output, "    }}").unwrap();
            writeln!(output).unwrap();
            writeln!(
                output,
                "    pub {}fn write_entry(&self, index: u64, value: u128) -> RalResult<()> {{",
                f.fn_prefix
            )
            .unwrap();
            writeln!(output, "        self.mem.write_entry(index, value){}", f.await_suffix).unwrap();
            writeln!(output, "    }}").unwrap();
        }
        writeln!(output).unwrap();
        if f.is_async() {
            writeln!(output, "    pub async fn cached(").unwrap();
            writeln!(output, "        &self,").unwrap();
            writeln!(output, "        options: CacheOptions,").unwrap();
            writeln!(output, "        start: u64,").unwrap();
            writeln!(output, "        count: usize,").unwrap();
            writeln!(output, "    ) -> RalResult<AsyncCachedMemory> {{").unwrap();
            writeln!(output, "        self.mem.cached(options, start, count).await").unwrap();
            writeln!(output, "    }}").unwrap();
        } else {
            writeln!(output, "    pub fn with_cached<T>(").unwrap();
            writeln!(output, "        &self,").unwrap();
            writeln!(output, "        options: CacheOptions,").unwrap();
            writeln!(output, "        start: u64,").unwrap();
            writeln!(output, "        count: usize,").unwrap();
            writeln!(output, "        f: impl FnOnce(&mut [u128]) -> RalResult<T>,").unwrap();
            writeln!(output, "    ) -> RalResult<T> {{").unwrap();
            writeln!(output, "        self.mem.with_cached(options, start, count, f)").unwrap();
            writeln!(output, "    }}").unwrap();
        }
        self.emit_children(output, children)?;
        writeln!(output, "}}").unwrap();
        Ok(())
    }
}
