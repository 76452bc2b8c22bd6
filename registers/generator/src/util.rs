// Licensed under the Apache-2.0 license

//! Name conversion and literal formatting for emitted Rust source.

/// Converts a name to snake_case.
///
/// - Leading digits get an underscore prefix
/// - Punctuation and whitespace become underscores
/// - CamelCase transitions get underscore separators
/// - Rust keywords get an underscore suffix
///
/// # Examples
/// ```
/// use ral_generator::util::snake_case;
/// assert_eq!(snake_case("MyRegister"), "my_register");
/// assert_eq!(snake_case("ctrl.status"), "ctrl_status");
/// ```
pub fn snake_case(name: &str) -> String {
    let mut result = String::new();
    if let Some(c) = name.chars().next() {
        if c.is_ascii_digit() {
            result.push('_');
        }
    }
    let mut prev = None;
    for c in name.chars() {
        if c.is_ascii_whitespace() || c.is_ascii_punctuation() {
            if prev != Some('_') {
                result.push('_');
            }
            prev = Some('_');
            continue;
        }
        if let Some(prev) = prev {
            if prev.is_ascii_lowercase() && c.is_ascii_uppercase() {
                result.push('_');
            }
        }
        prev = Some(c);
        result.push(c.to_ascii_lowercase());
    }
    let trimmed = result.trim_end_matches('_');
    if trimmed.is_empty() {
        return "_".to_string();
    }
    tweak_keywords(trimmed).to_string()
}

/// Converts a name to CamelCase.
///
/// # Examples
/// ```
/// use ral_generator::util::camel_case;
/// assert_eq!(camel_case("top_reg_a_t_3fa"), "TopRegAT3fa");
/// assert_eq!(camel_case("i3c_ctrl"), "I3cCtrl");
/// ```
pub fn camel_case(name: &str) -> String {
    let mut result = String::new();
    if let Some(c) = name.chars().next() {
        if c.is_ascii_digit() {
            result.push('_');
        }
    }
    let mut upper_next = true;
    for c in name.chars() {
        if c.is_ascii_punctuation() || c.is_ascii_whitespace() {
            upper_next = true;
        } else {
            result.push(if upper_next {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            });
            upper_next = false;
        }
    }
    String::from(tweak_keywords(&result))
}

/// Appends an underscore to Rust keywords.
pub fn tweak_keywords(s: &str) -> &str {
    match s {
        "as" => "as_",
        "break" => "break_",
        "const" => "const_",
        "continue" => "continue_",
        "crate" => "crate_",
        "else" => "else_",
        "enum" => "enum_",
        "extern" => "extern_",
        "false" => "false_",
        "fn" => "fn_",
        "for" => "for_",
        "if" => "if_",
        "impl" => "impl_",
        "in" => "in_",
        "let" => "let_",
        "loop" => "loop_",
        "match" => "match_",
        "mod" => "mod_",
        "move" => "move_",
        "mut" => "mut_",
        "pub" => "pub_",
        "ref" => "ref_",
        "return" => "return_",
        "self" => "self_",
        "Self" => "Self_",
        "static" => "static_",
        "struct" => "struct_",
        "super" => "super_",
        "trait" => "trait_",
        "true" => "true_",
        "type" => "type_",
        "unsafe" => "unsafe_",
        "use" => "use_",
        "where" => "where_",
        "while" => "while_",
        "async" => "async_",
        "await" => "await_",
        "dyn" => "dyn_",
        "abstract" => "abstract_",
        "become" => "become_",
        "box" => "box_",
        "do" => "do_",
        "final" => "final_",
        "macro" => "macro_",
        "override" => "override_",
        "priv" => "priv_",
        "try" => "try_",
        "typeof" => "typeof_",
        "unsized" => "unsized_",
        "virtual" => "virtual_",
        "yield" => "yield_",
        s => s,
    }
}

/// Formats an integer as a hex constant with underscores for readability.
///
/// # Examples
/// ```
/// use ral_generator::util::hex_const;
/// assert_eq!(hex_const(5), "5");
/// assert_eq!(hex_const(0x12345678), "0x1234_5678");
/// ```
pub fn hex_const(val: u64) -> String {
    hex_const_wide(val.into())
}

/// [`hex_const`] for register and memory values wider than 64 bits.
pub fn hex_const_wide(val: u128) -> String {
    if val > 9 {
        let mut x = String::new();
        for (i, c) in format!("{val:x}").chars().rev().enumerate() {
            if i % 4 == 0 && i != 0 {
                x.push('_');
            }
            x.push(c);
        }
        "0x".to_string() + &x.chars().rev().collect::<String>()
    } else {
        format!("{val}")
    }
}

/// Doc comment lines for an optional name and description.
pub fn doc_lines(indent: &str, name: Option<&str>, desc: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(name) = name {
        out.push_str(&format!("{indent}/// {}\n", name.trim()));
    }
    if let Some(desc) = desc {
        if name.is_some() {
            out.push_str(&format!("{indent}///\n"));
        }
        for line in desc.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                out.push_str(&format!("{indent}///\n"));
            } else {
                out.push_str(&format!("{indent}/// {line}\n"));
            }
        }
    }
    out
}
