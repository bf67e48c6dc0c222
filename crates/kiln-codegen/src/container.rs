//! Container rendering: one translation unit per model.

use indexmap::IndexSet;
use kiln_core::{PoolBytes, PoolKind};

use crate::error::CodegenError;
use crate::ir::ModelIr;

/// Check that `name` is a C identifier: an ASCII letter or underscore
/// followed by ASCII letters, digits or underscores.
pub fn check_identifier(name: &str) -> Result<(), CodegenError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(CodegenError::InvalidIdentifier {
            name: name.to_owned(),
        })
    }
}

fn push_indented(out: &mut String, text: &str) {
    for line in text.lines() {
        if !line.is_empty() {
            out.push_str("    ");
            out.push_str(line);
        }
        out.push('\n');
    }
}

fn check_symbols(ir: &ModelIr) -> Result<(), CodegenError> {
    let mut seen: IndexSet<&str> = IndexSet::new();
    let names = [ir.pools.metadata.as_str(), ir.pools.ram.as_str()]
        .into_iter()
        .chain(ir.placeholders.iter().map(String::as_str))
        .chain(ir.outputs.iter().map(String::as_str));
    let snippet_symbols = ir
        .global_declarations
        .iter()
        .chain(&ir.local_declarations)
        .chain(&ir.evaluations)
        .flat_map(|s| s.symbols());
    for name in names.chain(snippet_symbols) {
        check_identifier(name)?;
        if !seen.insert(name) {
            return Err(CodegenError::DuplicateSymbol {
                name: name.to_owned(),
            });
        }
    }
    Ok(())
}

/// Bytes the entry point binds: every local declaration plus the
/// largest single evaluation.
fn required_bytes(ir: &ModelIr) -> PoolBytes {
    let declared = ir
        .local_declarations
        .iter()
        .fold(PoolBytes::ZERO, |acc, s| acc.saturating_add(s.footprint()));
    let scratch = ir
        .evaluations
        .iter()
        .fold(PoolBytes::ZERO, |acc, s| acc.max(s.footprint()));
    declared.saturating_add(scratch)
}

/// Render the translation unit for `ir`.
///
/// The output declares two statically sized circular arenas, the global
/// declarations (including each evaluation's operator declaration), and
/// a `compute_<model>` entry point that installs the arenas, runs the
/// local declarations and evaluations in order, followed by any output
/// quantization parameters.
///
/// # Errors
///
/// - [`CodegenError::InvalidIdentifier`] for a model, tensor or
///   variable name that is not a C identifier.
/// - [`CodegenError::DuplicateSymbol`] if two definitions share a name.
/// - [`CodegenError::Capacities`] for invalid pool capacities.
/// - [`CodegenError::FootprintExceedsPool`] if the local declarations
///   and largest evaluation do not fit the arenas.
/// - [`CodegenError::NonFiniteScale`] if an output's quantization scale
///   would not print as a C++ literal.
pub fn render_container(ir: &ModelIr) -> Result<String, CodegenError> {
    check_identifier(&ir.model_name)?;
    ir.capacities.validate()?;
    check_symbols(ir)?;
    for var in &ir.outputs {
        if let Some(q) = ir.quantize_params.get(var) {
            if !q.scale.is_finite() {
                return Err(CodegenError::NonFiniteScale { var: var.clone() });
            }
        }
    }

    let required = required_bytes(ir);
    for pool in PoolKind::ALL {
        let capacity = ir.capacities.for_pool(pool);
        if required.get(pool) > capacity {
            return Err(CodegenError::FootprintExceedsPool {
                pool,
                required: required.get(pool),
                capacity,
            });
        }
    }

    let pools = &ir.pools;
    let mut out = String::new();

    out.push_str("using namespace uTensor;\n\n");
    out.push_str(&format!(
        "static localCircularArenaAllocator<{}> {};\n",
        ir.capacities.metadata, pools.metadata
    ));
    out.push_str(&format!(
        "static localCircularArenaAllocator<{}> {};\n\n",
        ir.capacities.ram, pools.ram
    ));

    out.push_str("// start rendering global declare snippets\n");
    for snippet in &ir.global_declarations {
        out.push_str(&snippet.render(pools)?);
        out.push('\n');
    }
    for snippet in &ir.evaluations {
        if let Some(decl) = snippet.declaration(pools)? {
            out.push_str(&decl);
            out.push('\n');
        }
    }
    out.push_str("// end of rendering global declare snippets\n\n");

    let params: Vec<String> = ir
        .placeholders
        .iter()
        .chain(&ir.outputs)
        .map(|t| format!("Tensor& {t}"))
        .collect();
    out.push_str(&format!(
        "void compute_{}({}){{\n",
        ir.model_name,
        params.join(", ")
    ));
    out.push_str(&format!(
        "    Context::get_default_context()->set_metadata_allocator(&{});\n",
        pools.metadata
    ));
    out.push_str(&format!(
        "    Context::get_default_context()->set_ram_data_allocator(&{});\n",
        pools.ram
    ));

    out.push_str("    // start rendering local declare snippets\n");
    for snippet in &ir.local_declarations {
        push_indented(&mut out, &snippet.render(pools)?);
    }
    out.push_str("    // end of rendering local declare snippets\n");

    out.push_str("    // start rendering eval snippets\n");
    for (i, snippet) in ir.evaluations.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        push_indented(&mut out, &snippet.render(pools)?);
    }
    out.push_str("    // end of rendering eval snippets\n");
    out.push_str("}\n");

    for var in &ir.outputs {
        if let Some(q) = ir.quantize_params.get(var) {
            out.push_str(&format!("{var}_zp = {};\n", q.zero_point));
            out.push_str(&format!("{var}_scale = {};\n", q.scale));
        }
    }

    tracing::debug!(
        model = %ir.model_name,
        metadata_required = required.metadata,
        ram_required = required.ram,
        bytes = out.len(),
        "rendered container"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::QuantizeParams;
    use crate::snippet::{OpSnippet, RawSnippet};
    use kiln_arena::PoolCapacities;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn c_identifiers_accepted(name in "[A-Za-z_][A-Za-z0-9_]{0,24}") {
            prop_assert_eq!(check_identifier(&name), Ok(()));
        }

        #[test]
        fn leading_digit_rejected(name in "[0-9][A-Za-z0-9_]{0,24}") {
            prop_assert!(check_identifier(&name).is_err());
        }

        #[test]
        fn punctuation_rejected(prefix in "[a-z]{1,8}", sep in "[-. +:]", suffix in "[a-z]{0,8}") {
            let name = format!("{prefix}{sep}{suffix}");
            prop_assert!(check_identifier(&name).is_err());
        }
    }

    #[test]
    fn identifiers() {
        for ok in ["x", "_x", "conv2d_1", "X9"] {
            assert_eq!(check_identifier(ok), Ok(()));
        }
        for bad in ["", "9x", "a-b", "a b", "ü"] {
            assert!(check_identifier(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn minimal_container_layout() {
        let mut ir = ModelIr::new("tiny", PoolCapacities::new(64, 256));
        ir.placeholders.push("in0".into());
        ir.outputs.push("out0".into());
        ir.evaluations.push(Box::new(RawSnippet::new("out0 = in0;")));

        let text = render_container(&ir).unwrap();
        let expected = "\
using namespace uTensor;

static localCircularArenaAllocator<64> meta_allocator;
static localCircularArenaAllocator<256> ram_allocator;

// start rendering global declare snippets
// end of rendering global declare snippets

void compute_tiny(Tensor& in0, Tensor& out0){
    Context::get_default_context()->set_metadata_allocator(&meta_allocator);
    Context::get_default_context()->set_ram_data_allocator(&ram_allocator);
    // start rendering local declare snippets
    // end of rendering local declare snippets
    // start rendering eval snippets
    out0 = in0;
    // end of rendering eval snippets
}
";
        assert_eq!(text, expected);
    }

    #[test]
    fn duplicate_symbols_rejected() {
        let mut ir = ModelIr::new("m", PoolCapacities::new(64, 64));
        ir.placeholders.push("t".into());
        ir.outputs.push("t".into());
        assert_eq!(
            render_container(&ir),
            Err(CodegenError::DuplicateSymbol { name: "t".into() })
        );
    }

    #[test]
    fn invalid_model_name_rejected() {
        let ir = ModelIr::new("my-model", PoolCapacities::new(64, 64));
        assert_eq!(
            render_container(&ir),
            Err(CodegenError::InvalidIdentifier {
                name: "my-model".into()
            })
        );
    }

    #[test]
    fn zero_capacity_rejected() {
        let ir = ModelIr::new("m", PoolCapacities::new(0, 64));
        assert!(matches!(
            render_container(&ir),
            Err(CodegenError::Capacities(_))
        ));
    }

    #[test]
    fn params_object_clashing_with_tensor_is_rejected() {
        let mut ir = ModelIr::new("m", PoolCapacities::new(64, 64));
        ir.placeholders.push("conv_params".into());
        ir.evaluations
            .push(Box::new(OpSnippet::new("conv", "Conv").param("stride", 1)));
        assert_eq!(
            render_container(&ir),
            Err(CodegenError::DuplicateSymbol {
                name: "conv_params".into()
            })
        );
    }

    #[test]
    fn non_finite_scale_rejected() {
        for scale in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let mut ir = ModelIr::new("m", PoolCapacities::new(64, 64));
            ir.outputs.push("out0".into());
            ir.quantize_params
                .insert("out0".into(), QuantizeParams { zero_point: 0, scale });
            assert_eq!(
                render_container(&ir),
                Err(CodegenError::NonFiniteScale { var: "out0".into() })
            );
        }
    }
}
