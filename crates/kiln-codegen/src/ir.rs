//! The intermediate representation consumed by the container renderer.

use std::fmt;

use indexmap::IndexMap;
use kiln_arena::PoolCapacities;
use kiln_core::DType;

use crate::error::CodegenError;
use crate::snippet::Snippet;

/// An operator attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    /// Integer scalar.
    Int(i64),
    /// Float scalar.
    Float(f32),
    /// String or enum name.
    Str(String),
    /// Integer list.
    Ints(Vec<i64>),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
            Self::Ints(vs) => {
                f.write_str("{")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// One operator node of the source graph.
#[derive(Clone, Debug, PartialEq)]
pub struct OpInfo {
    /// Operator variable name in the emitted code.
    pub name: String,
    /// Source-graph operator type, the factory lookup key.
    pub op_type: String,
    /// Element type the operator is instantiated for.
    pub dtype: DType,
    /// `(slot, tensor variable)` inputs, in slot order.
    pub inputs: Vec<(String, String)>,
    /// `(slot, tensor variable)` outputs, in slot order.
    pub outputs: Vec<(String, String)>,
    /// Named attributes.
    pub attrs: IndexMap<String, AttrValue>,
}

impl OpInfo {
    /// An operator with no inputs, outputs or attributes.
    pub fn new(name: impl Into<String>, op_type: impl Into<String>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            op_type: op_type.into(),
            dtype,
            inputs: Vec::new(),
            outputs: Vec::new(),
            attrs: IndexMap::new(),
        }
    }

    /// Append an input.
    pub fn input(mut self, slot: impl Into<String>, tensor: impl Into<String>) -> Self {
        self.inputs.push((slot.into(), tensor.into()));
        self
    }

    /// Append an output.
    pub fn output(mut self, slot: impl Into<String>, tensor: impl Into<String>) -> Self {
        self.outputs.push((slot.into(), tensor.into()));
        self
    }

    /// Set an attribute.
    pub fn attr(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    /// A required attribute.
    pub fn require(&self, attr: &str) -> Result<&AttrValue, CodegenError> {
        self.attrs.get(attr).ok_or_else(|| CodegenError::MissingAttr {
            op: self.name.clone(),
            attr: attr.to_owned(),
        })
    }

    /// A required integer attribute.
    pub fn require_int(&self, attr: &str) -> Result<i64, CodegenError> {
        match self.require(attr)? {
            AttrValue::Int(v) => Ok(*v),
            other => Err(CodegenError::InvalidAttr {
                op: self.name.clone(),
                attr: attr.to_owned(),
                reason: format!("expected an integer, got {other}"),
            }),
        }
    }

    /// An optional integer attribute with a default.
    pub fn int_or(&self, attr: &str, default: i64) -> Result<i64, CodegenError> {
        if self.attrs.contains_key(attr) {
            self.require_int(attr)
        } else {
            Ok(default)
        }
    }
}

/// Quantization parameters of one output tensor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuantizeParams {
    /// Zero point.
    pub zero_point: i32,
    /// Scale.
    pub scale: f32,
}

/// Variable names the emitted code uses for the two arenas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolBindings {
    /// Metadata arena variable.
    pub metadata: String,
    /// Ram arena variable.
    pub ram: String,
}

impl PoolBindings {
    /// Default metadata arena variable name.
    pub const DEFAULT_METADATA: &'static str = "meta_allocator";
    /// Default ram arena variable name.
    pub const DEFAULT_RAM: &'static str = "ram_allocator";
}

impl Default for PoolBindings {
    fn default() -> Self {
        Self {
            metadata: Self::DEFAULT_METADATA.to_owned(),
            ram: Self::DEFAULT_RAM.to_owned(),
        }
    }
}

/// A model ready for container rendering.
pub struct ModelIr {
    /// Model name; the entry point is `compute_<model_name>`.
    pub model_name: String,
    /// Input tensor variables, in parameter order.
    pub placeholders: Vec<String>,
    /// Output tensor variables, in parameter order.
    pub outputs: Vec<String>,
    /// Capacity of each statically sized arena.
    pub capacities: PoolCapacities,
    /// Arena variable names.
    pub pools: PoolBindings,
    /// Snippets emitted at file scope (constant tensors, operators).
    pub global_declarations: Vec<Box<dyn Snippet>>,
    /// Snippets emitted at the top of the entry point (arena tensors).
    pub local_declarations: Vec<Box<dyn Snippet>>,
    /// Snippets emitted after the local declarations, in order.
    pub evaluations: Vec<Box<dyn Snippet>>,
    /// Quantization parameters keyed by output variable.
    pub quantize_params: IndexMap<String, QuantizeParams>,
}

impl ModelIr {
    /// An empty model with default arena variable names.
    pub fn new(model_name: impl Into<String>, capacities: PoolCapacities) -> Self {
        Self {
            model_name: model_name.into(),
            placeholders: Vec::new(),
            outputs: Vec::new(),
            capacities,
            pools: PoolBindings::default(),
            global_declarations: Vec::new(),
            local_declarations: Vec::new(),
            evaluations: Vec::new(),
            quantize_params: IndexMap::new(),
        }
    }
}

impl fmt::Debug for ModelIr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelIr")
            .field("model_name", &self.model_name)
            .field("placeholders", &self.placeholders)
            .field("outputs", &self.outputs)
            .field("capacities", &self.capacities)
            .field("global_declarations", &self.global_declarations.len())
            .field("local_declarations", &self.local_declarations.len())
            .field("evaluations", &self.evaluations.len())
            .field("quantize_params", &self.quantize_params)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attr_values_render_as_cpp_literals() {
        assert_eq!(AttrValue::Int(-3).to_string(), "-3");
        assert_eq!(AttrValue::Str("SAME".into()).to_string(), "SAME");
        assert_eq!(AttrValue::Ints(vec![1, 2, 2, 1]).to_string(), "{1, 2, 2, 1}");
    }

    #[test]
    fn int_attrs_are_type_checked() {
        let op = OpInfo::new("conv", "Conv", DType::I8)
            .attr("stride", AttrValue::Int(2))
            .attr("padding", AttrValue::Str("SAME".into()));
        assert_eq!(op.require_int("stride"), Ok(2));
        assert_eq!(op.int_or("dilation", 1), Ok(1));
        assert!(matches!(
            op.require_int("padding"),
            Err(CodegenError::InvalidAttr { .. })
        ));
        assert_eq!(
            op.require("missing"),
            Err(CodegenError::MissingAttr {
                op: "conv".into(),
                attr: "missing".into(),
            })
        );
    }
}
