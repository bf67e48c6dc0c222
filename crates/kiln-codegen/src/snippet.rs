//! The [`Snippet`] trait and the basic snippet kinds.
//!
//! Snippets render without leading indentation; the container indents
//! the ones placed inside the entry point.

use indexmap::IndexMap;
use kiln_core::{DType, PoolBytes, TensorDescriptor};
use kiln_runtime::{Declaration, TensorDeclaration};

use crate::container::check_identifier;
use crate::error::CodegenError;
use crate::ir::PoolBindings;

/// A fragment of emitted code.
pub trait Snippet {
    /// Render the fragment.
    fn render(&self, pools: &PoolBindings) -> Result<String, CodegenError>;

    /// File-scope declarations this fragment depends on, emitted after
    /// the global declarations.
    fn declaration(&self, _pools: &PoolBindings) -> Result<Option<String>, CodegenError> {
        Ok(None)
    }

    /// Bytes this fragment binds in each arena when it runs.
    fn footprint(&self) -> PoolBytes {
        PoolBytes::ZERO
    }

    /// Names this fragment defines.
    fn symbols(&self) -> Vec<&str> {
        Vec::new()
    }
}

/// Tensor element type name used by the emitted tensor constructors.
pub(crate) fn tensor_dtype(dtype: DType) -> &'static str {
    match dtype {
        DType::U8 => "u8",
        DType::I8 => "i8",
        DType::I16 => "i16",
        DType::I32 => "i32",
        DType::F32 => "flt",
    }
}

/// C++ scalar type used as an operator template argument.
pub(crate) fn cpp_type(dtype: DType) -> &'static str {
    match dtype {
        DType::U8 => "uint8_t",
        DType::I8 => "int8_t",
        DType::I16 => "int16_t",
        DType::I32 => "int32_t",
        DType::F32 => "float",
    }
}

// ── Raw ────────────────────────────────────────────────────────────

/// Verbatim text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawSnippet {
    text: String,
}

impl RawSnippet {
    /// Wrap `text` unchanged.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Snippet for RawSnippet {
    fn render(&self, _pools: &PoolBindings) -> Result<String, CodegenError> {
        Ok(self.text.clone())
    }
}

// ── Ram tensor ─────────────────────────────────────────────────────

/// A tensor allocated from the installed arenas at entry.
///
/// Its footprint matches the runtime's [`TensorDeclaration`]: payload in
/// the ram pool, descriptor record in the metadata pool.
#[derive(Clone, Debug)]
pub struct RamTensorSnippet {
    var: String,
    declaration: TensorDeclaration,
}

impl RamTensorSnippet {
    /// Declare tensor variable `var` with the given descriptor.
    pub fn new(var: impl Into<String>, descriptor: TensorDescriptor) -> Self {
        let var = var.into();
        Self {
            declaration: TensorDeclaration::new(var.clone(), descriptor),
            var,
        }
    }
}

impl Snippet for RamTensorSnippet {
    fn render(&self, _pools: &PoolBindings) -> Result<String, CodegenError> {
        check_identifier(&self.var)?;
        let desc = self.declaration.descriptor();
        let dims: Vec<String> = desc.shape.iter().map(|d| d.to_string()).collect();
        Ok(format!(
            "Tensor {} = new RamTensor({{ {} }}, {});",
            self.var,
            dims.join(", "),
            tensor_dtype(desc.dtype)
        ))
    }

    fn footprint(&self) -> PoolBytes {
        self.declaration.footprint()
    }

    fn symbols(&self) -> Vec<&str> {
        vec![self.var.as_str()]
    }
}

// ── Operator ───────────────────────────────────────────────────────

/// A generic operator evaluation: optional `<var>_params.<key> = <value>;`
/// lines followed by the `set_inputs`/`set_outputs`/`eval` chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpSnippet {
    var: String,
    params_var: String,
    class: String,
    inputs: Vec<(String, String)>,
    outputs: Vec<(String, String)>,
    params: IndexMap<String, String>,
    params_class: Option<String>,
}

impl OpSnippet {
    /// Operator variable `var` of C++ type `class`.
    pub fn new(var: impl Into<String>, class: impl Into<String>) -> Self {
        let var = var.into();
        Self {
            params_var: format!("{var}_params"),
            var,
            class: class.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            params: IndexMap::new(),
            params_class: None,
        }
    }

    /// Append `(slot, tensor variable)` inputs.
    pub fn inputs(mut self, inputs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    /// Append `(slot, tensor variable)` outputs.
    pub fn outputs(mut self, outputs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.outputs.extend(outputs);
        self
    }

    /// Set a parameter; the operator is then constructed from a
    /// `<class>::Params <var>_params` object.
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self.params_class
            .get_or_insert_with(|| format!("{}::Params", self.class));
        self
    }

    /// The operator variable.
    pub fn var(&self) -> &str {
        &self.var
    }
}

impl Snippet for OpSnippet {
    fn render(&self, _pools: &PoolBindings) -> Result<String, CodegenError> {
        check_identifier(&self.var)?;
        let mut out = String::new();
        for (key, value) in &self.params {
            check_identifier(key)?;
            out.push_str(&format!("{}.{key} = {value};\n", self.params_var));
        }
        out.push_str(&self.var);
        out.push_str("\n    .set_inputs({\n");
        for (slot, tensor) in &self.inputs {
            check_identifier(slot)?;
            check_identifier(tensor)?;
            out.push_str(&format!("        {{ {}::{slot}, {tensor} }},\n", self.class));
        }
        out.push_str("    })\n    .set_outputs({\n");
        for (i, (slot, tensor)) in self.outputs.iter().enumerate() {
            check_identifier(slot)?;
            check_identifier(tensor)?;
            let sep = if i + 1 < self.outputs.len() { "," } else { "" };
            out.push_str(&format!("        {{ {}::{slot}, {tensor}}}{sep}\n", self.class));
        }
        out.push_str("    })\n    .eval();");
        Ok(out)
    }

    fn declaration(&self, _pools: &PoolBindings) -> Result<Option<String>, CodegenError> {
        check_identifier(&self.var)?;
        Ok(Some(match &self.params_class {
            Some(params_class) => format!(
                "{params_class} {params};\n{} {}({params});",
                self.class,
                self.var,
                params = self.params_var
            ),
            None => format!("{} {};", self.class, self.var),
        }))
    }

    fn symbols(&self) -> Vec<&str> {
        let mut names = vec![self.var.as_str()];
        if self.params_class.is_some() {
            names.push(self.params_var.as_str());
        }
        names
    }
}
