//! Operator snippets and the [`OperatorFactory`] registry.

use std::fmt;

use indexmap::IndexMap;
use kiln_core::PoolBytes;

use crate::error::CodegenError;
use crate::ir::{AttrValue, OpInfo, PoolBindings};
use crate::snippet::{cpp_type, OpSnippet, Snippet};

/// Namespace of the reference operator implementations.
const OPERATOR_NAMESPACE: &str = "ReferenceOperators";

// ── Depthwise separable convolution ────────────────────────────────

/// Convolution padding mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Padding {
    /// Output has the same spatial size as the input.
    Same,
    /// No implicit padding.
    Valid,
}

impl Padding {
    /// Emitted constant.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Same => "kTfLitePaddingSame",
            Self::Valid => "kTfLitePaddingValid",
        }
    }

    /// Read the required `padding` attribute (`"SAME"` or `"VALID"`).
    pub fn from_op(op: &OpInfo) -> Result<Self, CodegenError> {
        match str_attr(op, "padding")? {
            Some(p) if p.eq_ignore_ascii_case("same") => Ok(Self::Same),
            Some(p) if p.eq_ignore_ascii_case("valid") => Ok(Self::Valid),
            Some(p) => Err(CodegenError::InvalidAttr {
                op: op.name.clone(),
                attr: "padding".into(),
                reason: format!("unknown mode {p}"),
            }),
            None => Err(CodegenError::MissingAttr {
                op: op.name.clone(),
                attr: "padding".into(),
            }),
        }
    }
}

/// Fused activation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    /// Identity.
    None,
    /// `max(0, x)`.
    Relu,
    /// `min(6, max(0, x))`.
    Relu6,
}

impl Activation {
    /// Emitted constant.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "kTfLiteActNone",
            Self::Relu => "kTfLiteActRelu",
            Self::Relu6 => "kTfLiteActRelu6",
        }
    }
}

/// Parameters of a depthwise separable convolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DwsConvParams {
    /// Padding mode.
    pub padding: Padding,
    /// Horizontal stride.
    pub stride_width: u32,
    /// Vertical stride.
    pub stride_height: u32,
    /// Output channels per input channel of the depthwise stage.
    pub depth_multiplier: u32,
    /// Fused activation.
    pub activation: Activation,
    /// Horizontal dilation.
    pub dilation_width_factor: u32,
    /// Vertical dilation.
    pub dilation_height_factor: u32,
}

impl Default for DwsConvParams {
    fn default() -> Self {
        Self {
            padding: Padding::Valid,
            stride_width: 1,
            stride_height: 1,
            depth_multiplier: 1,
            activation: Activation::None,
            dilation_width_factor: 1,
            dilation_height_factor: 1,
        }
    }
}

fn positive(op: &OpInfo, attr: &str, value: i64) -> Result<u32, CodegenError> {
    u32::try_from(value)
        .ok()
        .filter(|&v| v > 0)
        .ok_or_else(|| CodegenError::InvalidAttr {
            op: op.name.clone(),
            attr: attr.to_owned(),
            reason: format!("expected a positive integer, got {value}"),
        })
}

/// `(height, width)` from an NHWC-ordered four-element list.
fn nhwc_pair(op: &OpInfo, attr: &str) -> Result<Option<(u32, u32)>, CodegenError> {
    match op.attrs.get(attr) {
        None => Ok(None),
        Some(AttrValue::Ints(v)) if v.len() == 4 => Ok(Some((
            positive(op, attr, v[1])?,
            positive(op, attr, v[2])?,
        ))),
        Some(other) => Err(CodegenError::InvalidAttr {
            op: op.name.clone(),
            attr: attr.to_owned(),
            reason: format!("expected four integers, got {other}"),
        }),
    }
}

/// A required NHWC pair.
fn require_nhwc_pair(op: &OpInfo, attr: &str) -> Result<(u32, u32), CodegenError> {
    nhwc_pair(op, attr)?.ok_or_else(|| CodegenError::MissingAttr {
        op: op.name.clone(),
        attr: attr.to_owned(),
    })
}

fn str_attr<'o>(op: &'o OpInfo, attr: &str) -> Result<Option<&'o str>, CodegenError> {
    match op.attrs.get(attr) {
        None => Ok(None),
        Some(AttrValue::Str(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(CodegenError::InvalidAttr {
            op: op.name.clone(),
            attr: attr.to_owned(),
            reason: format!("expected a string, got {other}"),
        }),
    }
}

impl DwsConvParams {
    /// Read parameters from operator attributes.
    ///
    /// `padding` (`"SAME"`/`"VALID"`) is required. `strides` and
    /// `dilations` are NHWC lists, `depth_multiplier` an integer and
    /// `activation` one of `"NONE"`, `"RELU"`, `"RELU6"`; each defaults
    /// to the identity setting.
    pub fn from_op(op: &OpInfo) -> Result<Self, CodegenError> {
        let invalid = |attr: &str, reason: String| CodegenError::InvalidAttr {
            op: op.name.clone(),
            attr: attr.to_owned(),
            reason,
        };
        let padding = Padding::from_op(op)?;
        let activation = match str_attr(op, "activation")? {
            None => Activation::None,
            Some(a) if a.eq_ignore_ascii_case("none") => Activation::None,
            Some(a) if a.eq_ignore_ascii_case("relu") => Activation::Relu,
            Some(a) if a.eq_ignore_ascii_case("relu6") => Activation::Relu6,
            Some(a) => return Err(invalid("activation", format!("unknown activation {a}"))),
        };
        let (stride_height, stride_width) = nhwc_pair(op, "strides")?.unwrap_or((1, 1));
        let (dilation_height_factor, dilation_width_factor) =
            nhwc_pair(op, "dilations")?.unwrap_or((1, 1));
        let depth_multiplier = positive(op, "depth_multiplier", op.int_or("depth_multiplier", 1)?)?;
        Ok(Self {
            padding,
            stride_width,
            stride_height,
            depth_multiplier,
            activation,
            dilation_width_factor,
            dilation_height_factor,
        })
    }
}

/// Depthwise separable convolution: the generic operator chain preceded
/// by the seven convolution parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepthwiseSeparableConvSnippet {
    op: OpSnippet,
    params: DwsConvParams,
}

impl DepthwiseSeparableConvSnippet {
    /// Build from an operator record.
    pub fn from_op(op: &OpInfo) -> Result<Self, CodegenError> {
        let params = DwsConvParams::from_op(op)?;
        let class = format!(
            "{OPERATOR_NAMESPACE}::DepthwiseSeparableConvOperator<{}>",
            cpp_type(op.dtype)
        );
        let snippet = OpSnippet::new(op.name.clone(), class)
            .param("padding", params.padding.as_str())
            .param("stride_width", params.stride_width)
            .param("stride_height", params.stride_height)
            .param("depth_multiplier", params.depth_multiplier)
            .param("activation", params.activation.as_str())
            .param("dilation_width_factor", params.dilation_width_factor)
            .param("dilation_height_factor", params.dilation_height_factor)
            .inputs(op.inputs.iter().cloned())
            .outputs(op.outputs.iter().cloned());
        Ok(Self {
            op: snippet,
            params,
        })
    }

    /// The parsed parameters.
    pub fn params(&self) -> DwsConvParams {
        self.params
    }
}

impl Snippet for DepthwiseSeparableConvSnippet {
    fn render(&self, pools: &PoolBindings) -> Result<String, CodegenError> {
        self.op.render(pools)
    }

    fn declaration(&self, pools: &PoolBindings) -> Result<Option<String>, CodegenError> {
        self.op.declaration(pools)
    }

    fn footprint(&self) -> PoolBytes {
        self.op.footprint()
    }

    fn symbols(&self) -> Vec<&str> {
        self.op.symbols()
    }
}

// ── Factory ────────────────────────────────────────────────────────

/// Builds an evaluation snippet from an operator record.
pub type SnippetConstructor = fn(&OpInfo) -> Result<Box<dyn Snippet>, CodegenError>;

fn reference_snippet(op: &OpInfo, class: &str) -> OpSnippet {
    OpSnippet::new(
        op.name.clone(),
        format!("{OPERATOR_NAMESPACE}::{class}<{}>", cpp_type(op.dtype)),
    )
    .inputs(op.inputs.iter().cloned())
    .outputs(op.outputs.iter().cloned())
}

fn reference_op(op: &OpInfo, class: &str) -> Box<dyn Snippet> {
    Box::new(reference_snippet(op, class))
}

fn add(op: &OpInfo) -> Result<Box<dyn Snippet>, CodegenError> {
    Ok(reference_op(op, "AddOperator"))
}

fn arg_max(op: &OpInfo) -> Result<Box<dyn Snippet>, CodegenError> {
    Ok(reference_op(op, "ArgMaxOperator"))
}

fn dequantize(op: &OpInfo) -> Result<Box<dyn Snippet>, CodegenError> {
    Ok(reference_op(op, "DequantizeOperator"))
}

fn max(op: &OpInfo) -> Result<Box<dyn Snippet>, CodegenError> {
    Ok(reference_op(op, "MaxOperator"))
}

fn min(op: &OpInfo) -> Result<Box<dyn Snippet>, CodegenError> {
    Ok(reference_op(op, "MinOperator"))
}

fn mat_mul(op: &OpInfo) -> Result<Box<dyn Snippet>, CodegenError> {
    Ok(reference_op(op, "MatrixMultOperator"))
}

fn relu(op: &OpInfo) -> Result<Box<dyn Snippet>, CodegenError> {
    Ok(reference_op(op, "ReLUOperator"))
}

fn reshape(op: &OpInfo) -> Result<Box<dyn Snippet>, CodegenError> {
    Ok(reference_op(op, "ReshapeOperator"))
}

fn softmax(op: &OpInfo) -> Result<Box<dyn Snippet>, CodegenError> {
    Ok(reference_op(op, "SoftmaxOperator"))
}

// ── Quantized operators ────────────────────────────────────────────

fn quantize_v2(op: &OpInfo) -> Result<Box<dyn Snippet>, CodegenError> {
    Ok(reference_op(op, "QuantizeV2Operator"))
}

fn quantized_add(op: &OpInfo) -> Result<Box<dyn Snippet>, CodegenError> {
    Ok(reference_op(op, "QuantizedAddOperator"))
}

fn quantized_mat_mul(op: &OpInfo) -> Result<Box<dyn Snippet>, CodegenError> {
    Ok(reference_op(op, "QuantizedMatMulOperator"))
}

fn quantized_relu(op: &OpInfo) -> Result<Box<dyn Snippet>, CodegenError> {
    Ok(reference_op(op, "QuantizedReluOperator"))
}

fn quantized_reshape(op: &OpInfo) -> Result<Box<dyn Snippet>, CodegenError> {
    Ok(reference_op(op, "QuantizedReshapeOperator"))
}

fn requantization_range(op: &OpInfo) -> Result<Box<dyn Snippet>, CodegenError> {
    Ok(reference_op(op, "RequantizationRangeOperator"))
}

fn requantize(op: &OpInfo) -> Result<Box<dyn Snippet>, CodegenError> {
    Ok(reference_op(op, "RequantizeOperator"))
}

/// `ksize`, `strides` and `padding` are all required.
fn quantized_max_pool(op: &OpInfo) -> Result<Box<dyn Snippet>, CodegenError> {
    let (ksize_height, ksize_width) = require_nhwc_pair(op, "ksize")?;
    let (stride_height, stride_width) = require_nhwc_pair(op, "strides")?;
    let padding = Padding::from_op(op)?;
    Ok(Box::new(
        reference_snippet(op, "QuantizedMaxPoolOperator")
            .param("ksize_height", ksize_height)
            .param("ksize_width", ksize_width)
            .param("stride_height", stride_height)
            .param("stride_width", stride_width)
            .param("padding", padding.as_str()),
    ))
}

/// `strides` and `padding` are required.
fn quantized_conv(op: &OpInfo) -> Result<Box<dyn Snippet>, CodegenError> {
    let (stride_height, stride_width) = require_nhwc_pair(op, "strides")?;
    let padding = Padding::from_op(op)?;
    Ok(Box::new(
        reference_snippet(op, "QuantizedConv2DOperator")
            .param("stride_height", stride_height)
            .param("stride_width", stride_width)
            .param("padding", padding.as_str()),
    ))
}

fn dws_conv(op: &OpInfo) -> Result<Box<dyn Snippet>, CodegenError> {
    Ok(Box::new(DepthwiseSeparableConvSnippet::from_op(op)?))
}

/// Registry from source-graph operator type to snippet constructor.
#[derive(Clone)]
pub struct OperatorFactory {
    constructors: IndexMap<String, SnippetConstructor>,
}

impl OperatorFactory {
    /// A factory with no registered operators.
    pub fn empty() -> Self {
        Self {
            constructors: IndexMap::new(),
        }
    }

    /// A factory with the reference operators registered.
    pub fn new() -> Self {
        let mut factory = Self::empty();
        factory.register("Add", add);
        factory.register("ArgMax", arg_max);
        factory.register("DepthwiseSeparableConv2D", dws_conv);
        factory.register("Dequantize", dequantize);
        factory.register("MatMul", mat_mul);
        factory.register("Max", max);
        factory.register("Min", min);
        factory.register("QuantizeV2", quantize_v2);
        factory.register("QuantizedAdd", quantized_add);
        factory.register("QuantizedConv2D", quantized_conv);
        factory.register("QuantizedMatMul", quantized_mat_mul);
        factory.register("QuantizedMaxPool", quantized_max_pool);
        factory.register("QuantizedRelu", quantized_relu);
        factory.register("QuantizedReshape", quantized_reshape);
        factory.register("Relu", relu);
        factory.register("RequantizationRange", requantization_range);
        factory.register("Requantize", requantize);
        factory.register("Reshape", reshape);
        factory.register("Softmax", softmax);
        factory
    }

    /// Register `constructor` for `op_type`, returning any constructor it replaces.
    pub fn register(
        &mut self,
        op_type: impl Into<String>,
        constructor: SnippetConstructor,
    ) -> Option<SnippetConstructor> {
        self.constructors.insert(op_type.into(), constructor)
    }

    /// Whether `op_type` has a registered constructor.
    pub fn supports(&self, op_type: &str) -> bool {
        self.constructors.contains_key(op_type)
    }

    /// Registered operator types, in registration order.
    pub fn op_types(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Build the evaluation snippet for `op`.
    ///
    /// Fails with [`CodegenError::UnsupportedOp`] for unregistered types.
    pub fn create(&self, op: &OpInfo) -> Result<Box<dyn Snippet>, CodegenError> {
        let constructor =
            self.constructors
                .get(&op.op_type)
                .ok_or_else(|| CodegenError::UnsupportedOp {
                    op_type: op.op_type.clone(),
                })?;
        tracing::trace!(op = %op.name, op_type = %op.op_type, "creating snippet");
        constructor(op)
    }
}

impl fmt::Debug for OperatorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.op_types()).finish()
    }
}

impl Default for OperatorFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::DType;

    fn dws_op() -> OpInfo {
        OpInfo::new("dws", "DepthwiseSeparableConv2D", DType::F32)
            .input("in", "x")
            .input("depthwise_filter", "dw")
            .input("pointwise_filter", "pw")
            .output("out", "y")
            .attr("padding", AttrValue::Str("SAME".into()))
            .attr("strides", AttrValue::Ints(vec![1, 2, 3, 1]))
            .attr("activation", AttrValue::Str("relu6".into()))
    }

    #[test]
    fn dws_params_from_attrs() {
        let p = DwsConvParams::from_op(&dws_op()).unwrap();
        assert_eq!(
            p,
            DwsConvParams {
                padding: Padding::Same,
                stride_width: 3,
                stride_height: 2,
                depth_multiplier: 1,
                activation: Activation::Relu6,
                dilation_width_factor: 1,
                dilation_height_factor: 1,
            }
        );
    }

    #[test]
    fn dws_render_sets_params_in_order() {
        let snippet = OperatorFactory::new().create(&dws_op()).unwrap();
        let text = snippet.render(&PoolBindings::default()).unwrap();
        let lines: Vec<&str> = text.lines().take(7).collect();
        assert_eq!(
            lines,
            [
                "dws_params.padding = kTfLitePaddingSame;",
                "dws_params.stride_width = 3;",
                "dws_params.stride_height = 2;",
                "dws_params.depth_multiplier = 1;",
                "dws_params.activation = kTfLiteActRelu6;",
                "dws_params.dilation_width_factor = 1;",
                "dws_params.dilation_height_factor = 1;",
            ]
        );
        assert!(text.contains(
            "{ ReferenceOperators::DepthwiseSeparableConvOperator<float>::pointwise_filter, pw },"
        ));
        assert!(text.ends_with(".eval();"));
    }

    #[test]
    fn dws_requires_padding() {
        let mut op = dws_op();
        op.attrs.shift_remove("padding");
        assert_eq!(
            OperatorFactory::new().create(&op).err(),
            Some(CodegenError::MissingAttr {
                op: "dws".into(),
                attr: "padding".into(),
            })
        );
    }

    #[test]
    fn dws_rejects_zero_stride() {
        let op = dws_op().attr("strides", AttrValue::Ints(vec![1, 0, 1, 1]));
        assert!(matches!(
            DwsConvParams::from_op(&op),
            Err(CodegenError::InvalidAttr { ref attr, .. }) if attr == "strides"
        ));
    }

    #[test]
    fn unknown_op_type_is_unsupported() {
        let op = OpInfo::new("q", "FusedBatchNorm", DType::U8);
        assert_eq!(
            OperatorFactory::new().create(&op).err(),
            Some(CodegenError::UnsupportedOp {
                op_type: "FusedBatchNorm".into()
            })
        );
    }

    #[test]
    fn quantized_graph_op_types_are_registered() {
        let factory = OperatorFactory::new();
        for op_type in [
            "Add",
            "ArgMax",
            "Dequantize",
            "Max",
            "Min",
            "QuantizeV2",
            "QuantizedAdd",
            "QuantizedConv2D",
            "QuantizedMatMul",
            "QuantizedMaxPool",
            "QuantizedRelu",
            "QuantizedReshape",
            "RequantizationRange",
            "Requantize",
            "Reshape",
        ] {
            assert!(factory.supports(op_type), "{op_type}");
        }
    }

    #[test]
    fn dequantize_renders_reference_operator() {
        let op = OpInfo::new("deq", "Dequantize", DType::F32)
            .input("in", "q")
            .input("min", "q_min")
            .input("max", "q_max")
            .output("out", "x");
        let snippet = OperatorFactory::new().create(&op).unwrap();
        assert_eq!(
            snippet.declaration(&PoolBindings::default()).unwrap().as_deref(),
            Some("ReferenceOperators::DequantizeOperator<float> deq;")
        );
        let text = snippet.render(&PoolBindings::default()).unwrap();
        assert!(text.contains("{ ReferenceOperators::DequantizeOperator<float>::max, q_max },"));
    }

    #[test]
    fn quantized_max_pool_emits_window_params() {
        let op = OpInfo::new("pool", "QuantizedMaxPool", DType::U8)
            .input("in", "x")
            .output("out", "y")
            .attr("ksize", AttrValue::Ints(vec![1, 2, 3, 1]))
            .attr("strides", AttrValue::Ints(vec![1, 2, 2, 1]))
            .attr("padding", AttrValue::Str("VALID".into()));
        let text = OperatorFactory::new()
            .create(&op)
            .unwrap()
            .render(&PoolBindings::default())
            .unwrap();
        let lines: Vec<&str> = text.lines().take(5).collect();
        assert_eq!(
            lines,
            [
                "pool_params.ksize_height = 2;",
                "pool_params.ksize_width = 3;",
                "pool_params.stride_height = 2;",
                "pool_params.stride_width = 2;",
                "pool_params.padding = kTfLitePaddingValid;",
            ]
        );
    }

    #[test]
    fn quantized_max_pool_requires_ksize() {
        let op = OpInfo::new("pool", "QuantizedMaxPool", DType::U8)
            .attr("strides", AttrValue::Ints(vec![1, 2, 2, 1]))
            .attr("padding", AttrValue::Str("SAME".into()));
        assert_eq!(
            OperatorFactory::new().create(&op).err(),
            Some(CodegenError::MissingAttr {
                op: "pool".into(),
                attr: "ksize".into(),
            })
        );
    }

    #[test]
    fn quantized_conv_declares_params_object() {
        let op = OpInfo::new("conv", "QuantizedConv2D", DType::U8)
            .input("in", "x")
            .input("filter", "w")
            .output("out", "y")
            .attr("strides", AttrValue::Ints(vec![1, 1, 1, 1]))
            .attr("padding", AttrValue::Str("SAME".into()));
        let snippet = OperatorFactory::new().create(&op).unwrap();
        let class = "ReferenceOperators::QuantizedConv2DOperator<uint8_t>";
        assert_eq!(
            snippet.declaration(&PoolBindings::default()).unwrap(),
            Some(format!("{class}::Params conv_params;\n{class} conv(conv_params);"))
        );
        assert!(snippet
            .render(&PoolBindings::default())
            .unwrap()
            .starts_with("conv_params.stride_height = 1;\n"));
    }

    #[test]
    fn custom_constructors_can_be_registered() {
        fn custom(op: &OpInfo) -> Result<Box<dyn Snippet>, CodegenError> {
            Ok(Box::new(OpSnippet::new(op.name.clone(), "MyOp")))
        }
        let mut factory = OperatorFactory::empty();
        assert!(!factory.supports("Mine"));
        assert!(factory.register("Mine", custom).is_none());
        let snippet = factory
            .create(&OpInfo::new("m", "Mine", DType::I8))
            .unwrap();
        assert_eq!(
            snippet.declaration(&PoolBindings::default()).unwrap().as_deref(),
            Some("MyOp m;")
        );
        assert_eq!(factory.op_types().collect::<Vec<_>>(), ["Mine"]);
    }
}
