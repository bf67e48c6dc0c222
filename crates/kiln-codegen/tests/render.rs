//! Integration tests: full containers built through the operator factory.

use kiln_arena::PoolCapacities;
use kiln_codegen::{
    render_container, AttrValue, CodegenError, ModelIr, OpInfo, OperatorFactory, QuantizeParams,
    RamTensorSnippet, RawSnippet,
};
use kiln_core::{DType, PoolKind, Shape, TensorDescriptor};

fn conv_model(ram_capacity: usize) -> ModelIr {
    let factory = OperatorFactory::new();
    let mut ir = ModelIr::new("mnist", PoolCapacities::new(128, ram_capacity));
    ir.placeholders.push("input_0".into());
    ir.outputs.push("output_0".into());

    ir.global_declarations.push(Box::new(RawSnippet::new(
        "static const float dw_data[9] = { 0 };",
    )));
    ir.local_declarations.push(Box::new(RamTensorSnippet::new(
        "conv_out",
        TensorDescriptor::new(DType::F32, Shape::from_slice(&[1, 4, 4, 2])),
    )));

    let dws = OpInfo::new("op_dws", "DepthwiseSeparableConv2D", DType::F32)
        .input("in", "input_0")
        .input("depthwise_filter", "dw")
        .input("pointwise_filter", "pw")
        .output("out", "conv_out")
        .attr("padding", AttrValue::Str("VALID".into()))
        .attr("strides", AttrValue::Ints(vec![1, 1, 1, 1]));
    let relu = OpInfo::new("op_relu", "Relu", DType::F32)
        .input("in", "conv_out")
        .output("out", "output_0");
    ir.evaluations.push(factory.create(&dws).unwrap());
    ir.evaluations.push(factory.create(&relu).unwrap());

    ir.quantize_params.insert(
        "output_0".into(),
        QuantizeParams {
            zero_point: -128,
            scale: 0.5,
        },
    );
    ir
}

#[test]
fn container_places_every_section() {
    let text = render_container(&conv_model(1024)).unwrap();
    let dws_class = "ReferenceOperators::DepthwiseSeparableConvOperator<float>";

    assert!(text.starts_with("using namespace uTensor;\n\n"));
    assert!(text.contains("static localCircularArenaAllocator<128> meta_allocator;\n"));
    assert!(text.contains("static localCircularArenaAllocator<1024> ram_allocator;\n"));
    assert!(text.contains(&format!(
        "static const float dw_data[9] = {{ 0 }};\n\
         {dws_class}::Params op_dws_params;\n\
         {dws_class} op_dws(op_dws_params);\n\
         ReferenceOperators::ReLUOperator<float> op_relu;\n\
         // end of rendering global declare snippets\n"
    )));
    assert!(text.contains("void compute_mnist(Tensor& input_0, Tensor& output_0){\n"));
    assert!(text.contains(
        "    // start rendering local declare snippets\n\
         \x20   Tensor conv_out = new RamTensor({ 1, 4, 4, 2 }, flt);\n\
         \x20   // end of rendering local declare snippets\n"
    ));
    assert!(text.contains("    op_dws_params.padding = kTfLitePaddingValid;\n"));
    // Evaluations are separated by exactly one blank line.
    assert!(text.contains("        .eval();\n\n    op_relu\n"));
    assert!(text.ends_with("}\noutput_0_zp = -128;\noutput_0_scale = 0.5;\n"));

    let global = text.find("// start rendering global").unwrap();
    let compute = text.find("void compute_mnist").unwrap();
    let eval = text.find("// start rendering eval").unwrap();
    assert!(global < compute && compute < eval);
}

#[test]
fn local_tensors_must_fit_ram_pool() {
    // 32 f32 elements plus up to 3 bytes of alignment padding.
    let err = render_container(&conv_model(64)).unwrap_err();
    assert_eq!(
        err,
        CodegenError::FootprintExceedsPool {
            pool: PoolKind::Ram,
            required: 131,
            capacity: 64,
        }
    );
}

#[test]
fn unsupported_operator_stops_generation() {
    let factory = OperatorFactory::new();
    let op = OpInfo::new("op_q", "FusedBatchNorm", DType::U8);
    assert_eq!(
        factory.create(&op).err(),
        Some(CodegenError::UnsupportedOp {
            op_type: "FusedBatchNorm".into()
        })
    );
}

#[test]
fn operator_clashing_with_tensor_name_is_rejected() {
    let mut ir = conv_model(1024);
    let clash = OpInfo::new("conv_out", "Relu", DType::F32)
        .input("in", "input_0")
        .output("out", "output_0");
    ir.evaluations
        .push(OperatorFactory::new().create(&clash).unwrap());
    assert_eq!(
        render_container(&ir).unwrap_err(),
        CodegenError::DuplicateSymbol {
            name: "conv_out".into()
        }
    );
}

#[test]
fn quantized_pipeline_renders_in_order() {
    let factory = OperatorFactory::new();
    let mut ir = ModelIr::new("qnet", PoolCapacities::new(256, 1024));
    ir.placeholders.push("x".into());
    ir.outputs.push("y".into());
    for (var, dtype) in [("xq", DType::U8), ("acc", DType::I32), ("yq", DType::U8)] {
        ir.local_declarations.push(Box::new(RamTensorSnippet::new(
            var,
            TensorDescriptor::new(dtype, Shape::from_slice(&[1, 8])),
        )));
    }
    let ops = [
        OpInfo::new("op_quant", "QuantizeV2", DType::U8)
            .input("in", "x")
            .output("out", "xq"),
        OpInfo::new("op_mm", "QuantizedMatMul", DType::I32)
            .input("a", "xq")
            .input("b", "w")
            .output("c", "acc"),
        OpInfo::new("op_req", "Requantize", DType::U8)
            .input("in", "acc")
            .output("out", "yq"),
        OpInfo::new("op_deq", "Dequantize", DType::F32)
            .input("in", "yq")
            .output("out", "y"),
    ];
    for op in &ops {
        ir.evaluations.push(factory.create(op).unwrap());
    }

    let text = render_container(&ir).unwrap();
    let positions: Vec<usize> = ["op_quant\n", "op_mm\n", "op_req\n", "op_deq\n"]
        .iter()
        .map(|needle| text.find(needle).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
    assert!(text.contains("ReferenceOperators::QuantizedMatMulOperator<int32_t> op_mm;\n"));
}

#[test]
fn non_finite_output_scale_stops_generation() {
    let mut ir = conv_model(1024);
    ir.quantize_params.insert(
        "output_0".into(),
        QuantizeParams {
            zero_point: 0,
            scale: f32::NAN,
        },
    );
    assert_eq!(
        render_container(&ir).unwrap_err(),
        CodegenError::NonFiniteScale {
            var: "output_0".into()
        }
    );
}
