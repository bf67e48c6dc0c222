//! Quantized add followed by ReLU, run on static arenas and then emitted
//! as a container.
//!
//! Run with `RUST_LOG=debug` to see arena and step tracing.

use std::collections::HashMap;

use kiln::codegen::{OpInfo, QuantizeParams, RamTensorSnippet};
use kiln::prelude::*;
use tracing_subscriber::EnvFilter;

const META: usize = 256;
const RAM: usize = 1024;
const LEN: usize = 8;

/// Affine int8 quantization: `real = scale * (q - zero_point)`.
#[derive(Clone, Copy)]
struct Quant {
    scale: f32,
    zero_point: i32,
}

impl Quant {
    fn dequantize(self, q: u8) -> f32 {
        self.scale * (q as i8 as i32 - self.zero_point) as f32
    }
}

/// `sum = a + b` in the output quantization, accumulated in i32 scratch.
struct QuantizedAdd {
    a: Quant,
    b: Quant,
    out: Quant,
}

impl Evaluation for QuantizedAdd {
    fn name(&self) -> &str {
        "quantized_add"
    }

    fn scratch(&self) -> PoolBytes {
        PoolBytes::only(PoolKind::Ram, LEN * 4 + 3)
    }

    fn evaluate(&self, ctx: &mut StepContext<'_, '_>) -> Result<(), StepError> {
        let a = ctx.input("a")?;
        let b = ctx.input("b")?;
        let acc = ctx.scratch(PoolKind::Ram, LEN * 4, 4)?;
        for (slot, (&qa, &qb)) in ctx.scratch_mut(acc)?.chunks_exact_mut(4).zip(a.iter().zip(b)) {
            let real = self.a.dequantize(qa) + self.b.dequantize(qb);
            let q = (real / self.out.scale).round() as i32;
            slot.copy_from_slice(&q.to_le_bytes());
        }
        let (acc, sum) = ctx.split_mut(Region::Scratch(acc), Region::Binding("sum"))?;
        for (slot, out) in acc.chunks_exact(4).zip(sum.iter_mut()) {
            let q = i32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]);
            *out = (q + self.out.zero_point).clamp(i8::MIN as i32, i8::MAX as i32) as i8 as u8;
        }
        Ok(())
    }
}

/// In-place ReLU in the quantized domain: clamp at the zero point.
struct QuantizedRelu {
    zero_point: i8,
}

impl Evaluation for QuantizedRelu {
    fn name(&self) -> &str {
        "relu"
    }

    fn evaluate(&self, ctx: &mut StepContext<'_, '_>) -> Result<(), StepError> {
        for v in ctx.binding_mut("sum")? {
            *v = (*v as i8).max(self.zero_point) as u8;
        }
        ctx.store_output("sum", "y")
    }
}

#[derive(Default)]
struct Tensors(HashMap<String, Vec<u8>>);

impl TensorReader for Tensors {
    fn tensor(&self, name: &str) -> Option<&[u8]> {
        self.0.get(name).map(Vec::as_slice)
    }
}

impl TensorWriter for Tensors {
    fn tensor_mut(&mut self, name: &str) -> Option<&mut [u8]> {
        self.0.get_mut(name).map(Vec::as_mut_slice)
    }

    fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Kiln quickstart ===\n");

    let quant = Quant {
        scale: 0.5,
        zero_point: 0,
    };
    let model = Model::new(ModelConfig {
        name: "add_relu".into(),
        capacities: PoolCapacities::new(META, RAM),
        inputs: vec!["a".into(), "b".into()],
        outputs: vec!["y".into()],
        declarations: vec![Box::new(TensorDeclaration::new(
            "sum",
            TensorDescriptor::new(DType::I8, Shape::from_slice(&[1, LEN as u32])),
        ))],
        evaluations: vec![
            Box::new(QuantizedAdd {
                a: quant,
                b: quant,
                out: quant,
            }),
            Box::new(QuantizedRelu { zero_point: 0 }),
        ],
    })
    .unwrap();
    println!("plan requires {}", model.plan().required());

    let mut meta = CircularArena::<META>::new(PoolKind::Metadata).unwrap();
    let mut ram = CircularArena::<RAM>::new(PoolKind::Ram).unwrap();
    let mut ctx = ExecutionContext::new(&mut meta, &mut ram).unwrap();

    let mut inputs = Tensors::default();
    inputs
        .0
        .insert("a".into(), [-8i8, -4, -2, 0, 2, 4, 8, 100].map(|v| v as u8).to_vec());
    inputs
        .0
        .insert("b".into(), [1i8, 1, 1, 1, 1, 1, 1, 100].map(|v| v as u8).to_vec());
    let mut outputs = Tensors::default();
    outputs.0.insert("y".into(), vec![0; LEN]);

    for run in 0..2 {
        let report = model.compute(&mut ctx, &inputs, &mut outputs).unwrap();
        let y: Vec<i8> = outputs.0["y"].iter().map(|&v| v as i8).collect();
        println!("run {run}: y = {y:?}, peak {}", report.peak);
    }
    println!("usage after runs: {}\n", ctx.usage());

    // The same graph as an emitted container.
    let factory = OperatorFactory::new();
    let mut ir = ModelIr::new("add_relu", PoolCapacities::new(META, RAM));
    ir.placeholders.extend(["a".to_string(), "b".to_string()]);
    ir.outputs.push("y".into());
    ir.local_declarations.push(Box::new(RamTensorSnippet::new(
        "sum",
        TensorDescriptor::new(DType::I8, Shape::from_slice(&[1, LEN as u32])),
    )));
    let add = OpInfo::new("op_add", "Add", DType::I8)
        .input("a", "a")
        .input("b", "b")
        .output("c", "sum");
    let relu = OpInfo::new("op_relu", "Relu", DType::I8)
        .input("in", "sum")
        .output("out", "y");
    ir.evaluations.push(factory.create(&add).unwrap());
    ir.evaluations.push(factory.create(&relu).unwrap());
    ir.quantize_params.insert(
        "y".into(),
        QuantizeParams {
            zero_point: quant.zero_point,
            scale: quant.scale,
        },
    );

    match render_container(&ir) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("codegen failed: {e}"),
    }
}
