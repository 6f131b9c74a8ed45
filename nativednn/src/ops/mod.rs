use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use rayon::ThreadPool;

use crate::error::Result;
use crate::model_loader::ModelReader;
use crate::operand::{calculate_data_length, BufferAccounting, DataType, Operand};

mod activation;
pub(crate) mod cpu;

pub use activation::{Activation, PaddingMethod};
pub use cpu::avg_pool::AvgPoolParams;
pub use cpu::conv2d::Conv2dParams;
pub use cpu::dense::DenseParams;
pub use cpu::depth_to_space::DepthToSpaceParams;
pub use cpu::math_binary::{BinaryInput, BinaryOp, MathBinaryParams};
pub use cpu::math_unary::{MathUnaryParams, UnaryOp};
pub use cpu::maximum::MaximumParams;
pub use cpu::mirror_pad::{MirrorPadParams, PadMode};

/// Layer type tags as stored in the model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Identity,
    Conv2D,
    DepthToSpace,
    MirrorPad,
    Maximum,
    MathBinary,
    MathUnary,
    AvgPool,
    Dense,
}

impl LayerKind {
    pub const ALL: [LayerKind; 9] = [
        LayerKind::Identity,
        LayerKind::Conv2D,
        LayerKind::DepthToSpace,
        LayerKind::MirrorPad,
        LayerKind::Maximum,
        LayerKind::MathBinary,
        LayerKind::MathUnary,
        LayerKind::AvgPool,
        LayerKind::Dense,
    ];

    pub fn from_raw(value: i32) -> Option<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }

    pub fn as_raw(self) -> i32 {
        match self {
            LayerKind::Identity => 0,
            LayerKind::Conv2D => 1,
            LayerKind::DepthToSpace => 2,
            LayerKind::MirrorPad => 3,
            LayerKind::Maximum => 4,
            LayerKind::MathBinary => 5,
            LayerKind::MathUnary => 6,
            LayerKind::AvgPool => 7,
            LayerKind::Dense => 8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LayerKind::Identity => "identity",
            LayerKind::Conv2D => "conv2d",
            LayerKind::DepthToSpace => "depth_to_space",
            LayerKind::MirrorPad => "mirror_pad",
            LayerKind::Maximum => "maximum",
            LayerKind::MathBinary => "math_binary",
            LayerKind::MathUnary => "math_unary",
            LayerKind::AvgPool => "avg_pool",
            LayerKind::Dense => "dense",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum LayerParams {
    Identity,
    Conv2D(Conv2dParams),
    DepthToSpace(DepthToSpaceParams),
    MirrorPad(MirrorPadParams),
    Maximum(MaximumParams),
    MathBinary(MathBinaryParams),
    MathUnary(MathUnaryParams),
    AvgPool(AvgPoolParams),
    Dense(DenseParams),
}

impl LayerParams {
    pub fn kind(&self) -> LayerKind {
        match self {
            LayerParams::Identity => LayerKind::Identity,
            LayerParams::Conv2D(_) => LayerKind::Conv2D,
            LayerParams::DepthToSpace(_) => LayerKind::DepthToSpace,
            LayerParams::MirrorPad(_) => LayerKind::MirrorPad,
            LayerParams::Maximum(_) => LayerKind::Maximum,
            LayerParams::MathBinary(_) => LayerKind::MathBinary,
            LayerParams::MathUnary(_) => LayerKind::MathUnary,
            LayerParams::AvgPool(_) => LayerKind::AvgPool,
            LayerParams::Dense(_) => LayerKind::Dense,
        }
    }
}

/// One step of the graph: reads operands by index, writes one operand.
#[derive(Debug, Clone)]
pub struct Layer {
    pub input_operand_indexes: Vec<usize>,
    pub output_operand_index: usize,
    pub params: LayerParams,
}

impl Layer {
    pub fn new(params: LayerParams, input_operand_indexes: Vec<usize>, output_operand_index: usize) -> Self {
        Self {
            input_operand_indexes,
            output_operand_index,
            params,
        }
    }

    pub fn kind(&self) -> LayerKind {
        self.params.kind()
    }

    pub fn exec(&self, operands: &mut [Operand], ctx: &LayerContext) -> anyhow::Result<()> {
        let count = operands.len();
        if let Some(index) = self
            .input_operand_indexes
            .iter()
            .chain(std::iter::once(&self.output_operand_index))
            .find(|index| **index >= count)
        {
            return Err(anyhow!("operand index {} out of range ({} operands)", index, count));
        }

        let inputs = &self.input_operand_indexes;
        let output = self.output_operand_index;
        match &self.params {
            LayerParams::Identity => cpu::identity::exec(operands, inputs, output, ctx),
            LayerParams::Conv2D(params) => cpu::conv2d::exec(operands, inputs, output, params, ctx),
            LayerParams::DepthToSpace(params) => {
                cpu::depth_to_space::exec(operands, inputs, output, params, ctx)
            }
            LayerParams::MirrorPad(params) => cpu::mirror_pad::exec(operands, inputs, output, params, ctx),
            LayerParams::Maximum(params) => cpu::maximum::exec(operands, inputs, output, params, ctx),
            LayerParams::MathBinary(params) => {
                cpu::math_binary::exec(operands, inputs, output, params, ctx)
            }
            LayerParams::MathUnary(params) => cpu::math_unary::exec(operands, inputs, output, params, ctx),
            LayerParams::AvgPool(params) => cpu::avg_pool::exec(operands, inputs, output, params, ctx),
            LayerParams::Dense(params) => cpu::dense::exec(operands, inputs, output, params, ctx),
        }
    }
}

/// Shared state handed to every kernel invocation.
#[derive(Clone)]
pub struct LayerContext {
    pub accounting: Arc<BufferAccounting>,
    pub conv_pool: Option<Arc<ThreadPool>>,
}

impl LayerContext {
    pub fn new(accounting: Arc<BufferAccounting>) -> Self {
        Self {
            accounting,
            conv_pool: None,
        }
    }

    pub fn with_conv_pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.conv_pool = Some(pool);
        self
    }
}

impl fmt::Debug for LayerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerContext")
            .field("conv_pool", &self.conv_pool.as_ref().map(|pool| pool.current_num_threads()))
            .finish()
    }
}

pub(crate) fn load_layer(kind: LayerKind, reader: &mut ModelReader<'_>, operands_num: usize) -> Result<Layer> {
    match kind {
        LayerKind::Identity => cpu::identity::load(reader, operands_num),
        LayerKind::Conv2D => cpu::conv2d::load(reader, operands_num),
        LayerKind::DepthToSpace => cpu::depth_to_space::load(reader, operands_num),
        LayerKind::MirrorPad => cpu::mirror_pad::load(reader, operands_num),
        LayerKind::Maximum => cpu::maximum::load(reader, operands_num),
        LayerKind::MathBinary => cpu::math_binary::load(reader, operands_num),
        LayerKind::MathUnary => cpu::math_unary::load(reader, operands_num),
        LayerKind::AvgPool => cpu::avg_pool::load(reader, operands_num),
        LayerKind::Dense => cpu::dense::load(reader, operands_num),
    }
}

/// Validated NHWC view of an input operand.
pub(crate) struct Nhwc<'a> {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub data_type: DataType,
    pub data: &'a [f32],
}

pub(crate) fn nhwc_input(operands: &[Operand], index: usize) -> anyhow::Result<Nhwc<'_>> {
    let operand = &operands[index];
    if operand.dims[0] != 1 || operand.dims.iter().any(|dim| *dim <= 0) {
        return Err(anyhow!(
            "operand \"{}\" has unusable dims {:?}",
            operand.name,
            operand.dims
        ));
    }
    let data = operand.data()?;
    let (height, width, channels) = (
        operand.height() as usize,
        operand.width() as usize,
        operand.channels() as usize,
    );
    if data.len() != height * width * channels {
        return Err(anyhow!(
            "operand \"{}\" holds {} values, dims {:?} need {}",
            operand.name,
            data.len(),
            operand.dims,
            height * width * channels
        ));
    }
    Ok(Nhwc {
        height,
        width,
        channels,
        data_type: operand.data_type,
        data,
    })
}

/// Element count of an output with `dims`; fails when the byte length does
/// not fit an i32. Kernels call this before allocating.
pub(crate) fn output_elements(dims: [usize; 4]) -> anyhow::Result<usize> {
    let raw = output_dims(dims)?;
    let bytes = calculate_data_length(&raw)
        .ok_or_else(|| anyhow!("output dims {:?} overflow the tensor length", dims))?;
    Ok(bytes / std::mem::size_of::<f32>())
}

fn output_dims(dims: [usize; 4]) -> anyhow::Result<[i32; 4]> {
    let mut raw = [0i32; 4];
    for (dst, dim) in raw.iter_mut().zip(dims) {
        *dst = i32::try_from(dim).map_err(|_| anyhow!("output dim {} too large", dim))?;
    }
    Ok(raw)
}

/// Size the output operand and move `data` into it.
pub(crate) fn write_output(
    operands: &mut [Operand],
    index: usize,
    dims: [usize; 4],
    data_type: DataType,
    data: Vec<f32>,
    ctx: &LayerContext,
) -> anyhow::Result<()> {
    let raw = output_dims(dims)?;
    let output = &mut operands[index];
    output.data_type = data_type;
    output.resize(raw)?;
    output.install(data, &ctx.accounting)
}

pub(crate) fn single_input(inputs: &[usize]) -> anyhow::Result<usize> {
    inputs
        .first()
        .copied()
        .ok_or_else(|| anyhow!("layer has no input operand"))
}
