use crate::error::{DnnError, Result};
use crate::model_loader::ModelReader;
use crate::ops::{single_input, write_output, Layer, LayerContext, LayerParams};
use crate::operand::Operand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Abs,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Asinh,
    Acosh,
    Atanh,
    Ceil,
    Floor,
    Round,
    Exp,
}

impl UnaryOp {
    const ALL: [UnaryOp; 17] = [
        UnaryOp::Abs,
        UnaryOp::Sin,
        UnaryOp::Cos,
        UnaryOp::Tan,
        UnaryOp::Asin,
        UnaryOp::Acos,
        UnaryOp::Atan,
        UnaryOp::Sinh,
        UnaryOp::Cosh,
        UnaryOp::Tanh,
        UnaryOp::Asinh,
        UnaryOp::Acosh,
        UnaryOp::Atanh,
        UnaryOp::Ceil,
        UnaryOp::Floor,
        UnaryOp::Round,
        UnaryOp::Exp,
    ];

    pub fn from_raw(value: i32) -> Option<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }

    pub fn as_raw(self) -> i32 {
        Self::ALL
            .iter()
            .position(|op| *op == self)
            .map(|index| index as i32)
            .unwrap_or(-1)
    }

    pub fn apply(self, x: f32) -> f32 {
        match self {
            Self::Abs => x.abs(),
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::Tan => x.tan(),
            Self::Asin => x.asin(),
            Self::Acos => x.acos(),
            Self::Atan => x.atan(),
            Self::Sinh => x.sinh(),
            Self::Cosh => x.cosh(),
            Self::Tanh => x.tanh(),
            Self::Asinh => x.asinh(),
            Self::Acosh => x.acosh(),
            Self::Atanh => x.atanh(),
            Self::Ceil => x.ceil(),
            Self::Floor => x.floor(),
            Self::Round => x.round(),
            Self::Exp => x.exp(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MathUnaryParams {
    pub op: UnaryOp,
}

pub fn load(reader: &mut ModelReader<'_>, operands_num: usize) -> Result<Layer> {
    let raw_op = reader.read_i32()?;
    let op = UnaryOp::from_raw(raw_op)
        .ok_or_else(|| DnnError::format(format!("math_unary op {}", raw_op)))?;
    let input = reader.read_operand_index(operands_num)?;
    let output = reader.read_operand_index(operands_num)?;
    Ok(Layer::new(LayerParams::MathUnary(MathUnaryParams { op }), vec![input], output))
}

pub fn exec(
    operands: &mut [Operand],
    inputs: &[usize],
    output: usize,
    params: &MathUnaryParams,
    ctx: &LayerContext,
) -> anyhow::Result<()> {
    let input = &operands[single_input(inputs)?];
    let dims = input.dims.map(|dim| dim.max(0) as usize);
    let data_type = input.data_type;
    let out = input
        .data()?
        .iter()
        .map(|x| params.op.apply(*x))
        .collect::<Vec<_>>();
    write_output(operands, output, dims, data_type, out, ctx)
}
