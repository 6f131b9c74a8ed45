use anyhow::anyhow;

use crate::error::{DnnError, Result};
use crate::model_loader::ModelReader;
use crate::ops::{write_output, Layer, LayerContext, LayerParams};
use crate::operand::Operand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Sub,
    Add,
    Mul,
    RealDiv,
    Minimum,
    FloorMod,
}

impl BinaryOp {
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Sub),
            1 => Some(Self::Add),
            2 => Some(Self::Mul),
            3 => Some(Self::RealDiv),
            4 => Some(Self::Minimum),
            5 => Some(Self::FloorMod),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Self::Sub => 0,
            Self::Add => 1,
            Self::Mul => 2,
            Self::RealDiv => 3,
            Self::Minimum => 4,
            Self::FloorMod => 5,
        }
    }

    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            Self::Sub => a - b,
            Self::Add => a + b,
            Self::Mul => a * b,
            Self::RealDiv => a / b,
            Self::Minimum => a.min(b),
            Self::FloorMod => a - (a / b).floor() * b,
        }
    }
}

/// One side of a binary op: a broadcast scalar, or the next operand in the
/// layer's input list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryInput {
    Scalar(f32),
    Tensor,
}

#[derive(Debug, Clone)]
pub struct MathBinaryParams {
    pub op: BinaryOp,
    pub lhs: BinaryInput,
    pub rhs: BinaryInput,
}

pub fn load(reader: &mut ModelReader<'_>, operands_num: usize) -> Result<Layer> {
    let raw_op = reader.read_i32()?;
    let op = BinaryOp::from_raw(raw_op)
        .ok_or_else(|| DnnError::format(format!("math_binary op {}", raw_op)))?;
    let mut inputs = Vec::with_capacity(2);
    let lhs = read_side(reader, operands_num, &mut inputs)?;
    let rhs = read_side(reader, operands_num, &mut inputs)?;
    if inputs.is_empty() {
        return Err(DnnError::format("math_binary needs at least one tensor operand"));
    }
    let output = reader.read_operand_index(operands_num)?;
    Ok(Layer::new(
        LayerParams::MathBinary(MathBinaryParams { op, lhs, rhs }),
        inputs,
        output,
    ))
}

fn read_side(reader: &mut ModelReader<'_>, operands_num: usize, inputs: &mut Vec<usize>) -> Result<BinaryInput> {
    if reader.read_bool()? {
        Ok(BinaryInput::Scalar(reader.read_f32()?))
    } else {
        inputs.push(reader.read_operand_index(operands_num)?);
        Ok(BinaryInput::Tensor)
    }
}

pub fn exec(
    operands: &mut [Operand],
    inputs: &[usize],
    output: usize,
    params: &MathBinaryParams,
    ctx: &LayerContext,
) -> anyhow::Result<()> {
    let shared: &[Operand] = operands;
    let mut tensors = inputs.iter();
    let lhs = resolve(params.lhs, &mut tensors, shared)?;
    let rhs = resolve(params.rhs, &mut tensors, shared)?;

    let shape_source = match (&lhs, &rhs) {
        (Side::Tensor(operand), _) | (_, Side::Tensor(operand)) => *operand,
        _ => return Err(anyhow!("math_binary needs at least one tensor operand")),
    };
    let dims = shape_source.dims.map(|dim| dim.max(0) as usize);
    let data_type = shape_source.data_type;

    let out = match (lhs, rhs) {
        (Side::Tensor(a), Side::Tensor(b)) => {
            let (a, b) = (a.data()?, b.data()?);
            if a.len() != b.len() {
                return Err(anyhow!(
                    "math_binary operands differ in length: {} vs {}",
                    a.len(),
                    b.len()
                ));
            }
            a.iter().zip(b).map(|(x, y)| params.op.apply(*x, *y)).collect()
        }
        (Side::Scalar(a), Side::Tensor(b)) => b.data()?.iter().map(|y| params.op.apply(a, *y)).collect(),
        (Side::Tensor(a), Side::Scalar(b)) => a.data()?.iter().map(|x| params.op.apply(*x, b)).collect(),
        (Side::Scalar(_), Side::Scalar(_)) => {
            return Err(anyhow!("math_binary needs at least one tensor operand"))
        }
    };
    write_output(operands, output, dims, data_type, out, ctx)
}

fn resolve<'a>(
    side: BinaryInput,
    tensors: &mut std::slice::Iter<'_, usize>,
    operands: &'a [Operand],
) -> anyhow::Result<Side<'a>> {
    match side {
        BinaryInput::Scalar(value) => Ok(Side::Scalar(value)),
        BinaryInput::Tensor => {
            let index = tensors
                .next()
                .ok_or_else(|| anyhow!("math_binary is missing a tensor operand"))?;
            Ok(Side::Tensor(&operands[*index]))
        }
    }
}

enum Side<'a> {
    Scalar(f32),
    Tensor(&'a Operand),
}
