use std::sync::Arc;

use anyhow::Result;
use nativednn::ops::{
    Activation, BinaryInput, BinaryOp, MathBinaryParams, MathUnaryParams, MaximumParams, UnaryOp,
};
use nativednn::{BufferAccounting, Layer, LayerParams};

use crate::common::{self, assert_close};

fn binary(op: BinaryOp, lhs: BinaryInput, rhs: BinaryInput, inputs: Vec<usize>, output: usize) -> Layer {
    Layer::new(LayerParams::MathBinary(MathBinaryParams { op, lhs, rhs }), inputs, output)
}

#[test]
fn identity_copies_dims_and_data() -> Result<()> {
    let accounting = Arc::new(BufferAccounting::default());
    let mut operands = vec![
        common::tensor("x", [1, 2, 1, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &accounting)?,
        common::empty("y"),
    ];
    let layer = Layer::new(LayerParams::Identity, vec![0], 1);
    let (dims, out) = common::run_layer(&layer, &mut operands)?;
    assert_eq!(dims, [1, 2, 1, 3]);
    assert_close(&out, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;

    let in_place = Layer::new(LayerParams::Identity, vec![0], 0);
    let (_, out) = common::run_layer(&in_place, &mut operands)?;
    assert_close(&out, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
}

#[test]
fn layer_rejects_out_of_range_operands() -> Result<()> {
    let accounting = Arc::new(BufferAccounting::default());
    let mut operands = vec![common::tensor("x", [1, 1, 1, 1], &[1.0], &accounting)?];
    let layer = Layer::new(LayerParams::Identity, vec![0], 3);
    assert!(common::run_layer(&layer, &mut operands).is_err());
    Ok(())
}

#[test]
fn maximum_clamps_from_below() -> Result<()> {
    let accounting = Arc::new(BufferAccounting::default());
    let mut operands = vec![
        common::tensor("x", [1, 1, 3, 1], &[-1.0, 0.5, 2.0], &accounting)?,
        common::empty("y"),
    ];
    let layer = Layer::new(LayerParams::Maximum(MaximumParams { value: 0.0 }), vec![0], 1);
    let (dims, out) = common::run_layer(&layer, &mut operands)?;
    assert_eq!(dims, [1, 1, 3, 1]);
    assert_close(&out, &[0.0, 0.5, 2.0])
}

#[test]
fn math_binary_tensor_and_scalar_sides() -> Result<()> {
    let accounting = Arc::new(BufferAccounting::default());
    let mut operands = vec![
        common::tensor("a", [1, 1, 4, 1], &[4.0, -1.0, 7.5, 2.0], &accounting)?,
        common::tensor("b", [1, 1, 4, 1], &[1.0, 2.0, 0.5, 4.0], &accounting)?,
        common::empty("y"),
    ];

    let sub = binary(BinaryOp::Sub, BinaryInput::Tensor, BinaryInput::Tensor, vec![0, 1], 2);
    let (dims, out) = common::run_layer(&sub, &mut operands)?;
    assert_eq!(dims, [1, 1, 4, 1]);
    assert_close(&out, &[3.0, -3.0, 7.0, -2.0])?;

    let div = binary(BinaryOp::RealDiv, BinaryInput::Scalar(1.0), BinaryInput::Tensor, vec![1], 2);
    let (_, out) = common::run_layer(&div, &mut operands)?;
    assert_close(&out, &[1.0, 0.5, 2.0, 0.25])?;

    let floor_mod = binary(BinaryOp::FloorMod, BinaryInput::Tensor, BinaryInput::Scalar(3.0), vec![0], 2);
    let (_, out) = common::run_layer(&floor_mod, &mut operands)?;
    assert_close(&out, &[1.0, 2.0, 1.5, 2.0])?;

    let minimum = binary(BinaryOp::Minimum, BinaryInput::Tensor, BinaryInput::Tensor, vec![0, 1], 2);
    let (_, out) = common::run_layer(&minimum, &mut operands)?;
    assert_close(&out, &[1.0, -1.0, 0.5, 2.0])?;

    let add = binary(BinaryOp::Add, BinaryInput::Scalar(0.5), BinaryInput::Tensor, vec![0], 2);
    let (_, out) = common::run_layer(&add, &mut operands)?;
    assert_close(&out, &[4.5, -0.5, 8.0, 2.5])
}

#[test]
fn math_binary_rejects_length_mismatch() -> Result<()> {
    let accounting = Arc::new(BufferAccounting::default());
    let mut operands = vec![
        common::tensor("a", [1, 1, 4, 1], &[1.0; 4], &accounting)?,
        common::tensor("b", [1, 1, 2, 1], &[1.0; 2], &accounting)?,
        common::empty("y"),
    ];
    let mul = binary(BinaryOp::Mul, BinaryInput::Tensor, BinaryInput::Tensor, vec![0, 1], 2);
    assert!(common::run_layer(&mul, &mut operands).is_err());
    Ok(())
}

#[test]
fn math_unary_ops() -> Result<()> {
    let accounting = Arc::new(BufferAccounting::default());
    let mut operands = vec![
        common::tensor("x", [1, 1, 3, 1], &[-2.5, 0.0, 1.0], &accounting)?,
        common::empty("y"),
    ];
    let cases = [
        (UnaryOp::Abs, [2.5, 0.0, 1.0]),
        (UnaryOp::Ceil, [-2.0, 0.0, 1.0]),
        (UnaryOp::Floor, [-3.0, 0.0, 1.0]),
        (UnaryOp::Round, [-3.0, 0.0, 1.0]),
        (UnaryOp::Exp, [(-2.5f32).exp(), 1.0, std::f32::consts::E]),
        (UnaryOp::Sin, [(-2.5f32).sin(), 0.0, 1.0f32.sin()]),
        (UnaryOp::Atan, [(-2.5f32).atan(), 0.0, std::f32::consts::FRAC_PI_4]),
        (UnaryOp::Tanh, [(-2.5f32).tanh(), 0.0, 1.0f32.tanh()]),
    ];
    for (op, expected) in cases {
        let layer = Layer::new(LayerParams::MathUnary(MathUnaryParams { op }), vec![0], 1);
        let (_, out) = common::run_layer(&layer, &mut operands)?;
        assert_close(&out, &expected)?;
    }
    Ok(())
}

#[test]
fn unary_op_tags_are_dense() -> Result<()> {
    for raw in 0..17 {
        let op = UnaryOp::from_raw(raw).ok_or_else(|| anyhow::anyhow!("tag {} unknown", raw))?;
        assert_eq!(op.as_raw(), raw);
    }
    assert_eq!(UnaryOp::from_raw(17), None);
    assert_eq!(UnaryOp::from_raw(-1), None);
    Ok(())
}

#[test]
fn activations() -> Result<()> {
    assert_eq!(Activation::Relu.apply(-1.0), 0.0);
    assert_eq!(Activation::Relu.apply(2.0), 2.0);
    assert_eq!(Activation::None.apply(-3.0), -3.0);
    assert_close(&[Activation::Sigmoid.apply(0.0)], &[0.5])?;
    assert_close(&[Activation::Tanh.apply(0.0)], &[0.0])?;
    assert_close(&[Activation::Tanh.apply(1.0)], &[1.0f32.tanh()])?;
    assert_close(&[Activation::LeakyRelu.apply(-1.0)], &[-0.2])?;
    assert_eq!(Activation::LeakyRelu.apply(1.5), 1.5);
    Ok(())
}
