use std::sync::Arc;

use anyhow::Result;
use nativednn::ops::{
    Activation, AvgPoolParams, Conv2dParams, DenseParams, DepthToSpaceParams, LayerContext,
    MirrorPadParams, PadMode, PaddingMethod,
};
use nativednn::{BufferAccounting, Layer, LayerParams};

use crate::common::{self, assert_close};

fn grid(count: usize) -> Vec<f32> {
    (0..count).map(|value| value as f32).collect()
}

fn conv(
    padding_method: PaddingMethod,
    kernel_size: usize,
    dilation: usize,
    kernel: Vec<f32>,
    biases: Option<Vec<f32>>,
    activation: Activation,
) -> Layer {
    let output_num = biases.as_ref().map(Vec::len).unwrap_or(1);
    let input_num = kernel.len() / (output_num * kernel_size * kernel_size);
    Layer::new(
        LayerParams::Conv2D(Conv2dParams {
            input_num,
            output_num,
            kernel_size,
            dilation,
            padding_method,
            activation,
            kernel,
            biases,
        }),
        vec![0],
        1,
    )
}

#[test]
fn conv2d_same_padding_sums_in_bounds_neighbours() -> Result<()> {
    let accounting = Arc::new(BufferAccounting::default());
    let input = (1..=9).map(|value| value as f32).collect::<Vec<_>>();
    let mut operands = vec![
        common::tensor("x", [1, 3, 3, 1], &input, &accounting)?,
        common::empty("y"),
    ];
    let layer = conv(PaddingMethod::Same, 3, 1, vec![1.0; 9], None, Activation::None);
    let (dims, out) = common::run_layer(&layer, &mut operands)?;
    assert_eq!(dims, [1, 3, 3, 1]);
    assert_close(&out, &[12.0, 21.0, 16.0, 27.0, 45.0, 33.0, 24.0, 39.0, 28.0])
}

#[test]
fn conv2d_valid_padding_shrinks_output() -> Result<()> {
    let accounting = Arc::new(BufferAccounting::default());
    let input = (1..=9).map(|value| value as f32).collect::<Vec<_>>();
    let mut operands = vec![
        common::tensor("x", [1, 3, 3, 1], &input, &accounting)?,
        common::empty("y"),
    ];
    let layer = conv(PaddingMethod::Valid, 3, 1, vec![1.0; 9], Some(vec![1.0]), Activation::Relu);
    let (dims, out) = common::run_layer(&layer, &mut operands)?;
    assert_eq!(dims, [1, 1, 1, 1]);
    assert_close(&out, &[46.0])?;

    let negative = conv(PaddingMethod::Valid, 3, 1, vec![-1.0; 9], None, Activation::Relu);
    let (_, out) = common::run_layer(&negative, &mut operands)?;
    assert_close(&out, &[0.0])
}

#[test]
fn conv2d_clamp_to_edge_and_dilation() -> Result<()> {
    let accounting = Arc::new(BufferAccounting::default());
    let input = (1..=9).map(|value| value as f32).collect::<Vec<_>>();
    let mut operands = vec![
        common::tensor("x", [1, 3, 3, 1], &input, &accounting)?,
        common::empty("y"),
    ];
    let layer = conv(PaddingMethod::SameClampToEdge, 3, 1, vec![1.0; 9], None, Activation::None);
    let (_, out) = common::run_layer(&layer, &mut operands)?;
    assert_close(&out[..1], &[21.0])?;
    assert_close(&out[4..5], &[45.0])?;

    let mut operands = vec![
        common::tensor("x", [1, 5, 5, 1], &grid(25), &accounting)?,
        common::empty("y"),
    ];
    let dilated = conv(PaddingMethod::Valid, 3, 2, vec![1.0; 9], None, Activation::None);
    let (dims, out) = common::run_layer(&dilated, &mut operands)?;
    assert_eq!(dims, [1, 1, 1, 1]);
    assert_close(&out, &[108.0])
}

#[test]
fn conv2d_mixes_channels() -> Result<()> {
    let accounting = Arc::new(BufferAccounting::default());
    let mut operands = vec![
        common::tensor("x", [1, 1, 2, 2], &[1.0, 2.0, 3.0, 4.0], &accounting)?,
        common::empty("y"),
    ];
    let layer = conv(
        PaddingMethod::Same,
        1,
        1,
        vec![1.0, 0.0, 1.0, 1.0],
        Some(vec![0.0, -1.0]),
        Activation::None,
    );
    let (dims, out) = common::run_layer(&layer, &mut operands)?;
    assert_eq!(dims, [1, 1, 2, 2]);
    assert_close(&out, &[1.0, 2.0, 3.0, 6.0])?;

    let wrong_channels = conv(PaddingMethod::Same, 1, 1, vec![1.0; 3], None, Activation::None);
    assert!(common::run_layer(&wrong_channels, &mut operands).is_err());
    Ok(())
}

#[test]
fn conv2d_row_parallel_matches_inline() -> Result<()> {
    let accounting = Arc::new(BufferAccounting::default());
    let input = grid(8 * 8 * 2);
    let kernel = (0..3 * 3 * 3 * 2).map(|value| (value % 5) as f32 - 2.0).collect::<Vec<_>>();
    let layer = conv(
        PaddingMethod::Same,
        3,
        1,
        kernel,
        Some(vec![0.1, 0.2, 0.3]),
        Activation::Tanh,
    );

    let mut inline_operands = vec![
        common::tensor("x", [1, 8, 8, 2], &input, &accounting)?,
        common::empty("y"),
    ];
    let (_, inline) = common::run_layer(&layer, &mut inline_operands)?;

    let pool = rayon::ThreadPoolBuilder::new().num_threads(3).build()?;
    let ctx = LayerContext::new(accounting.clone()).with_conv_pool(Arc::new(pool));
    let mut parallel_operands = vec![
        common::tensor("x", [1, 8, 8, 2], &input, &accounting)?,
        common::empty("y"),
    ];
    let (dims, parallel) = common::run_layer_with(&layer, &mut parallel_operands, &ctx)?;
    assert_eq!(dims, [1, 8, 8, 3]);
    assert_close(&parallel, &inline)
}

#[test]
fn depth_to_space_moves_channels_into_tiles() -> Result<()> {
    let accounting = Arc::new(BufferAccounting::default());
    let input = (1..=8).map(|value| value as f32).collect::<Vec<_>>();
    let mut operands = vec![
        common::tensor("x", [1, 1, 2, 4], &input, &accounting)?,
        common::empty("y"),
    ];
    let layer = Layer::new(
        LayerParams::DepthToSpace(DepthToSpaceParams { block_size: 2 }),
        vec![0],
        1,
    );
    let (dims, out) = common::run_layer(&layer, &mut operands)?;
    assert_eq!(dims, [1, 2, 4, 1]);
    assert_close(&out, &[1.0, 2.0, 5.0, 6.0, 3.0, 4.0, 7.0, 8.0])?;

    let mut narrow = vec![
        common::tensor("x", [1, 2, 2, 2], &grid(8), &accounting)?,
        common::empty("y"),
    ];
    assert!(common::run_layer(&layer, &mut narrow).is_err());
    Ok(())
}

fn pad_layer(mode: PadMode, paddings: [[usize; 2]; 4]) -> Layer {
    Layer::new(
        LayerParams::MirrorPad(MirrorPadParams {
            mode,
            paddings,
            constant_value: 0.0,
        }),
        vec![0],
        1,
    )
}

#[test]
fn mirror_pad_modes() -> Result<()> {
    let accounting = Arc::new(BufferAccounting::default());
    let input = (1..=6).map(|value| value as f32).collect::<Vec<_>>();
    let mut operands = vec![
        common::tensor("x", [1, 2, 3, 1], &input, &accounting)?,
        common::empty("y"),
    ];

    let reflect = pad_layer(PadMode::Reflect, [[0, 0], [0, 0], [2, 2], [0, 0]]);
    let (dims, out) = common::run_layer(&reflect, &mut operands)?;
    assert_eq!(dims, [1, 2, 7, 1]);
    assert_close(
        &out,
        &[3.0, 2.0, 1.0, 2.0, 3.0, 2.0, 1.0, 6.0, 5.0, 4.0, 5.0, 6.0, 5.0, 4.0],
    )?;

    let symmetric = pad_layer(PadMode::Symmetric, [[0, 0], [1, 1], [0, 0], [0, 0]]);
    let (dims, out) = common::run_layer(&symmetric, &mut operands)?;
    assert_eq!(dims, [1, 4, 3, 1]);
    assert_close(
        &out,
        &[1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 4.0, 5.0, 6.0],
    )?;

    let constant = pad_layer(PadMode::Constant, [[0, 0], [0, 0], [1, 0], [0, 1]]);
    let (dims, out) = common::run_layer(&constant, &mut operands)?;
    assert_eq!(dims, [1, 2, 4, 2]);
    assert_close(
        &out,
        &[0.0, 0.0, 1.0, 0.0, 2.0, 0.0, 3.0, 0.0, 0.0, 0.0, 4.0, 0.0, 5.0, 0.0, 6.0, 0.0],
    )
}

#[test]
fn mirror_pad_limits() -> Result<()> {
    let accounting = Arc::new(BufferAccounting::default());
    let mut operands = vec![
        common::tensor("x", [1, 2, 3, 1], &grid(6), &accounting)?,
        common::empty("y"),
    ];
    let too_wide = pad_layer(PadMode::Reflect, [[0, 0], [0, 0], [3, 0], [0, 0]]);
    assert!(common::run_layer(&too_wide, &mut operands).is_err());
    let symmetric_edge = pad_layer(PadMode::Symmetric, [[0, 0], [0, 0], [3, 3], [0, 0]]);
    assert!(common::run_layer(&symmetric_edge, &mut operands).is_ok());
    let batch = pad_layer(PadMode::Constant, [[1, 0], [0, 0], [0, 0], [0, 0]]);
    assert!(common::run_layer(&batch, &mut operands).is_err());
    Ok(())
}

#[test]
fn mirror_pad_rejects_oversized_output() -> Result<()> {
    let accounting = Arc::new(BufferAccounting::default());
    let mut operands = vec![
        common::tensor("x", [1, 1, 1, 1], &[1.0], &accounting)?,
        common::empty("y"),
    ];
    let huge = pad_layer(PadMode::Constant, [[0, 0], [1 << 30, 1 << 30], [0, 0], [0, 0]]);
    assert!(common::run_layer(&huge, &mut operands).is_err());
    let wrapping = pad_layer(PadMode::Constant, [[0, 0], [0, 0], [usize::MAX, 1], [0, 0]]);
    assert!(common::run_layer(&wrapping, &mut operands).is_err());
    // Fits i32 dims but not an i32 byte length.
    let long = pad_layer(PadMode::Constant, [[0, 0], [0, 0], [0, 1 << 29], [0, 0]]);
    assert!(common::run_layer(&long, &mut operands).is_err());
    assert!(!operands[1].has_data());
    Ok(())
}

fn pool_layer(strides: usize, padding_method: PaddingMethod, kernel_size: usize) -> Layer {
    Layer::new(
        LayerParams::AvgPool(AvgPoolParams {
            strides,
            padding_method,
            kernel_size,
        }),
        vec![0],
        1,
    )
}

#[test]
fn avg_pool_valid_and_same() -> Result<()> {
    let accounting = Arc::new(BufferAccounting::default());
    let mut operands = vec![
        common::tensor("x", [1, 4, 4, 1], &grid(16), &accounting)?,
        common::empty("y"),
    ];
    let (dims, out) = common::run_layer(&pool_layer(2, PaddingMethod::Valid, 2), &mut operands)?;
    assert_eq!(dims, [1, 2, 2, 1]);
    assert_close(&out, &[2.5, 4.5, 10.5, 12.5])?;

    let input = (1..=9).map(|value| value as f32).collect::<Vec<_>>();
    let mut operands = vec![
        common::tensor("x", [1, 3, 3, 1], &input, &accounting)?,
        common::empty("y"),
    ];
    let (dims, out) = common::run_layer(&pool_layer(1, PaddingMethod::Same, 3), &mut operands)?;
    assert_eq!(dims, [1, 3, 3, 1]);
    assert_close(&out[..2], &[3.0, 3.5])?;
    assert_close(&out[4..5], &[5.0])?;

    let (dims, out) = common::run_layer(&pool_layer(2, PaddingMethod::Same, 2), &mut operands)?;
    assert_eq!(dims, [1, 2, 2, 1]);
    assert_close(&out, &[3.0, 4.5, 7.5, 9.0])?;

    assert!(common::run_layer(&pool_layer(1, PaddingMethod::Valid, 4), &mut operands).is_err());
    Ok(())
}

#[test]
fn dense_applies_per_pixel() -> Result<()> {
    let accounting = Arc::new(BufferAccounting::default());
    let mut operands = vec![
        common::tensor("x", [1, 1, 2, 2], &[1.0, 2.0, 3.0, 4.0], &accounting)?,
        common::empty("y"),
    ];
    let dense = |activation, kernel: Vec<f32>, biases| {
        Layer::new(
            LayerParams::Dense(DenseParams {
                input_num: 2,
                output_num: kernel.len() / 2,
                activation,
                kernel,
                biases,
            }),
            vec![0],
            1,
        )
    };

    let layer = dense(
        Activation::None,
        vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        Some(vec![0.0, 0.0, 0.5]),
    );
    let (dims, out) = common::run_layer(&layer, &mut operands)?;
    assert_eq!(dims, [1, 1, 2, 3]);
    assert_close(&out, &[1.0, 2.0, 3.5, 3.0, 4.0, 7.5])?;

    let relu = dense(Activation::Relu, vec![-1.0, 0.0], None);
    let (_, out) = common::run_layer(&relu, &mut operands)?;
    assert_close(&out, &[0.0, 0.0])?;

    let mut wide = vec![
        common::tensor("x", [1, 1, 1, 3], &[1.0, 2.0, 3.0], &accounting)?,
        common::empty("y"),
    ];
    assert!(common::run_layer(&layer, &mut wide).is_err());
    Ok(())
}
