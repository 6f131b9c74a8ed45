use anyhow::anyhow;
use rayon::prelude::*;

use crate::error::{DnnError, Result};
use crate::model_loader::ModelReader;
use crate::ops::{
    nhwc_input, single_input, write_output, Activation, Layer, LayerContext, LayerParams,
    PaddingMethod,
};
use crate::operand::Operand;

#[derive(Debug, Clone)]
pub struct Conv2dParams {
    pub input_num: usize,
    pub output_num: usize,
    pub kernel_size: usize,
    pub dilation: usize,
    pub padding_method: PaddingMethod,
    pub activation: Activation,
    /// `[output_num][kernel_size][kernel_size][input_num]`
    pub kernel: Vec<f32>,
    pub biases: Option<Vec<f32>>,
}

pub fn load(reader: &mut ModelReader<'_>, operands_num: usize) -> Result<Layer> {
    let dilation = reader.read_positive("conv2d dilation")?;
    let raw_padding = reader.read_i32()?;
    let padding_method = PaddingMethod::from_raw(raw_padding)
        .ok_or_else(|| DnnError::format(format!("conv2d padding method {}", raw_padding)))?;
    let raw_activation = reader.read_i32()?;
    let activation = Activation::from_raw(raw_activation)
        .ok_or_else(|| DnnError::format(format!("conv2d activation {}", raw_activation)))?;
    let input_num = reader.read_positive("conv2d input_num")?;
    let output_num = reader.read_positive("conv2d output_num")?;
    let kernel_size = reader.read_positive("conv2d kernel_size")?;
    let has_bias = reader.read_bool()?;

    let weights = kernel_size
        .checked_mul(kernel_size)
        .and_then(|taps| taps.checked_mul(output_num))
        .and_then(|count| count.checked_mul(input_num))
        .ok_or_else(|| DnnError::format("conv2d kernel too large"))?;
    let kernel = reader.read_f32_vec(weights)?;
    let biases = if has_bias {
        Some(reader.read_f32_vec(output_num)?)
    } else {
        None
    };

    let input = reader.read_operand_index(operands_num)?;
    let output = reader.read_operand_index(operands_num)?;
    let params = Conv2dParams {
        input_num,
        output_num,
        kernel_size,
        dilation,
        padding_method,
        activation,
        kernel,
        biases,
    };
    Ok(Layer::new(LayerParams::Conv2D(params), vec![input], output))
}

struct Geometry {
    height: usize,
    width: usize,
    channels: usize,
    pad: usize,
    out_width: usize,
}

pub fn exec(
    operands: &mut [Operand],
    inputs: &[usize],
    output: usize,
    params: &Conv2dParams,
    ctx: &LayerContext,
) -> anyhow::Result<()> {
    let input = nhwc_input(operands, single_input(inputs)?)?;
    if input.channels != params.input_num {
        return Err(anyhow!(
            "conv2d expects {} input channels, operand has {}",
            params.input_num,
            input.channels
        ));
    }

    let pad = match params.padding_method {
        PaddingMethod::Valid => (params.kernel_size - 1) / 2 * params.dilation,
        PaddingMethod::Same | PaddingMethod::SameClampToEdge => 0,
    };
    if input.height <= pad * 2 || input.width <= pad * 2 {
        return Err(anyhow!(
            "conv2d input {}x{} too small for valid padding {}",
            input.width,
            input.height,
            pad
        ));
    }
    let geometry = Geometry {
        height: input.height,
        width: input.width,
        channels: input.channels,
        pad,
        out_width: input.width - pad * 2,
    };
    let out_height = input.height - pad * 2;
    let row_len = geometry.out_width * params.output_num;
    let mut out = vec![0.0f32; out_height * row_len];

    let src = input.data;
    let run_row = |(row, dst): (usize, &mut [f32])| conv_row(src, params, &geometry, row + pad, dst);
    match &ctx.conv_pool {
        Some(pool) => pool.install(|| out.par_chunks_mut(row_len).enumerate().for_each(run_row)),
        None => out.chunks_mut(row_len).enumerate().for_each(run_row),
    }

    let dims = [1, out_height, geometry.out_width, params.output_num];
    let data_type = input.data_type;
    write_output(operands, output, dims, data_type, out, ctx)
}

fn conv_row(src: &[f32], params: &Conv2dParams, geo: &Geometry, y: usize, dst: &mut [f32]) {
    let radius = (params.kernel_size / 2) as isize;
    let dilation = params.dilation as isize;
    let filter_linesize = params.kernel_size * params.input_num;
    let filter_size = params.kernel_size * filter_linesize;
    let src_linesize = geo.width * geo.channels;
    let clamp = params.padding_method == PaddingMethod::SameClampToEdge;

    for (col, pixel) in dst.chunks_mut(params.output_num).enumerate() {
        let x = col + geo.pad;
        for (filter, value) in pixel.iter_mut().enumerate() {
            let mut acc = params
                .biases
                .as_ref()
                .map(|biases| biases[filter])
                .unwrap_or(0.0);
            for ky in 0..params.kernel_size {
                let y_pos = y as isize + (ky as isize - radius) * dilation;
                for kx in 0..params.kernel_size {
                    let x_pos = x as isize + (kx as isize - radius) * dilation;
                    let base = if clamp {
                        let y_pos = y_pos.clamp(0, geo.height as isize - 1) as usize;
                        let x_pos = x_pos.clamp(0, geo.width as isize - 1) as usize;
                        Some(y_pos * src_linesize + x_pos * geo.channels)
                    } else if y_pos < 0
                        || x_pos < 0
                        || y_pos >= geo.height as isize
                        || x_pos >= geo.width as isize
                    {
                        None
                    } else {
                        Some(y_pos as usize * src_linesize + x_pos as usize * geo.channels)
                    };
                    let Some(base) = base else {
                        continue;
                    };
                    let weights = filter * filter_size + ky * filter_linesize + kx * params.input_num;
                    for ch in 0..params.input_num {
                        acc += src[base + ch] * params.kernel[weights + ch];
                    }
                }
            }
            *value = params.activation.apply(acc);
        }
    }
}
