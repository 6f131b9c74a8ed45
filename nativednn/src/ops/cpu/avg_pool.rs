use anyhow::anyhow;

use crate::error::{DnnError, Result};
use crate::model_loader::ModelReader;
use crate::ops::{nhwc_input, single_input, write_output, Layer, LayerContext, LayerParams, PaddingMethod};
use crate::operand::Operand;

#[derive(Debug, Clone)]
pub struct AvgPoolParams {
    pub strides: usize,
    pub padding_method: PaddingMethod,
    pub kernel_size: usize,
}

pub fn load(reader: &mut ModelReader<'_>, operands_num: usize) -> Result<Layer> {
    let strides = reader.read_positive("avg_pool strides")?;
    let raw_padding = reader.read_i32()?;
    let padding_method = match PaddingMethod::from_raw(raw_padding) {
        Some(method @ (PaddingMethod::Valid | PaddingMethod::Same)) => method,
        _ => return Err(DnnError::format(format!("avg_pool padding method {}", raw_padding))),
    };
    let kernel_size = reader.read_positive("avg_pool kernel_size")?;
    let input = reader.read_operand_index(operands_num)?;
    let output = reader.read_operand_index(operands_num)?;
    let params = AvgPoolParams {
        strides,
        padding_method,
        kernel_size,
    };
    Ok(Layer::new(LayerParams::AvgPool(params), vec![input], output))
}

/// Average over the in-bounds part of each window.
pub fn exec(
    operands: &mut [Operand],
    inputs: &[usize],
    output: usize,
    params: &AvgPoolParams,
    ctx: &LayerContext,
) -> anyhow::Result<()> {
    let input = nhwc_input(operands, single_input(inputs)?)?;
    let (height, width, channels) = (input.height, input.width, input.channels);
    let strides = params.strides;
    let kernel = params.kernel_size;

    let (height_end, width_end, height_radius, width_radius) = match params.padding_method {
        PaddingMethod::Same => {
            let radius = |size: usize| kernel.saturating_sub((size - 1) % strides + 1) >> 1;
            (height, width, radius(height), radius(width))
        }
        _ => {
            if height < kernel || width < kernel {
                return Err(anyhow!(
                    "avg_pool input {}x{} smaller than kernel {}",
                    width,
                    height,
                    kernel
                ));
            }
            (height - kernel + 1, width - kernel + 1, 0, 0)
        }
    };
    let out_height = height_end.div_ceil(strides);
    let out_width = width_end.div_ceil(strides);

    let mut out = Vec::with_capacity(out_height * out_width * channels);
    for y in (0..height_end).step_by(strides) {
        for x in (0..width_end).step_by(strides) {
            for ch in 0..channels {
                let mut sum = 0.0f32;
                let mut area = 0usize;
                for ky in 0..kernel {
                    let y_pos = (y + ky) as isize - height_radius as isize;
                    if y_pos < 0 || y_pos >= height as isize {
                        continue;
                    }
                    for kx in 0..kernel {
                        let x_pos = (x + kx) as isize - width_radius as isize;
                        if x_pos < 0 || x_pos >= width as isize {
                            continue;
                        }
                        area += 1;
                        sum += input.data[(y_pos as usize * width + x_pos as usize) * channels + ch];
                    }
                }
                out.push(if area > 0 { sum / area as f32 } else { 0.0 });
            }
        }
    }

    let dims = [1, out_height, out_width, channels];
    let data_type = input.data_type;
    write_output(operands, output, dims, data_type, out, ctx)
}
