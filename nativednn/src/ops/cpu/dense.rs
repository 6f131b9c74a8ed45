use anyhow::anyhow;

use crate::error::{DnnError, Result};
use crate::model_loader::ModelReader;
use crate::ops::{
    nhwc_input, output_elements, single_input, write_output, Activation, Layer, LayerContext,
    LayerParams,
};
use crate::operand::Operand;

#[derive(Debug, Clone)]
pub struct DenseParams {
    pub input_num: usize,
    pub output_num: usize,
    pub activation: Activation,
    /// `[output_num][input_num]`
    pub kernel: Vec<f32>,
    pub biases: Option<Vec<f32>>,
}

pub fn load(reader: &mut ModelReader<'_>, operands_num: usize) -> Result<Layer> {
    let raw_activation = reader.read_i32()?;
    let activation = Activation::from_raw(raw_activation)
        .ok_or_else(|| DnnError::format(format!("dense activation {}", raw_activation)))?;
    let input_num = reader.read_positive("dense input_num")?;
    let output_num = reader.read_positive("dense output_num")?;
    let has_bias = reader.read_bool()?;
    let weights = input_num
        .checked_mul(output_num)
        .ok_or_else(|| DnnError::format("dense kernel too large"))?;
    let kernel = reader.read_f32_vec(weights)?;
    let biases = if has_bias {
        Some(reader.read_f32_vec(output_num)?)
    } else {
        None
    };
    let input = reader.read_operand_index(operands_num)?;
    let output = reader.read_operand_index(operands_num)?;
    let params = DenseParams {
        input_num,
        output_num,
        activation,
        kernel,
        biases,
    };
    Ok(Layer::new(LayerParams::Dense(params), vec![input], output))
}

/// Fully connected over the channel axis of every pixel.
pub fn exec(
    operands: &mut [Operand],
    inputs: &[usize],
    output: usize,
    params: &DenseParams,
    ctx: &LayerContext,
) -> anyhow::Result<()> {
    let input = nhwc_input(operands, single_input(inputs)?)?;
    if input.channels != params.input_num {
        return Err(anyhow!(
            "dense expects {} input channels, operand has {}",
            params.input_num,
            input.channels
        ));
    }

    let dims = [1, input.height, input.width, params.output_num];
    let mut out = Vec::with_capacity(output_elements(dims)?);
    for pixel in input.data.chunks_exact(params.input_num) {
        for (filter, weights) in params.kernel.chunks_exact(params.input_num).enumerate() {
            let bias = params
                .biases
                .as_ref()
                .map(|biases| biases[filter])
                .unwrap_or(0.0);
            let acc = pixel
                .iter()
                .zip(weights)
                .fold(bias, |acc, (x, w)| acc + x * w);
            out.push(params.activation.apply(acc));
        }
    }

    let data_type = input.data_type;
    write_output(operands, output, dims, data_type, out, ctx)
}
