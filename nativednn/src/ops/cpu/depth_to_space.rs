use anyhow::anyhow;

use crate::error::Result;
use crate::model_loader::ModelReader;
use crate::ops::{nhwc_input, single_input, write_output, Layer, LayerContext, LayerParams};
use crate::operand::Operand;

#[derive(Debug, Clone)]
pub struct DepthToSpaceParams {
    pub block_size: usize,
}

pub fn load(reader: &mut ModelReader<'_>, operands_num: usize) -> Result<Layer> {
    let block_size = reader.read_positive("depth_to_space block_size")?;
    let input = reader.read_operand_index(operands_num)?;
    let output = reader.read_operand_index(operands_num)?;
    Ok(Layer::new(
        LayerParams::DepthToSpace(DepthToSpaceParams { block_size }),
        vec![input],
        output,
    ))
}

/// Move channel blocks into `block_size x block_size` spatial tiles.
pub fn exec(
    operands: &mut [Operand],
    inputs: &[usize],
    output: usize,
    params: &DepthToSpaceParams,
    ctx: &LayerContext,
) -> anyhow::Result<()> {
    let input = nhwc_input(operands, single_input(inputs)?)?;
    let block = params.block_size;
    let block_area = block * block;
    if input.channels % block_area != 0 {
        return Err(anyhow!(
            "depth_to_space: {} channels not divisible by block area {}",
            input.channels,
            block_area
        ));
    }
    let new_channels = input.channels / block_area;
    let out_width = input.width * block;
    let mut out = vec![0.0f32; input.data.len()];

    for y in 0..input.height {
        for x in 0..input.width {
            let src = &input.data[(y * input.width + x) * input.channels..][..input.channels];
            for by in 0..block {
                for bx in 0..block {
                    let from = (by * block + bx) * new_channels;
                    let to = ((y * block + by) * out_width + x * block + bx) * new_channels;
                    out[to..to + new_channels].copy_from_slice(&src[from..from + new_channels]);
                }
            }
        }
    }

    let dims = [1, input.height * block, out_width, new_channels];
    let data_type = input.data_type;
    write_output(operands, output, dims, data_type, out, ctx)
}
