use crate::error::Result;
use crate::model_loader::ModelReader;
use crate::ops::{single_input, write_output, Layer, LayerContext, LayerParams};
use crate::operand::Operand;

pub fn load(reader: &mut ModelReader<'_>, operands_num: usize) -> Result<Layer> {
    let input = reader.read_operand_index(operands_num)?;
    let output = reader.read_operand_index(operands_num)?;
    Ok(Layer::new(LayerParams::Identity, vec![input], output))
}

/// Copy the input operand into the output operand.
pub fn exec(
    operands: &mut [Operand],
    inputs: &[usize],
    output: usize,
    ctx: &LayerContext,
) -> anyhow::Result<()> {
    let input = &operands[single_input(inputs)?];
    let dims = input.dims.map(|dim| dim.max(0) as usize);
    let data_type = input.data_type;
    let data = input.data()?.to_vec();
    write_output(operands, output, dims, data_type, data, ctx)
}
