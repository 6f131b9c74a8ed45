use crate::error::Result;
use crate::model_loader::ModelReader;
use crate::ops::{single_input, write_output, Layer, LayerContext, LayerParams};
use crate::operand::Operand;

#[derive(Debug, Clone)]
pub struct MaximumParams {
    pub value: f32,
}

pub fn load(reader: &mut ModelReader<'_>, operands_num: usize) -> Result<Layer> {
    let value = reader.read_f32()?;
    let input = reader.read_operand_index(operands_num)?;
    let output = reader.read_operand_index(operands_num)?;
    Ok(Layer::new(LayerParams::Maximum(MaximumParams { value }), vec![input], output))
}

pub fn exec(
    operands: &mut [Operand],
    inputs: &[usize],
    output: usize,
    params: &MaximumParams,
    ctx: &LayerContext,
) -> anyhow::Result<()> {
    let input = &operands[single_input(inputs)?];
    let dims = input.dims.map(|dim| dim.max(0) as usize);
    let data_type = input.data_type;
    let out = input
        .data()?
        .iter()
        .map(|x| x.max(params.value))
        .collect::<Vec<_>>();
    write_output(operands, output, dims, data_type, out, ctx)
}
