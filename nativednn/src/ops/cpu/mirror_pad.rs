use anyhow::anyhow;

use crate::error::{DnnError, Result};
use crate::model_loader::ModelReader;
use crate::ops::{nhwc_input, output_elements, single_input, write_output, Layer, LayerContext, LayerParams};
use crate::operand::Operand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadMode {
    Reflect,
    Symmetric,
    Constant,
}

impl PadMode {
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Reflect),
            1 => Some(Self::Symmetric),
            2 => Some(Self::Constant),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Self::Reflect => 0,
            Self::Symmetric => 1,
            Self::Constant => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MirrorPadParams {
    pub mode: PadMode,
    /// `(before, after)` per NHWC axis.
    pub paddings: [[usize; 2]; 4],
    pub constant_value: f32,
}

pub fn load(reader: &mut ModelReader<'_>, operands_num: usize) -> Result<Layer> {
    let raw_mode = reader.read_i32()?;
    let mode = PadMode::from_raw(raw_mode)
        .ok_or_else(|| DnnError::format(format!("pad mode {}", raw_mode)))?;
    let mut paddings = [[0usize; 2]; 4];
    for axis in paddings.iter_mut() {
        for side in axis.iter_mut() {
            *side = reader.read_count("padding")?;
        }
    }
    let input = reader.read_operand_index(operands_num)?;
    let output = reader.read_operand_index(operands_num)?;
    let params = MirrorPadParams {
        mode,
        paddings,
        constant_value: 0.0,
    };
    Ok(Layer::new(LayerParams::MirrorPad(params), vec![input], output))
}

pub fn exec(
    operands: &mut [Operand],
    inputs: &[usize],
    output: usize,
    params: &MirrorPadParams,
    ctx: &LayerContext,
) -> anyhow::Result<()> {
    if params.paddings[0] != [0, 0] {
        return Err(anyhow!("padding along the batch axis is not supported"));
    }
    let input = nhwc_input(operands, single_input(inputs)?)?;
    let sizes = [input.height, input.width, input.channels];
    for (axis, size) in sizes.iter().enumerate() {
        let [before, after] = params.paddings[axis + 1];
        let limit = match params.mode {
            PadMode::Reflect => size.saturating_sub(1),
            PadMode::Symmetric => *size,
            PadMode::Constant => usize::MAX,
        };
        if before > limit || after > limit {
            return Err(anyhow!(
                "{:?} padding ({}, {}) too large for axis {} of size {}",
                params.mode,
                before,
                after,
                axis + 1,
                size
            ));
        }
    }

    let mut out_dims = [0usize; 3];
    for (axis, dim) in out_dims.iter_mut().enumerate() {
        let [before, after] = params.paddings[axis + 1];
        *dim = sizes[axis]
            .checked_add(before)
            .and_then(|dim| dim.checked_add(after))
            .ok_or_else(|| anyhow!("padded axis {} overflows", axis + 1))?;
    }
    let dims = [1, out_dims[0], out_dims[1], out_dims[2]];
    let mut out = Vec::with_capacity(output_elements(dims)?);
    for y in 0..out_dims[0] {
        let src_y = source_index(y, params.paddings[1][0], sizes[0], params.mode);
        for x in 0..out_dims[1] {
            let src_x = source_index(x, params.paddings[2][0], sizes[1], params.mode);
            for c in 0..out_dims[2] {
                let src_c = source_index(c, params.paddings[3][0], sizes[2], params.mode);
                let value = match (src_y, src_x, src_c) {
                    (Some(sy), Some(sx), Some(sc)) => {
                        input.data[(sy * input.width + sx) * input.channels + sc]
                    }
                    _ => params.constant_value,
                };
                out.push(value);
            }
        }
    }

    let data_type = input.data_type;
    write_output(operands, output, dims, data_type, out, ctx)
}

/// Map an output coordinate back into the input axis; `None` selects the
/// constant value.
fn source_index(pos: usize, before: usize, size: usize, mode: PadMode) -> Option<usize> {
    let offset = pos as isize - before as isize;
    let size = size as isize;
    if (0..size).contains(&offset) {
        return Some(offset as usize);
    }
    let mapped = match mode {
        PadMode::Constant => return None,
        PadMode::Reflect if offset < 0 => -offset,
        PadMode::Reflect => 2 * size - 2 - offset,
        PadMode::Symmetric if offset < 0 => -offset - 1,
        PadMode::Symmetric => 2 * size - 1 - offset,
    };
    Some(mapped as usize)
}
