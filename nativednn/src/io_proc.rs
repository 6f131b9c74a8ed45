use anyhow::{anyhow, Result};

use crate::frame::{Frame, PixelFormat};
use crate::operand::DataType;
use crate::runtime::FunctionType;

/// Read-only NHWC view of an output operand.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub data_type: DataType,
    pub data: &'a [f32],
}

/// Writable NHWC view of the input operand, already sized and zeroed.
#[derive(Debug)]
pub struct TensorViewMut<'a> {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub data_type: DataType,
    pub data: &'a mut [f32],
}

/// Converts frames into the model input and model outputs back into frames.
pub trait FrameProcessor: Send + Sync {
    fn pre_proc(&self, frame: &Frame, input: TensorViewMut<'_>) -> Result<()>;

    /// `frame` is the output frame for [`FunctionType::Process`] and the
    /// input frame for the analytics function types.
    fn post_proc(&self, output: TensorView<'_>, frame: &mut Frame, function: FunctionType) -> Result<()>;
}

/// Plain sample copy between packed frames and f32 tensors.
///
/// 8-bit formats are scaled into `[0, 1]` on the way in and rounded back on
/// the way out; float formats are copied unchanged. Analytics post-processing
/// is not provided.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFrameProcessor;

impl FrameProcessor for DefaultFrameProcessor {
    fn pre_proc(&self, frame: &Frame, input: TensorViewMut<'_>) -> Result<()> {
        if frame.width != input.width || frame.height != input.height {
            return Err(anyhow!(
                "frame is {}x{}, input tensor is {}x{}",
                frame.width,
                frame.height,
                input.width,
                input.height
            ));
        }
        check_channels(frame.format, input.channels)?;
        if frame.data.len() < frame.byte_len() {
            return Err(anyhow!(
                "{} frame holds {} bytes, {}x{} needs {}",
                frame.format,
                frame.data.len(),
                frame.width,
                frame.height,
                frame.byte_len()
            ));
        }

        let count = input.data.len();
        if frame.format.is_float() {
            for (dst, src) in input.data.iter_mut().zip(frame.to_f32()) {
                *dst = src;
            }
        } else {
            for (dst, src) in input.data.iter_mut().zip(&frame.data[..count]) {
                *dst = f32::from(*src) / 255.0;
            }
        }
        Ok(())
    }

    fn post_proc(&self, output: TensorView<'_>, frame: &mut Frame, function: FunctionType) -> Result<()> {
        if function != FunctionType::Process {
            return Err(anyhow!("no default post-processing for {:?}", function));
        }
        check_channels(frame.format, output.channels)?;
        frame.reshape(output.width, output.height);
        if frame.format.is_float() {
            frame.data = bytemuck::cast_slice(output.data).to_vec();
        } else {
            for (dst, src) in frame.data.iter_mut().zip(output.data) {
                *dst = (src * 255.0).round().clamp(0.0, 255.0) as u8;
            }
        }
        Ok(())
    }
}

fn check_channels(format: PixelFormat, channels: usize) -> Result<()> {
    if format.channels() != channels {
        return Err(anyhow!(
            "{} has {} channels, tensor has {}",
            format,
            format.channels(),
            channels
        ));
    }
    Ok(())
}
