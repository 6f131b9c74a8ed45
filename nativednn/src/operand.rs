use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::anyhow;

use crate::error::{DnnError, Result};

/// Longest operand name kept from a model file, in bytes.
pub const MAX_OPERAND_NAME: usize = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    Input,
    Output,
    Intermediate,
}

impl OperandKind {
    pub(crate) fn from_raw(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Input),
            2 => Some(Self::Output),
            3 => Some(Self::Intermediate),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Self::Input => 1,
            Self::Output => 2,
            Self::Intermediate => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Float,
    Uint8,
}

impl DataType {
    pub(crate) fn from_raw(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Float),
            4 => Some(Self::Uint8),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Self::Float => 1,
            Self::Uint8 => 4,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Float => write!(f, "float"),
            DataType::Uint8 => write!(f, "uint8"),
        }
    }
}

/// Counts buffer allocations and releases for one model.
#[derive(Debug, Default)]
pub struct BufferAccounting {
    allocated: AtomicUsize,
    released: AtomicUsize,
}

impl BufferAccounting {
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.allocated().saturating_sub(self.released())
    }
}

/// Backing storage of one operand; returned to the accounting on drop.
pub struct TensorBuffer {
    data: Vec<f32>,
    accounting: Arc<BufferAccounting>,
}

impl TensorBuffer {
    pub(crate) fn new(data: Vec<f32>, accounting: &Arc<BufferAccounting>) -> Self {
        accounting.allocated.fetch_add(1, Ordering::SeqCst);
        Self {
            data,
            accounting: accounting.clone(),
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

impl Drop for TensorBuffer {
    fn drop(&mut self) {
        self.accounting.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for TensorBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorBuffer")
            .field("len", &self.data.len())
            .finish()
    }
}

/// A named NHWC tensor descriptor plus its optional data.
#[derive(Debug)]
pub struct Operand {
    pub name: String,
    pub kind: OperandKind,
    pub data_type: DataType,
    pub dims: [i32; 4],
    pub is_nhwc: bool,
    /// Byte length for the current dims, 0 while dims are unresolved.
    pub length: usize,
    data: Option<TensorBuffer>,
}

impl Operand {
    pub fn new(name: impl Into<String>, kind: OperandKind, data_type: DataType, dims: [i32; 4]) -> Self {
        Self {
            name: name.into(),
            kind,
            data_type,
            dims,
            is_nhwc: true,
            length: 0,
            data: None,
        }
    }

    /// Copy of the descriptor without data.
    pub fn descriptor(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind,
            data_type: self.data_type,
            dims: self.dims,
            is_nhwc: self.is_nhwc,
            length: self.length,
            data: None,
        }
    }

    pub fn height(&self) -> i32 {
        self.dims[1]
    }

    pub fn width(&self) -> i32 {
        self.dims[2]
    }

    pub fn channels(&self) -> i32 {
        self.dims[3]
    }

    pub fn element_count(&self) -> usize {
        self.dims
            .iter()
            .map(|dim| (*dim).max(0) as usize)
            .product()
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn data(&self) -> anyhow::Result<&[f32]> {
        self.data
            .as_ref()
            .map(TensorBuffer::as_slice)
            .ok_or_else(|| anyhow!("operand \"{}\" has no data", self.name))
    }

    pub fn data_mut(&mut self) -> anyhow::Result<&mut [f32]> {
        let name = &self.name;
        self.data
            .as_mut()
            .map(TensorBuffer::as_mut_slice)
            .ok_or_else(|| anyhow!("operand \"{}\" has no data", name))
    }

    /// Set new dims and recompute the byte length; fails on overflow.
    pub fn resize(&mut self, dims: [i32; 4]) -> Result<usize> {
        self.dims = dims;
        self.length = calculate_data_length(&self.dims).ok_or_else(|| DnnError::LengthOverflow {
            name: self.name.clone(),
        })?;
        Ok(self.length)
    }

    /// Replace the buffer with `data`, which must match the current length.
    pub fn install(&mut self, data: Vec<f32>, accounting: &Arc<BufferAccounting>) -> anyhow::Result<()> {
        if data.len() * std::mem::size_of::<f32>() != self.length {
            return Err(anyhow!(
                "operand \"{}\" expects {} bytes, got {}",
                self.name,
                self.length,
                data.len() * std::mem::size_of::<f32>()
            ));
        }
        self.data = Some(TensorBuffer::new(data, accounting));
        Ok(())
    }

    /// Replace the buffer with a zeroed one of the current length.
    pub fn alloc_zeroed(&mut self, accounting: &Arc<BufferAccounting>) -> &mut [f32] {
        let count = self.length / std::mem::size_of::<f32>();
        self.data
            .insert(TensorBuffer::new(vec![0.0; count], accounting))
            .as_mut_slice()
    }

    pub fn release(&mut self) {
        self.data = None;
    }
}

/// Byte length of an f32 tensor with `dims`, or `None` when a dim is not
/// positive or the length exceeds `i32::MAX`.
pub fn calculate_data_length(dims: &[i32; 4]) -> Option<usize> {
    let mut len = std::mem::size_of::<f32>() as u64;
    for dim in dims {
        if *dim <= 0 {
            return None;
        }
        len *= *dim as u64;
        if len > i32::MAX as u64 {
            return None;
        }
    }
    Some(len as usize)
}
