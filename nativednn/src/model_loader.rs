use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use tracing::debug;

use crate::error::{DnnError, Result};
use crate::ops::{self, Layer, LayerKind};
use crate::operand::{calculate_data_length, DataType, Operand, OperandKind, MAX_OPERAND_NAME};

pub const MAGIC: &[u8; 15] = b"FFMPEGDNNNATIVE";
pub const MAJOR_VERSION: i32 = 1;
/// Magic plus major and minor version.
pub const HEADER_SIZE: usize = MAGIC.len() + 8;
/// Layer count and operand count at the end of the file.
pub const TRAILER_SIZE: usize = 8;
/// Layer type tag only.
const MIN_LAYER_RECORD: usize = 4;
/// Index, name length, type, data type and four dims with an empty name.
const MIN_OPERAND_RECORD: usize = 32;

/// Layers and operand templates parsed from one model file.
#[derive(Debug)]
pub struct ModelGraph {
    pub minor_version: i32,
    pub layers: Vec<Layer>,
    pub operands: Vec<Operand>,
}

impl ModelGraph {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        // SAFETY: the map is read-only and dropped before this function returns.
        let mmap = unsafe { Mmap::map(&file)? };
        Self::parse(&mmap[..])
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let file_size = data.len();
        if file_size < HEADER_SIZE + TRAILER_SIZE {
            return Err(DnnError::format("file too small for header and trailer"));
        }

        let mut header = ModelReader::new(&data[..HEADER_SIZE]);
        if header.read_bytes(MAGIC.len())? != MAGIC {
            return Err(DnnError::format("invalid magic"));
        }
        let major = header.read_i32()?;
        if major != MAJOR_VERSION {
            return Err(DnnError::UnsupportedVersion {
                found: major,
                expected: MAJOR_VERSION,
            });
        }
        let minor_version = header.read_i32()?;

        let mut trailer = ModelReader::new(&data[file_size - TRAILER_SIZE..]);
        let layers_num = trailer.read_count("layer count")?;
        let operands_num = trailer.read_count("operand count")?;

        let mut body = ModelReader::new(&data[HEADER_SIZE..file_size - TRAILER_SIZE]);
        body.ensure_records(layers_num, MIN_LAYER_RECORD, "layer")?;
        let mut layers = Vec::new();
        for _ in 0..layers_num {
            let raw = body.read_i32()?;
            let kind = LayerKind::from_raw(raw)
                .ok_or_else(|| DnnError::format(format!("unknown layer type {}", raw)))?;
            layers.push(ops::load_layer(kind, &mut body, operands_num)?);
        }

        body.ensure_records(operands_num, MIN_OPERAND_RECORD, "operand")?;
        let mut slots: Vec<Option<Operand>> = Vec::new();
        slots.resize_with(operands_num, || None);
        for _ in 0..operands_num {
            let index = body.read_operand_index(operands_num)?;
            let operand = read_operand(&mut body)?;
            if slots[index].replace(operand).is_some() {
                return Err(DnnError::format(format!("duplicate operand index {}", index)));
            }
        }
        let operands = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| DnnError::format(format!("operand {} is never defined", index)))
            })
            .collect::<Result<Vec<_>>>()?;

        let parsed = HEADER_SIZE + body.position() + TRAILER_SIZE;
        if parsed != file_size {
            return Err(DnnError::SizeMismatch { parsed, file_size });
        }

        debug!(
            layers = layers.len(),
            operands = operands.len(),
            minor_version,
            "parsed native model"
        );
        Ok(Self {
            minor_version,
            layers,
            operands,
        })
    }

    pub fn operand_index(&self, name: &str) -> Option<usize> {
        self.operands.iter().position(|operand| operand.name == name)
    }
}

fn read_operand(reader: &mut ModelReader<'_>) -> Result<Operand> {
    let name_len = reader.read_count("operand name length")?;
    let name = decode_name(reader.read_bytes(name_len)?);

    let raw_kind = reader.read_i32()?;
    let kind = OperandKind::from_raw(raw_kind)
        .ok_or_else(|| DnnError::format(format!("operand \"{}\" has unknown type {}", name, raw_kind)))?;
    let raw_dtype = reader.read_i32()?;
    let data_type = DataType::from_raw(raw_dtype).ok_or_else(|| {
        DnnError::format(format!("operand \"{}\" has unknown data type {}", name, raw_dtype))
    })?;
    let mut dims = [0i32; 4];
    for dim in dims.iter_mut() {
        *dim = reader.read_i32()?;
    }
    if kind == OperandKind::Input && dims[0] != 1 {
        return Err(DnnError::format(format!(
            "input operand \"{}\" has batch {}, expected 1",
            name, dims[0]
        )));
    }

    let mut operand = Operand::new(name, kind, data_type, dims);
    if dims.iter().all(|dim| *dim > 0) {
        operand.length = calculate_data_length(&dims).ok_or_else(|| DnnError::LengthOverflow {
            name: operand.name.clone(),
        })?;
    }
    Ok(operand)
}

fn decode_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    let mut name = &bytes[..end];
    if name.len() > MAX_OPERAND_NAME {
        name = &name[..MAX_OPERAND_NAME];
    }
    String::from_utf8_lossy(name).into_owned()
}

/// Little-endian cursor over one section of a model file.
pub(crate) struct ModelReader<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> ModelReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.cursor
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// Fail unless `count` records of at least `min_size` bytes can still fit.
    pub(crate) fn ensure_records(&self, count: usize, min_size: usize, what: &str) -> Result<()> {
        let fits = count
            .checked_mul(min_size)
            .map_or(false, |needed| needed <= self.remaining());
        if !fits {
            return Err(DnnError::format(format!(
                "{} {} records cannot fit in the remaining {} bytes",
                count,
                what,
                self.remaining()
            )));
        }
        Ok(())
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .cursor
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| DnnError::format("unexpected end of model data"))?;
        let out = &self.data[self.cursor..end];
        self.cursor = end;
        Ok(out)
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.read_bytes(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_f32(&mut self) -> Result<f32> {
        let bytes = self.read_bytes(4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_f32_vec(&mut self, count: usize) -> Result<Vec<f32>> {
        let len = count
            .checked_mul(4)
            .ok_or_else(|| DnnError::format("tensor payload too large"))?;
        let bytes = self.read_bytes(len)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }

    pub(crate) fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_i32()? != 0)
    }

    /// Non-negative 32-bit count.
    pub(crate) fn read_count(&mut self, what: &str) -> Result<usize> {
        let value = self.read_i32()?;
        usize::try_from(value).map_err(|_| DnnError::format(format!("negative {}: {}", what, value)))
    }

    /// Strictly positive 32-bit value.
    pub(crate) fn read_positive(&mut self, what: &str) -> Result<usize> {
        match self.read_count(what)? {
            0 => Err(DnnError::format(format!("{} must be positive", what))),
            value => Ok(value),
        }
    }

    pub(crate) fn read_operand_index(&mut self, operands_num: usize) -> Result<usize> {
        let value = self.read_i32()?;
        usize::try_from(value)
            .ok()
            .filter(|index| *index < operands_num)
            .ok_or_else(|| {
                DnnError::format(format!(
                    "operand index {} out of range ({} operands)",
                    value, operands_num
                ))
            })
    }
}
