//! NRRD reader for three-dimensional scalar volumes.
//!
//! Supports attached and detached data with `raw`, `gzip` and `text`
//! encodings. Samples are stored fastest axis first; the decoded array is
//! indexed `[i0, i1, i2]` and then has axes 1 and 2 swapped, like every
//! other format.

use super::CodecError;
use crate::enums::{ByteOrder, ElementType};
use crate::volume::VolumeStack;

use flate2::read::GzDecoder;
use ndarray::{Array3, ShapeBuilder};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Encoding {
    Raw,
    Gzip,
    Text,
}

/// Header fields of an NRRD file, keyed by lower-cased field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NrrdHeader {
    fields: BTreeMap<String, String>,
}

fn nrrd_error(message: impl Into<String>) -> CodecError {
    CodecError::Nrrd(message.into())
}

impl NrrdHeader {
    /// Parse the header at the start of `bytes`, returning it with the
    /// offset of the first data byte.
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize), CodecError> {
        let mut fields = BTreeMap::new();
        let mut offset = 0;
        let mut first = true;
        while offset < bytes.len() {
            let end = bytes[offset..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(bytes.len(), |i| offset + i);
            let line = std::str::from_utf8(&bytes[offset..end])
                .map_err(|_| nrrd_error("header is not valid UTF-8"))?
                .trim_end_matches('\r');
            offset = (end + 1).min(bytes.len());

            if first {
                if !line.starts_with("NRRD") {
                    return Err(nrrd_error("missing NRRD magic"));
                }
                first = false;
                continue;
            }
            if line.is_empty() {
                break;
            }
            if line.starts_with('#') || line.contains(":=") {
                continue;
            }
            let Some((key, value)) = line.split_once(": ") else {
                return Err(nrrd_error(format!("malformed header line '{line}'")));
            };
            fields.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
        if first {
            return Err(nrrd_error("empty file"));
        }
        Ok((Self { fields }, offset))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> Result<&str, CodecError> {
        self.get(key)
            .ok_or_else(|| nrrd_error(format!("missing field '{key}'")))
    }

    pub fn sizes(&self) -> Result<[usize; 3], CodecError> {
        let dimension = self.require("dimension")?;
        if dimension.trim() != "3" {
            return Err(nrrd_error(format!("only 3D volumes are supported, found {dimension}")));
        }
        let sizes = self
            .require("sizes")?
            .split_whitespace()
            .map(|s| s.parse::<usize>().map_err(|_| nrrd_error(format!("bad size '{s}'"))))
            .collect::<Result<Vec<_>, _>>()?;
        match sizes.as_slice() {
            &[a, b, c] if a > 0 && b > 0 && c > 0 => Ok([a, b, c]),
            _ => Err(nrrd_error(format!("bad sizes {sizes:?}"))),
        }
    }

    pub fn element_type(&self) -> Result<ElementType, CodecError> {
        let name = self.require("type")?;
        let element_type = match name.to_ascii_lowercase().as_str() {
            "signed char" | "int8" | "int8_t" => ElementType::I8,
            "uchar" | "unsigned char" | "uint8" | "uint8_t" => ElementType::U8,
            "short" | "short int" | "signed short" | "signed short int" | "int16" | "int16_t" => {
                ElementType::I16
            }
            "ushort" | "unsigned short" | "unsigned short int" | "uint16" | "uint16_t" => {
                ElementType::U16
            }
            "int" | "signed int" | "int32" | "int32_t" => ElementType::I32,
            "uint" | "unsigned int" | "uint32" | "uint32_t" => ElementType::U32,
            "longlong" | "long long" | "long long int" | "signed long long"
            | "signed long long int" | "int64" | "int64_t" => ElementType::I64,
            "ulonglong" | "unsigned long long" | "unsigned long long int" | "uint64"
            | "uint64_t" => ElementType::U64,
            "float" => ElementType::F32,
            "double" => ElementType::F64,
            _ => return Err(CodecError::UnknownElementType(name.to_string())),
        };
        Ok(element_type)
    }

    fn encoding(&self) -> Result<Encoding, CodecError> {
        match self.require("encoding")?.to_ascii_lowercase().as_str() {
            "raw" => Ok(Encoding::Raw),
            "gzip" | "gz" => Ok(Encoding::Gzip),
            "text" | "txt" | "ascii" => Ok(Encoding::Text),
            other => Err(nrrd_error(format!("unsupported encoding '{other}'"))),
        }
    }

    fn byte_order(&self) -> ByteOrder {
        match self.get("endian") {
            Some(endian) if endian.eq_ignore_ascii_case("big") => ByteOrder::Big,
            _ => ByteOrder::Little,
        }
    }

    /// Per-axis spacing: the magnitude of each direction vector's diagonal
    /// entry, else the `spacings` field.
    pub fn spacing(&self) -> Option<[f64; 3]> {
        if let Some(directions) = self.get("space directions") {
            let vectors: Vec<Vec<f64>> = directions
                .split_whitespace()
                .filter(|v| *v != "none")
                .map(|v| {
                    v.trim_matches(|c| c == '(' || c == ')')
                        .split(',')
                        .filter_map(|n| n.trim().parse::<f64>().ok())
                        .collect()
                })
                .collect();
            if vectors.len() == 3 && vectors.iter().all(|v| v.len() == 3) {
                return Some([vectors[0][0].abs(), vectors[1][1].abs(), vectors[2][2].abs()]);
            }
        }
        let spacings: Vec<f64> = self
            .get("spacings")?
            .split_whitespace()
            .filter_map(|s| s.parse().ok())
            .collect();
        spacings.try_into().ok()
    }
}

/// Read an `.nrrd`/`.nrd` volume.
pub fn read(path: &Path) -> Result<VolumeStack, CodecError> {
    let contents = fs::read(path)?;
    let (header, data_offset) = NrrdHeader::parse(&contents)?;
    let sizes = header.sizes()?;
    let element_type = header.element_type()?;
    let encoding = header.encoding()?;

    match header.get("byte skip").map(str::trim) {
        None | Some("0") => {}
        Some(skip) => return Err(nrrd_error(format!("byte skip {skip} is not supported"))),
    }

    let detached = header.get("data file").or_else(|| header.get("datafile"));
    let payload = match detached {
        Some(name) => {
            let data_path = path.parent().unwrap_or_else(|| Path::new("")).join(name);
            if !data_path.is_file() {
                return Err(CodecError::FileNotFound { path: data_path });
            }
            fs::read(data_path)?
        }
        None => contents[data_offset..].to_vec(),
    };

    let count = sizes
        .iter()
        .try_fold(1usize, |acc, s| acc.checked_mul(*s))
        .ok_or_else(|| nrrd_error(format!("sizes {sizes:?} are too large")))?;
    let samples = match encoding {
        Encoding::Raw => decode_binary(&payload, count, element_type, header.byte_order())?,
        Encoding::Gzip => {
            let mut inflated = Vec::new();
            GzDecoder::new(payload.as_slice()).read_to_end(&mut inflated)?;
            decode_binary(&inflated, count, element_type, header.byte_order())?
        }
        Encoding::Text => decode_text(&payload, count)?,
    };

    let [s0, s1, s2] = sizes;
    let mut data = Array3::from_shape_vec((s0, s1, s2).f(), samples)
        .map_err(|err| nrrd_error(err.to_string()))?;
    data.swap_axes(1, 2);
    let data = data.as_standard_layout().into_owned();

    let stack = VolumeStack::new(data, element_type);
    Ok(match header.spacing() {
        Some(spacing) => stack.with_spacing(spacing),
        None => stack,
    })
}

fn decode_binary(
    bytes: &[u8],
    count: usize,
    element_type: ElementType,
    order: ByteOrder,
) -> Result<Vec<f64>, CodecError> {
    let expected = count
        .checked_mul(element_type.size())
        .ok_or_else(|| nrrd_error(format!("{count} samples are too large")))?;
    if bytes.len() < expected {
        return Err(CodecError::RawSizeMismatch {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(bytes[..expected]
        .chunks_exact(element_type.size())
        .map(|chunk| element_type.read(chunk, order))
        .collect())
}

fn decode_text(bytes: &[u8], count: usize) -> Result<Vec<f64>, CodecError> {
    let text = std::str::from_utf8(bytes).map_err(|_| nrrd_error("text data is not UTF-8"))?;
    let samples = text
        .split_whitespace()
        .take(count)
        .map(|s| s.parse::<f64>().map_err(|_| nrrd_error(format!("bad sample '{s}'"))))
        .collect::<Result<Vec<_>, _>>()?;
    if samples.len() != count {
        return Err(nrrd_error(format!("expected {count} samples, found {}", samples.len())));
    }
    Ok(samples)
}
