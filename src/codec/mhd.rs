//! MetaImage (`.mhd` header + `.raw` payload) reading and writing.
//!
//! The header grammar is deliberately loose: keys are the leading
//! identifier of each line, lower-cased; values are whatever follows the
//! first `=`. A value made only of digits, spaces and dots is parsed as a
//! number or a list of numbers, anything else is kept as text.
//!
//! Byte order quirk: samples are little-endian unless the header carries a
//! `byteorder` key whose value is `true` (any case). `ElementByteOrderMSB`
//! is round-tripped through the header but never consulted when reading.

use super::{CodecError, spacing_to_ratio};
use crate::enums::{ByteOrder, ElementType};
use crate::volume::VolumeStack;

use ndarray::Array3;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Fields the writer keeps, in output order, with their on-disk spelling.
const WRITTEN_FIELDS: &[(&str, &str)] = &[
    ("ndims", "NDims"),
    ("datatype", "DataType"),
    ("dimsize", "DimSize"),
    ("elementsize", "ElementSize"),
    ("elementspacing", "ElementSpacing"),
    ("elementtype", "ElementType"),
    ("elementbyteordermsb", "ElementByteOrderMSB"),
    ("elementdatafile", "ElementDataFile"),
];

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Text(String),
    Number(f64),
    List(Vec<f64>),
}

impl HeaderValue {
    fn parse(raw: &str) -> Result<Self, CodecError> {
        if raw.chars().any(|c| !(c.is_ascii_digit() || c == ' ' || c == '.')) {
            return Ok(HeaderValue::Text(raw.to_string()));
        }
        let mut numbers = raw
            .split(' ')
            .filter(|token| !token.is_empty())
            .map(|token| {
                token.parse::<f64>().map_err(|_| {
                    CodecError::MalformedHeader(format!("'{token}' is not a number"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if numbers.len() == 1 {
            return Ok(HeaderValue::Number(numbers.remove(0)));
        }
        Ok(HeaderValue::List(numbers))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_numbers(&self) -> Option<Vec<f64>> {
        match self {
            HeaderValue::Number(n) => Some(vec![*n]),
            HeaderValue::List(list) => Some(list.clone()),
            HeaderValue::Text(_) => None,
        }
    }

    fn render(&self, integers: bool) -> String {
        let number = |n: f64| {
            if integers {
                format!("{}", n.round() as i64)
            } else {
                format!("{n}")
            }
        };
        match self {
            HeaderValue::Text(text) => text.clone(),
            HeaderValue::Number(n) => number(*n),
            HeaderValue::List(list) => list.iter().map(|n| number(*n)).collect::<Vec<_>>().join(" "),
        }
    }
}

/// Parsed key/value content of an `.mhd` header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MhdHeader {
    fields: BTreeMap<String, HeaderValue>,
}

impl MhdHeader {
    pub fn parse(contents: &str) -> Result<Self, CodecError> {
        let mut fields = BTreeMap::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let key_len = line
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(line.len());
            if key_len == 0 {
                continue;
            }
            let key = line[..key_len].to_ascii_lowercase();
            let Some((_, value)) = line.split_once('=') else {
                return Err(CodecError::MalformedHeader(format!(
                    "no value for key '{key}'"
                )));
            };
            fields.insert(key, HeaderValue::parse(value.trim())?);
        }
        Ok(Self { fields })
    }

    pub fn read_file(path: &Path) -> Result<Self, CodecError> {
        if !path.is_file() {
            return Err(CodecError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let header = Self::parse(&fs::read_to_string(path)?)?;
        if header.fields.is_empty() {
            return Err(CodecError::MalformedHeader(
                "no data extracted from header file".into(),
            ));
        }
        Ok(header)
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: &str, value: HeaderValue) {
        self.fields.insert(key.to_ascii_lowercase(), value);
    }

    /// `dimsize`, rounded to integers, in on-disk (fastest first) order.
    pub fn dim_size(&self) -> Result<[usize; 3], CodecError> {
        let numbers = self
            .get("dimsize")
            .and_then(HeaderValue::as_numbers)
            .ok_or_else(|| CodecError::MalformedHeader("missing dimsize".into()))?;
        let dims: Vec<usize> = numbers.iter().map(|d| d.round() as usize).collect();
        match dims.as_slice() {
            &[a, b, c] if a > 0 && b > 0 && c > 0 => Ok([a, b, c]),
            _ => Err(CodecError::MalformedHeader(format!(
                "dimsize must hold three positive sizes, found {numbers:?}"
            ))),
        }
    }

    pub fn data_file(&self) -> Result<&str, CodecError> {
        self.get("elementdatafile")
            .and_then(HeaderValue::as_text)
            .ok_or_else(|| CodecError::MalformedHeader("missing elementdatafile".into()))
    }

    pub fn byte_order(&self) -> ByteOrder {
        match self.get("byteorder") {
            Some(HeaderValue::Text(flag)) if flag.eq_ignore_ascii_case("true") => ByteOrder::Big,
            _ => ByteOrder::Little,
        }
    }

    /// Resolve `datatype`, falling back to `elementtype`.
    pub fn element_type(&self) -> Result<ElementType, CodecError> {
        let datatype = self.get("datatype").and_then(HeaderValue::as_text);
        if let Some(element_type) = datatype.and_then(element_type_from_datatype) {
            return Ok(element_type);
        }
        let elementtype = self.get("elementtype").and_then(HeaderValue::as_text);
        if elementtype.is_some_and(|name| name.eq_ignore_ascii_case("met_short")) {
            return Ok(ElementType::I16);
        }
        let found = datatype.or(elementtype).unwrap_or("<none>");
        Err(CodecError::UnknownElementType(found.to_string()))
    }

    pub fn check_header_size(&self) -> Result<(), CodecError> {
        match self.get("headersize") {
            Some(HeaderValue::Number(size)) if *size > 0.0 => {
                Err(CodecError::UnsupportedHeaderEmbedding(*size as usize))
            }
            _ => Ok(()),
        }
    }

    pub fn spacing(&self) -> Option<[f64; 3]> {
        let numbers = self.get("elementspacing")?.as_numbers()?;
        numbers.try_into().ok()
    }

    /// Render the allow-listed fields, one `Key = value` per line.
    pub fn to_header_text(&self) -> String {
        let mut out = String::new();
        for (key, name) in WRITTEN_FIELDS {
            if let Some(value) = self.fields.get(*key) {
                let integers = matches!(*key, "ndims" | "dimsize");
                let _ = writeln!(out, "{name} = {}", value.render(integers));
            }
        }
        out
    }
}

fn element_type_from_datatype(name: &str) -> Option<ElementType> {
    match name.to_ascii_lowercase().as_str() {
        "float" => Some(ElementType::F32),
        "double" => Some(ElementType::F64),
        "long" => Some(ElementType::I32),
        "ulong" => Some(ElementType::U32),
        "char" => Some(ElementType::I8),
        "uchar" => Some(ElementType::U8),
        "short" => Some(ElementType::I16),
        "ushort" => Some(ElementType::U16),
        "int" => Some(ElementType::I32),
        "uint" => Some(ElementType::U32),
        _ => None,
    }
}

fn datatype_name(element_type: ElementType) -> Option<&'static str> {
    match element_type {
        ElementType::F32 => Some("float"),
        ElementType::F64 => Some("double"),
        ElementType::I8 => Some("char"),
        ElementType::U8 => Some("uchar"),
        ElementType::I16 => Some("short"),
        ElementType::U16 => Some("ushort"),
        ElementType::I32 => Some("int"),
        ElementType::U32 => Some("uint"),
        ElementType::I64 | ElementType::U64 => None,
    }
}

fn raw_path(header_path: &Path, data_file: &str) -> PathBuf {
    header_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(data_file)
}

/// Read an `.mhd` header and its raw payload into a canonical stack.
pub fn read(path: &Path) -> Result<VolumeStack, CodecError> {
    let header = MhdHeader::read_file(path)?;
    let dims = header.dim_size()?;
    let data_file = header.data_file()?;
    header.check_header_size()?;
    let order = header.byte_order();
    let element_type = header.element_type()?;

    let raw = raw_path(path, data_file);
    if !raw.is_file() {
        return Err(CodecError::FileNotFound { path: raw });
    }
    log::debug!("Reading {element_type:?} {order:?} samples {dims:?} from {raw:?}");
    let bytes = fs::read(&raw)?;
    let data = unpack(&bytes, dims, element_type, order)?;

    let ratios = header.spacing().and_then(spacing_to_ratio);
    if ratios.is_none() {
        log::info!("No usable element spacing in {path:?}, using default axis ratios");
    }
    Ok(VolumeStack::new(data, element_type).with_spacing_ratios(ratios))
}

fn unpack(
    bytes: &[u8],
    dims: [usize; 3],
    element_type: ElementType,
    order: ByteOrder,
) -> Result<Array3<f64>, CodecError> {
    let [d0, d1, d2] = dims;
    let expected = dims
        .iter()
        .try_fold(element_type.size(), |acc, d| acc.checked_mul(*d))
        .ok_or_else(|| CodecError::MalformedHeader(format!("DimSize {dims:?} is too large")))?;
    if bytes.len() < expected {
        return Err(CodecError::RawSizeMismatch {
            expected,
            actual: bytes.len(),
        });
    }
    let samples: Vec<f64> = bytes[..expected]
        .par_chunks_exact(element_type.size())
        .map(|chunk| element_type.read(chunk, order))
        .collect();
    let mut data = Array3::from_shape_vec((d2, d1, d0), samples)
        .map_err(|err| CodecError::MalformedHeader(err.to_string()))?;
    data.swap_axes(1, 2);
    Ok(data.as_standard_layout().into_owned())
}

/// Overwrite the raw payload named by the header at `header_path` with
/// `stack`, then rewrite the header. The raw file must already exist.
pub fn write(stack: &VolumeStack, header_path: &Path) -> Result<(), CodecError> {
    let mut header = MhdHeader::read_file(header_path)?;
    let raw = raw_path(header_path, header.data_file()?);
    if !raw.is_file() {
        return Err(CodecError::RawFileNotFound { path: raw });
    }

    let element_type = match header.element_type() {
        Ok(element_type) => element_type,
        Err(_) => {
            let name = datatype_name(stack.element_type()).ok_or_else(|| {
                CodecError::UnknownElementType(format!("{:?}", stack.element_type()))
            })?;
            header.set("datatype", HeaderValue::Text(name.to_string()));
            stack.element_type()
        }
    };

    let mut on_disk = stack.data().view();
    on_disk.swap_axes(1, 2);
    let (d2, d1, d0) = on_disk.dim();
    header.set(
        "dimsize",
        HeaderValue::List(vec![d0 as f64, d1 as f64, d2 as f64]),
    );

    // The rewritten header carries no `byteorder` key, so the payload is
    // written the way it will be read back.
    let mut bytes = Vec::with_capacity(on_disk.len() * element_type.size());
    for &value in on_disk.iter() {
        element_type.write(value, ByteOrder::Little, &mut bytes);
    }
    fs::write(&raw, bytes)?;
    fs::write(header_path, header.to_header_text())?;
    log::info!("Saved stack of size {:?} to {header_path:?}", stack.dim());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_pair(
        dir: &Path,
        header: &str,
        raw: Option<&[u8]>,
    ) -> PathBuf {
        let header_path = dir.join("stack.mhd");
        fs::write(&header_path, header).unwrap();
        if let Some(raw) = raw {
            fs::write(dir.join("stack.raw"), raw).unwrap();
        }
        header_path
    }

    #[test]
    fn parses_numbers_lists_and_text() {
        let header = MhdHeader::parse(
            "ObjectType = Image\nNDims = 3\n\nDimSize = 10 20 30\nElementSpacing = 0.5 1 2\nElementDataFile = stack.raw\n",
        )
        .unwrap();
        assert_eq!(header.get("objecttype"), Some(&HeaderValue::Text("Image".into())));
        assert_eq!(header.get("ndims"), Some(&HeaderValue::Number(3.0)));
        assert_eq!(header.dim_size().unwrap(), [10, 20, 30]);
        assert_eq!(header.spacing(), Some([0.5, 1.0, 2.0]));
        assert_eq!(header.data_file().unwrap(), "stack.raw");
    }

    #[test]
    fn negative_numbers_are_kept_as_text() {
        let header = MhdHeader::parse("Offset = -1 0 0\n").unwrap();
        assert_eq!(header.get("offset"), Some(&HeaderValue::Text("-1 0 0".into())));
    }

    #[test]
    fn key_without_value_is_malformed() {
        let err = MhdHeader::parse("NDims 3\n").unwrap_err();
        assert!(matches!(err, CodecError::MalformedHeader(_)));
    }

    #[test]
    fn decodes_ushort_payload_into_canonical_order() {
        let dir = tempfile::tempdir().unwrap();
        let raw: Vec<u8> = (0..6000u16).flat_map(|v| v.to_le_bytes()).collect();
        let path = write_pair(
            dir.path(),
            "NDims = 3\nDimSize = 10 20 30\nDataType = ushort\nElementDataFile = stack.raw\n",
            Some(&raw),
        );

        let stack = read(&path).unwrap();
        // reshape to (30, 20, 10), then swap axes 1 and 2
        assert_eq!(stack.dim(), (30, 10, 20));
        for (z, i, j) in [(0, 0, 0), (1, 2, 3), (29, 9, 19), (17, 4, 11)] {
            let flat = z * 200 + j * 10 + i;
            assert_eq!(stack.data()[[z, i, j]], flat as f64);
        }
        assert_eq!(stack.element_type(), ElementType::U16);
    }

    #[test]
    fn missing_data_file_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pair(dir.path(), "DimSize = 2 2 2\nDataType = uchar\n", None);
        assert!(matches!(read(&path), Err(CodecError::MalformedHeader(_))));
    }

    #[test]
    fn missing_dim_size_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pair(
            dir.path(),
            "DataType = uchar\nElementDataFile = stack.raw\n",
            Some(&[0; 8]),
        );
        assert!(matches!(read(&path), Err(CodecError::MalformedHeader(_))));
    }

    #[test]
    fn byteorder_true_selects_big_endian() {
        let dir = tempfile::tempdir().unwrap();
        let raw: Vec<u8> = [1i16, -2].iter().flat_map(|v| v.to_be_bytes()).collect();
        let path = write_pair(
            dir.path(),
            "DimSize = 1 2 1\nDataType = short\nByteOrder = TRUE\nElementDataFile = stack.raw\n",
            Some(&raw),
        );
        let stack = read(&path).unwrap();
        assert_eq!(stack.data().iter().copied().collect::<Vec<_>>(), vec![1.0, -2.0]);
    }

    #[test]
    fn element_type_falls_back_to_met_short() {
        let header = MhdHeader::parse("ElementType = MET_SHORT\n").unwrap();
        assert_eq!(header.element_type().unwrap(), ElementType::I16);

        let header = MhdHeader::parse("DataType = bogus\nElementType = MET_SHORT\n").unwrap();
        assert_eq!(header.element_type().unwrap(), ElementType::I16);

        let header = MhdHeader::parse("ElementType = MET_UCHAR\n").unwrap();
        assert!(matches!(
            header.element_type(),
            Err(CodecError::UnknownElementType(name)) if name == "MET_UCHAR"
        ));
    }

    #[test]
    fn embedded_header_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pair(
            dir.path(),
            "DimSize = 1 1 1\nDataType = uchar\nHeaderSize = 16\nElementDataFile = stack.raw\n",
            Some(&[0]),
        );
        assert!(matches!(
            read(&path),
            Err(CodecError::UnsupportedHeaderEmbedding(16))
        ));
    }

    #[test]
    fn short_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pair(
            dir.path(),
            "DimSize = 2 2 2\nDataType = ushort\nElementDataFile = stack.raw\n",
            Some(&[0; 15]),
        );
        assert!(matches!(
            read(&path),
            Err(CodecError::RawSizeMismatch { expected: 16, actual: 15 })
        ));
    }

    #[test]
    fn trailing_payload_bytes_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pair(
            dir.path(),
            "DimSize = 2 2 2\nDataType = uchar\nElementDataFile = stack.raw\n",
            Some(&[7; 12]),
        );
        let stack = read(&path).unwrap();
        assert_eq!(stack.dim(), (2, 2, 2));
        assert!(stack.data().iter().all(|v| *v == 7.0));
    }

    #[test]
    fn oversized_dim_size_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pair(
            dir.path(),
            "DimSize = 4294967296 4294967296 2\nDataType = ushort\nElementDataFile = stack.raw\n",
            Some(&[0; 16]),
        );
        assert!(matches!(read(&path), Err(CodecError::MalformedHeader(_))));
    }

    #[test]
    fn spacing_sets_axis_ratios() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pair(
            dir.path(),
            "DimSize = 1 1 1\nDataType = uchar\nElementSpacing = 2 1 1\nElementDataFile = stack.raw\n",
            Some(&[7]),
        );
        let stack = read(&path).unwrap();
        assert_eq!(stack.spacing_ratios(), [2.0, 0.5, 1.0]);
    }

    #[test]
    fn write_then_read_round_trips_every_type_and_byte_order() {
        let types = [
            ("float", 4usize),
            ("double", 8),
            ("long", 4),
            ("ulong", 4),
            ("char", 1),
            ("uchar", 1),
            ("short", 2),
            ("ushort", 2),
            ("int", 4),
            ("uint", 4),
        ];
        for (datatype, width) in types {
            for big_endian in [false, true] {
                let dir = tempfile::tempdir().unwrap();
                let element_type = element_type_from_datatype(datatype).unwrap();
                assert_eq!(element_type.size(), width);
                let order = if big_endian { ByteOrder::Big } else { ByteOrder::Little };

                let dims = [3usize, 4, 5];
                let mut raw = Vec::new();
                for i in 0..dims.iter().product::<usize>() {
                    let value = match element_type {
                        ElementType::F32 | ElementType::F64 => i as f64 * 0.5,
                        _ => (i % 100) as f64,
                    };
                    element_type.write(value, order, &mut raw);
                }
                let byte_order = if big_endian { "ByteOrder = True\n" } else { "" };
                let path = write_pair(
                    dir.path(),
                    &format!(
                        "NDims = 3\nDataType = {datatype}\nDimSize = 3 4 5\n{byte_order}ElementDataFile = stack.raw\n"
                    ),
                    Some(&raw),
                );

                let original = read(&path).unwrap();
                write(&original, &path).unwrap();
                let reread = read(&path).unwrap();
                assert_eq!(reread.dim(), original.dim(), "{datatype} big={big_endian}");
                assert_eq!(reread.data(), original.data(), "{datatype} big={big_endian}");
            }
        }
    }

    #[test]
    fn write_updates_modified_samples_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pair(
            dir.path(),
            "DimSize = 2 1 1\nDataType = uchar\nElementDataFile = stack.raw\n",
            Some(&[1, 2]),
        );
        let mut stack = read(&path).unwrap();
        stack.data_mut()[[0, 1, 0]] = 9.0;
        write(&stack, &path).unwrap();
        assert_eq!(fs::read(dir.path().join("stack.raw")).unwrap(), vec![1, 9]);
    }

    #[test]
    fn write_requires_existing_raw_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pair(
            dir.path(),
            "DimSize = 1 1 1\nDataType = uchar\nElementDataFile = stack.raw\n",
            None,
        );
        let stack = VolumeStack::new(Array3::zeros((1, 1, 1)), ElementType::U8);
        assert!(matches!(
            write(&stack, &path),
            Err(CodecError::RawFileNotFound { .. })
        ));
        assert!(!dir.path().join("stack.raw").exists());
    }

    #[test]
    fn header_writer_emits_allow_list_in_order() {
        let header = MhdHeader::parse(
            "ElementDataFile = stack.raw\nObjectType = Image\nElementSpacing = 0.5 1 1\nDimSize = 4 5 6\nDataType = ushort\nNDims = 3\nElementByteOrderMSB = False\n",
        )
        .unwrap();
        assert_eq!(
            header.to_header_text(),
            "NDims = 3\nDataType = ushort\nDimSize = 4 5 6\nElementSpacing = 0.5 1 1\nElementByteOrderMSB = False\nElementDataFile = stack.raw\n"
        );
    }
}
