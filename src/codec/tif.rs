//! Multi-page grayscale TIFF stacks, one page per layer.

use super::CodecError;
use crate::enums::ElementType;
use crate::volume::VolumeStack;

use ndarray::Array3;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult, Limits};

pub fn read(path: &Path) -> Result<VolumeStack, CodecError> {
    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions()?;
    let mut element_type = None;
    let mut samples = Vec::new();
    let mut layers = 0usize;
    loop {
        if decoder.dimensions()? != (width, height) {
            return Err(CodecError::InconsistentPages);
        }
        match decoder.colortype()? {
            ColorType::Gray(_) => {}
            other => {
                return Err(CodecError::Tiff(tiff::TiffError::UnsupportedError(
                    tiff::TiffUnsupportedError::UnsupportedColorType(other),
                )));
            }
        }
        let (page_type, page) = page_samples(decoder.read_image()?);
        if *element_type.get_or_insert(page_type) != page_type {
            return Err(CodecError::InconsistentPages);
        }
        samples.extend(page);
        layers += 1;

        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }

    let (rows, cols) = (height as usize, width as usize);
    log::debug!("Read TIFF of size: cols: {cols}, rows: {rows}, layers: {layers}");
    let mut data = Array3::from_shape_vec((layers, rows, cols), samples)
        .map_err(|_| CodecError::InconsistentPages)?;
    data.swap_axes(1, 2);
    let data = data.as_standard_layout().into_owned();
    Ok(VolumeStack::new(data, element_type.unwrap_or(ElementType::U8)))
}

fn page_samples(result: DecodingResult) -> (ElementType, Vec<f64>) {
    fn widen<T: Copy + Into<f64>>(values: Vec<T>) -> Vec<f64> {
        values.into_iter().map(Into::into).collect()
    }
    match result {
        DecodingResult::U8(v) => (ElementType::U8, widen(v)),
        DecodingResult::U16(v) => (ElementType::U16, widen(v)),
        DecodingResult::U32(v) => (ElementType::U32, widen(v)),
        DecodingResult::U64(v) => (ElementType::U64, v.into_iter().map(|x| x as f64).collect()),
        DecodingResult::I8(v) => (ElementType::I8, widen(v)),
        DecodingResult::I16(v) => (ElementType::I16, widen(v)),
        DecodingResult::I32(v) => (ElementType::I32, widen(v)),
        DecodingResult::I64(v) => (ElementType::I64, v.into_iter().map(|x| x as f64).collect()),
        DecodingResult::F32(v) => (ElementType::F32, widen(v)),
        DecodingResult::F64(v) => (ElementType::F64, v),
    }
}
