//! Decoding and encoding of volumetric stacks.
//!
//! Format dispatch happens purely on the lower-cased file extension. Every
//! decoder returns a [`VolumeStack`] in canonical (Z, X, Y) order.

pub mod mhd;
pub mod nrrd;
pub mod tif;

use crate::volume::VolumeStack;

use std::path::{Path, PathBuf};
use thiserror::Error;
use web_time::Instant;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Unsupported file format: {path:?}")]
    UnsupportedFormat { path: PathBuf },

    #[error("File not found: {path:?}")]
    FileNotFound { path: PathBuf },

    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("Unknown element type '{0}'")]
    UnknownElementType(String),

    #[error("Raw files with an embedded header ({0} bytes) are not supported")]
    UnsupportedHeaderEmbedding(usize),

    #[error("Raw file not found: {path:?}")]
    RawFileNotFound { path: PathBuf },

    #[error("Raw file holds {actual} bytes but the header needs {expected}")]
    RawSizeMismatch { expected: usize, actual: usize },

    #[error("NRRD error: {0}")]
    Nrrd(String),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Inconsistent TIFF page dimensions")]
    InconsistentPages,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Supported extensions, without the leading dot.
pub const STACK_EXTENSIONS: &[&str] = &["mhd", "tiff", "tif", "nrrd", "nrd"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackFormat {
    Tiff,
    Mhd,
    Nrrd,
}

impl StackFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "tif" | "tiff" => Some(StackFormat::Tiff),
            "mhd" => Some(StackFormat::Mhd),
            "nrrd" | "nrd" => Some(StackFormat::Nrrd),
            _ => None,
        }
    }
}

/// Filter string for a file picker.
pub fn image_filter() -> String {
    let globs: Vec<_> = STACK_EXTENSIONS.iter().map(|ext| format!("*.{ext}")).collect();
    format!("Images ({})", globs.join(" "))
}

/// Decode the stack at `path`, dispatching on its extension.
pub fn decode(path: impl AsRef<Path>) -> Result<VolumeStack, CodecError> {
    let path = path.as_ref();
    let format = StackFormat::from_path(path).ok_or_else(|| CodecError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;
    if !path.is_file() {
        return Err(CodecError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let started = Instant::now();
    let stack = match format {
        StackFormat::Tiff => tif::read(path)?,
        StackFormat::Mhd => mhd::read(path)?,
        StackFormat::Nrrd => nrrd::read(path)?,
    };
    let (z, x, y) = stack.dim();
    log::info!(
        "Decoded {path:?} ({z} layers, {x} x {y}) in {:.2?}",
        started.elapsed()
    );
    Ok(stack.with_source(path))
}

/// Convert per-axis voxel spacing into the aspect ratios used to lock the
/// three projection axes. The formula is cyclic and must not be simplified:
/// `[s0 / s1, s2 / s0, s1 / s2]`.
pub fn spacing_to_ratio(spacing: [f64; 3]) -> Option<[f64; 3]> {
    if spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
        return None;
    }
    Some([
        spacing[0] / spacing[1],
        spacing[2] / spacing[0],
        spacing[1] / spacing[2],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_spacing_gives_unit_ratios() {
        assert_eq!(spacing_to_ratio([1.0, 1.0, 1.0]), Some([1.0, 1.0, 1.0]));
    }

    #[test]
    fn ratios_follow_cyclic_formula() {
        assert_eq!(spacing_to_ratio([2.0, 1.0, 1.0]), Some([2.0, 0.5, 1.0]));
        assert_eq!(spacing_to_ratio([1.0, 2.0, 4.0]), Some([0.5, 4.0, 0.5]));
    }

    #[test]
    fn invalid_spacing_has_no_ratio() {
        assert_eq!(spacing_to_ratio([0.0, 1.0, 1.0]), None);
        assert_eq!(spacing_to_ratio([1.0, f64::NAN, 1.0]), None);
        assert_eq!(spacing_to_ratio([1.0, -1.0, 1.0]), None);
    }

    #[test]
    fn format_dispatch_is_case_insensitive() {
        assert_eq!(StackFormat::from_path(Path::new("a/b.TIF")), Some(StackFormat::Tiff));
        assert_eq!(StackFormat::from_path(Path::new("b.tiff")), Some(StackFormat::Tiff));
        assert_eq!(StackFormat::from_path(Path::new("b.MHD")), Some(StackFormat::Mhd));
        assert_eq!(StackFormat::from_path(Path::new("b.nrd")), Some(StackFormat::Nrrd));
        assert_eq!(StackFormat::from_path(Path::new("b.png")), None);
        assert_eq!(StackFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = decode("volume.png").unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedFormat { .. }));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = decode("/definitely/not/here.mhd").unwrap_err();
        assert!(matches!(err, CodecError::FileNotFound { .. }));
    }

    #[test]
    fn filter_lists_every_extension() {
        assert_eq!(image_filter(), "Images (*.mhd *.tiff *.tif *.nrrd *.nrd)");
    }
}
