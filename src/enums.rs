use std::fmt;
use std::str::FromStr;

/// One of the three orthogonal projection axes.
///
/// The discriminant is the array dimension that acts as depth for the view:
/// axial views slice dimension 0 (Z), coronal views dimension 1 (X) and
/// sagittal views dimension 2 (Y).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Orientation {
    Axial = 0,
    Coronal = 1,
    Sagittal = 2,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Axial,
        Orientation::Coronal,
        Orientation::Sagittal,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Orientation::Axial),
            1 => Some(Orientation::Coronal),
            2 => Some(Orientation::Sagittal),
            _ => None,
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Orientation::Axial => "axial",
            Orientation::Coronal => "coronal",
            Orientation::Sagittal => "sagittal",
        };
        write!(f, "{name}")
    }
}

/// The closed set of ingredient variants a session knows how to plot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IngredientKind {
    ImageStack,
    SparsePoints,
}

impl IngredientKind {
    pub fn name(self) -> &'static str {
        match self {
            IngredientKind::ImageStack => "imagestack",
            IngredientKind::SparsePoints => "sparsepoints",
        }
    }
}

impl fmt::Display for IngredientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ingredient kind '{0}'")]
pub struct UnknownKind(pub String);

impl FromStr for IngredientKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "imagestack" => Ok(IngredientKind::ImageStack),
            "sparsepoints" => Ok(IngredientKind::SparsePoints),
            _ => Err(UnknownKind(s.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// Fixed-width scalar types a volume may be stored as on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl ElementType {
    /// Width of one sample in bytes.
    pub fn size(self) -> usize {
        match self {
            ElementType::I8 | ElementType::U8 => 1,
            ElementType::I16 | ElementType::U16 => 2,
            ElementType::I32 | ElementType::U32 | ElementType::F32 => 4,
            ElementType::I64 | ElementType::U64 | ElementType::F64 => 8,
        }
    }

    /// Decode one sample from exactly `self.size()` bytes.
    pub fn read(self, bytes: &[u8], order: ByteOrder) -> f64 {
        macro_rules! read_as {
            ($ty:ty, $n:expr) => {{
                let mut buf = [0u8; $n];
                buf.copy_from_slice(&bytes[..$n]);
                match order {
                    ByteOrder::Little => <$ty>::from_le_bytes(buf) as f64,
                    ByteOrder::Big => <$ty>::from_be_bytes(buf) as f64,
                }
            }};
        }
        match self {
            ElementType::I8 => read_as!(i8, 1),
            ElementType::U8 => read_as!(u8, 1),
            ElementType::I16 => read_as!(i16, 2),
            ElementType::U16 => read_as!(u16, 2),
            ElementType::I32 => read_as!(i32, 4),
            ElementType::U32 => read_as!(u32, 4),
            ElementType::I64 => read_as!(i64, 8),
            ElementType::U64 => read_as!(u64, 8),
            ElementType::F32 => read_as!(f32, 4),
            ElementType::F64 => read_as!(f64, 8),
        }
    }

    /// Append one sample to `out`. Integer types saturate.
    pub fn write(self, value: f64, order: ByteOrder, out: &mut Vec<u8>) {
        macro_rules! write_as {
            ($ty:ty) => {{
                let v = value as $ty;
                match order {
                    ByteOrder::Little => out.extend_from_slice(&v.to_le_bytes()),
                    ByteOrder::Big => out.extend_from_slice(&v.to_be_bytes()),
                }
            }};
        }
        match self {
            ElementType::I8 => write_as!(i8),
            ElementType::U8 => write_as!(u8),
            ElementType::I16 => write_as!(i16),
            ElementType::U16 => write_as!(u16),
            ElementType::I32 => write_as!(i32),
            ElementType::U32 => write_as!(u32),
            ElementType::I64 => write_as!(i64),
            ElementType::U64 => write_as!(u64),
            ElementType::F32 => write_as!(f32),
            ElementType::F64 => write_as!(f64),
        }
    }
}

/// Marker symbols for point layers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Symbol {
    #[default]
    #[serde(rename = "o")]
    Circle,
    #[serde(rename = "s")]
    Square,
    #[serde(rename = "t")]
    Triangle,
    #[serde(rename = "d")]
    Diamond,
    #[serde(rename = "+")]
    Plus,
}
