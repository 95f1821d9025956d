//! Common types, errors, and constants for PSF file operations

use num_complex::Complex64;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// Leading keyword of the fully textual encoding
pub const TEXT_SIGNATURE: &str = "HEADER";

/// Revision word at offset 0 of the binary-payload encoding.
/// Byte order is detected from it.
pub const BINARY_REVISION: u32 = 1;

/// Binary frame kind codes
pub const SECTION_CODE_HEADER: u32 = 1;
pub const SECTION_CODE_TYPE: u32 = 2;
pub const SECTION_CODE_SWEEP: u32 = 3;
pub const SECTION_CODE_TRACE: u32 = 4;
pub const SECTION_CODE_VALUE: u32 = 5;
pub const SECTION_CODE_END: u32 = 15;

/// Size of a binary frame header: kind + payload length
pub const FRAME_HEADER_SIZE: usize = 8;

/// Header keys consulted by the decoder
pub const HEADER_ANALYSIS_TYPE: &str = "analysis type";
pub const HEADER_SWEEP_POINTS: &str = "PSF sweep points";
pub const HEADER_SWEEP_MIN: &str = "PSF sweep min";
pub const HEADER_SWEEP_MAX: &str = "PSF sweep max";

/// Property keys consulted by the decoder
pub const PROP_UNITS: &str = "units";
pub const PROP_GRID: &str = "grid";

// ============================================================================
// Enums
// ============================================================================

/// Byte order detected from the binary revision word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Physical encoding of a PSF container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Every section, values included, is structured text
    Text,
    /// Structured-text declarations with a densely packed binary value block
    Binary(Endian),
}

/// Logical section kinds, in the order they must appear
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SectionKind {
    Header,
    Type,
    Sweep,
    Trace,
    Value,
    End,
}

impl SectionKind {
    /// Keyword introducing the section in the textual encoding
    pub fn keyword(self) -> &'static str {
        match self {
            SectionKind::Header => "HEADER",
            SectionKind::Type => "TYPE",
            SectionKind::Sweep => "SWEEP",
            SectionKind::Trace => "TRACE",
            SectionKind::Value => "VALUE",
            SectionKind::End => "END",
        }
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "HEADER" => Some(SectionKind::Header),
            "TYPE" => Some(SectionKind::Type),
            "SWEEP" => Some(SectionKind::Sweep),
            "TRACE" => Some(SectionKind::Trace),
            "VALUE" => Some(SectionKind::Value),
            "END" => Some(SectionKind::End),
            _ => None,
        }
    }

    /// Map a binary frame code. Unknown codes yield `None` and are skipped.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            SECTION_CODE_HEADER => Some(SectionKind::Header),
            SECTION_CODE_TYPE => Some(SectionKind::Type),
            SECTION_CODE_SWEEP => Some(SectionKind::Sweep),
            SECTION_CODE_TRACE => Some(SectionKind::Trace),
            SECTION_CODE_VALUE => Some(SectionKind::Value),
            SECTION_CODE_END => Some(SectionKind::End),
            _ => None,
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Floating-point precision of a real or complex type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// 4-byte float32
    Single,
    /// 8-byte float64
    Double,
}

impl Precision {
    #[inline]
    pub fn width(self) -> usize {
        match self {
            Precision::Single => 4,
            Precision::Double => 8,
        }
    }

    fn spelling(self) -> &'static str {
        match self {
            Precision::Single => "single",
            Precision::Double => "double",
        }
    }
}

/// Storage width of an integer type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    /// 1-byte signed
    Byte,
    /// 4-byte signed
    Long,
}

impl IntWidth {
    #[inline]
    pub fn width(self) -> usize {
        match self {
            IntWidth::Byte => 1,
            IntWidth::Long => 4,
        }
    }
}

/// Sweep generation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spacing {
    /// Samples copied from the value block in file order
    Explicit,
    Linear,
    Logarithmic,
}

// ============================================================================
// Error Types
// ============================================================================

/// Error type for PSF reading operations
#[derive(Debug, Error)]
pub enum PsfError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("malformed container: {0}")]
    MalformedContainer(String),

    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("duplicate signal: {0}")]
    DuplicateSignal(String),

    #[error("empty sweep: {0}")]
    EmptySweep(String),

    #[error("invalid sweep spacing: {0}")]
    InvalidSpacing(String),

    #[error("truncated value block: {0}")]
    TruncatedValueBlock(String),

    #[error("type mismatch for {name}: expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("document declares no sweep")]
    NoSweep,

    #[error("signal not found: {0}")]
    SignalNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PsfError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        PsfError::MalformedContainer(message.into())
    }

    pub(crate) fn mismatch(
        name: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        PsfError::TypeMismatch {
            name: name.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PsfError>;

// ============================================================================
// Properties
// ============================================================================

/// A property value as written in HEADER pairs and PROP(...) blocks
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Str(String),
    Int(i64),
    Real(f64),
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropValue::Int(i) => Some(*i as f64),
            PropValue::Real(r) => Some(*r),
            PropValue::Str(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Str(s) => write!(f, "{}", s),
            PropValue::Int(i) => write!(f, "{}", i),
            PropValue::Real(r) => write!(f, "{}", r),
        }
    }
}

/// Ordered key/value list. Later duplicates shadow earlier ones on lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    entries: Vec<(String, PropValue)>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: PropValue) {
        self.entries.push((key.into(), value));
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PropValue::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(PropValue::as_f64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Type descriptors
// ============================================================================

/// One member of a struct type
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub ty: Arc<TypeDescriptor>,
}

/// Closed set of PSF data kinds
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Real(Precision),
    Complex(Precision),
    Integer(IntWidth),
    String,
    Struct(Vec<Member>),
    Array(Arc<TypeDescriptor>),
}

/// Resolved type declaration, shared by every signal that uses it
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    pub name: String,
    pub kind: TypeKind,
    /// Storage width of one element; 0 for variable-width kinds
    pub byte_width: usize,
    pub properties: Properties,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>, kind: TypeKind, properties: Properties) -> Self {
        let byte_width = Self::width_of(&kind);
        Self {
            name: name.into(),
            kind,
            byte_width,
            properties,
        }
    }

    fn width_of(kind: &TypeKind) -> usize {
        match kind {
            TypeKind::Real(p) => p.width(),
            TypeKind::Complex(p) => 2 * p.width(),
            TypeKind::Integer(w) => w.width(),
            TypeKind::String | TypeKind::Array(_) => 0,
            TypeKind::Struct(members) => {
                if members.iter().all(|m| m.ty.is_fixed_width()) {
                    members.iter().map(|m| m.ty.byte_width).sum()
                } else {
                    0
                }
            }
        }
    }

    /// Whether every element has the same encoded size
    pub fn is_fixed_width(&self) -> bool {
        self.byte_width > 0
    }

    pub fn units(&self) -> &str {
        self.properties.get_str(PROP_UNITS).unwrap_or("")
    }

    pub fn is_complex(&self) -> bool {
        matches!(self.kind, TypeKind::Complex(_))
    }

    /// PSF spelling of the kind, e.g. `"complex double"`
    pub fn spelling(&self) -> String {
        match &self.kind {
            TypeKind::Real(p) => format!("float {}", p.spelling()),
            TypeKind::Complex(p) => format!("complex {}", p.spelling()),
            TypeKind::Integer(IntWidth::Byte) => "int byte".to_string(),
            TypeKind::Integer(IntWidth::Long) => "int long".to_string(),
            TypeKind::String => "string *".to_string(),
            TypeKind::Struct(_) => "struct".to_string(),
            TypeKind::Array(_) => "array".to_string(),
        }
    }
}

// ============================================================================
// Values
// ============================================================================

/// A single decoded sample
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Real(f64),
    Complex(Complex64),
    Integer(i64),
    Text(String),
    /// Struct members or array elements, in declaration order
    Composite(Vec<Scalar>),
}

/// Ordinate data of one signal - one variant per kind, never mixed
#[derive(Debug, Clone, PartialEq)]
pub enum Ordinate {
    Real(Vec<f64>),
    Complex(Vec<Complex64>),
    Integer(Vec<i64>),
    Text(Vec<String>),
    Composite(Vec<Vec<Scalar>>),
}

impl Ordinate {
    /// Empty storage matching the type's kind
    pub fn with_capacity(ty: &TypeDescriptor, capacity: usize) -> Self {
        match ty.kind {
            TypeKind::Real(_) => Ordinate::Real(Vec::with_capacity(capacity)),
            TypeKind::Complex(_) => Ordinate::Complex(Vec::with_capacity(capacity)),
            TypeKind::Integer(_) => Ordinate::Integer(Vec::with_capacity(capacity)),
            TypeKind::String => Ordinate::Text(Vec::with_capacity(capacity)),
            TypeKind::Struct(_) | TypeKind::Array(_) => {
                Ordinate::Composite(Vec::with_capacity(capacity))
            }
        }
    }

    /// Append a sample. Returns the sample back if its kind does not fit.
    pub(crate) fn push(&mut self, value: Scalar) -> std::result::Result<(), Scalar> {
        match (self, value) {
            (Ordinate::Real(v), Scalar::Real(x)) => v.push(x),
            (Ordinate::Complex(v), Scalar::Complex(c)) => v.push(c),
            (Ordinate::Integer(v), Scalar::Integer(i)) => v.push(i),
            (Ordinate::Text(v), Scalar::Text(s)) => v.push(s),
            (Ordinate::Composite(v), Scalar::Composite(items)) => v.push(items),
            (_, other) => return Err(other),
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        match self {
            Ordinate::Real(v) => v.len(),
            Ordinate::Complex(v) => v.len(),
            Ordinate::Integer(v) => v.len(),
            Ordinate::Text(v) => v.len(),
            Ordinate::Composite(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, Ordinate::Complex(_))
    }

    pub fn as_real(&self) -> Option<&[f64]> {
        match self {
            Ordinate::Real(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_complex(&self) -> Option<&[Complex64]> {
        match self {
            Ordinate::Complex(v) => Some(v),
            _ => None,
        }
    }

    /// Sample at `index` as a standalone scalar
    pub fn get(&self, index: usize) -> Option<Scalar> {
        match self {
            Ordinate::Real(v) => v.get(index).copied().map(Scalar::Real),
            Ordinate::Complex(v) => v.get(index).copied().map(Scalar::Complex),
            Ordinate::Integer(v) => v.get(index).copied().map(Scalar::Integer),
            Ordinate::Text(v) => v.get(index).cloned().map(Scalar::Text),
            Ordinate::Composite(v) => v.get(index).cloned().map(Scalar::Composite),
        }
    }

    /// (min, max) over real samples, or over the real parts of complex samples
    pub fn real_range(&self) -> Option<(f64, f64)> {
        let fold = |acc: Option<(f64, f64)>, x: f64| match acc {
            None => Some((x, x)),
            Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
        };
        match self {
            Ordinate::Real(v) => v.iter().copied().fold(None, fold),
            Ordinate::Complex(v) => v.iter().map(|c| c.re).fold(None, fold),
            Ordinate::Integer(v) => v.iter().map(|&i| i as f64).fold(None, fold),
            _ => None,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// The independent variable of a swept document
#[derive(Debug, Clone)]
pub struct Sweep {
    pub name: String,
    pub units: String,
    pub ty: Arc<TypeDescriptor>,
    pub spacing: Spacing,
    pub abscissa: Vec<f64>,
}

impl Sweep {
    pub fn len(&self) -> usize {
        self.abscissa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.abscissa.is_empty()
    }
}

/// A named dependent variable aligned to the sweep
#[derive(Debug, Clone)]
pub struct Signal {
    pub name: String,
    pub units: String,
    pub ty: Arc<TypeDescriptor>,
    pub properties: Properties,
    pub ordinate: Ordinate,
}

impl Signal {
    pub fn kind(&self) -> &TypeKind {
        &self.ty.kind
    }

    pub fn len(&self) -> usize {
        self.ordinate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordinate.is_empty()
    }
}
