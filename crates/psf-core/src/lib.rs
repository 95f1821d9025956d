//! # PSF Reader - Core Library
//!
//! A library for reading Parameter Storage Format (PSF) simulator output.
//!
//! ## Supported Encodings
//!
//! - Fully textual PSF (HEADER / TYPE / SWEEP / TRACE / VALUE / END)
//! - Binary-payload PSF (framed sections, packed IEEE-754 value arrays,
//!   either byte order)
//!
//! ## Features
//!
//! - Memory-mapped file I/O
//! - Explicit and generated (linear / logarithmic) sweeps
//! - Real, complex, integer, string and struct-typed signals
//! - Trace groups flattened in declaration order
//! - Structured logging via `tracing` for diagnostics
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use psf_core::PsfDocument;
//!
//! let doc = PsfDocument::open("aclin.ac").unwrap();
//! let sweep = doc.get_sweep().unwrap();
//! println!("Sweep: {} [{}], {} points", sweep.name, sweep.units, sweep.len());
//!
//! for signal in doc.all_signals() {
//!     println!("{}: {} ({})", signal.name, signal.ty.spelling(), signal.units);
//! }
//!
//! // Access by name
//! let top = doc.signal("top").unwrap();
//! if let Some(values) = top.ordinate.as_complex() {
//!     println!("top[0] = {}", values[0]);
//! }
//! ```
//!
//! ## Enabling Logging
//!
//! This library uses `tracing` for structured logging. To see log output,
//! initialize a tracing subscriber in your application:
//!
//! ```rust,ignore
//! // Add tracing-subscriber to your Cargo.toml
//! tracing_subscriber::fmt::init();
//!
//! // Now library logs will be visible
//! let doc = psf_core::open("noiref.noise").unwrap();
//! ```

mod decoder;
mod document;
mod lexer;
mod reader;
mod registry;
mod section;
mod signal;
mod sweep;
mod types;

pub use document::PsfDocument;
pub use registry::TypeRegistry;
pub use section::detect_encoding;
pub use sweep::GenerationRule;

// Re-export public types
pub use types::{
    // Encoding
    Encoding,
    Endian,
    IntWidth,
    // Data model
    Member,
    Ordinate,
    Precision,
    PropValue,
    Properties,
    // Errors
    PsfError,
    Result,
    Scalar,
    Signal,
    Spacing,
    Sweep,
    TypeDescriptor,
    TypeKind,
    // Constants
    HEADER_ANALYSIS_TYPE,
    HEADER_SWEEP_MAX,
    HEADER_SWEEP_MIN,
    HEADER_SWEEP_POINTS,
};

pub use num_complex::Complex64;

// ============================================================================
// Public API Functions
// ============================================================================

/// Open and decode a PSF file.
///
/// # Arguments
/// * `path` - Path to the PSF file
///
/// # Returns
/// * `Ok(PsfDocument)` - Fully decoded document
/// * `Err(PsfError)` - If the file cannot be read or is not valid PSF
///
/// # Example
/// ```rust,no_run
/// let doc = psf_core::open("pss.td.pss").unwrap();
/// let time = doc.get_sweep().unwrap();
/// assert_eq!(time.units, "s");
/// ```
pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<PsfDocument> {
    PsfDocument::open(path)
}

/// Decode a PSF document already held in memory.
pub fn from_bytes(data: &[u8]) -> Result<PsfDocument> {
    PsfDocument::from_bytes(data)
}
