//! C Foreign Function Interface (FFI) for the PSF reader
//!
//! This module provides a C-compatible API for reading PSF files from C,
//! C++, and other languages that support C FFI. Handles own a fully decoded
//! document; all strings returned are valid until the handle is freed.

use psf_core::{Ordinate, PsfDocument, TypeKind};
use std::ffi::{c_char, c_double, c_int, CStr, CString};
use std::ptr;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Signal kind codes returned by `psf_get_signal_kind`
pub const PSF_KIND_REAL: c_int = 0;
pub const PSF_KIND_COMPLEX: c_int = 1;
pub const PSF_KIND_INTEGER: c_int = 2;
pub const PSF_KIND_STRING: c_int = 3;
pub const PSF_KIND_STRUCT: c_int = 4;
pub const PSF_KIND_ARRAY: c_int = 5;

// ============================================================================
// Opaque Types for C
// ============================================================================

/// Opaque handle to a decoded PSF document
#[repr(C)]
pub struct CPsfDocument {
    inner: Box<PsfDocument>,
    cached_sweep_name: Option<CString>,
    cached_sweep_units: Option<CString>,
    cached_names: Vec<CString>,
    cached_units: Vec<CString>,
}

impl CPsfDocument {
    fn new(doc: PsfDocument) -> Self {
        let (cached_sweep_name, cached_sweep_units) = match doc.get_sweep() {
            Ok(sweep) => (
                CString::new(sweep.name.clone()).ok(),
                CString::new(sweep.units.clone()).ok(),
            ),
            Err(_) => (None, None),
        };
        let cached_names = doc
            .all_signals()
            .map(|s| CString::new(s.name.clone()).unwrap_or_default())
            .collect();
        let cached_units = doc
            .all_signals()
            .map(|s| CString::new(s.units.clone()).unwrap_or_default())
            .collect();

        Self {
            inner: Box::new(doc),
            cached_sweep_name,
            cached_sweep_units,
            cached_names,
            cached_units,
        }
    }

    fn ordinate(&self, index: c_int) -> Option<&Ordinate> {
        let index = usize::try_from(index).ok()?;
        self.inner.signal_at(index).map(|s| &s.ordinate)
    }
}

/// Lengths past `c_int::MAX` are reported as -1
fn len_to_c(len: usize) -> c_int {
    c_int::try_from(len).unwrap_or(-1)
}

// ============================================================================
// Logging
// ============================================================================

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Returns 0 on success, -1 if a global subscriber is already set.
#[no_mangle]
pub extern "C" fn psf_init_logging() -> c_int {
    match tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
    {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

// ============================================================================
// Document Creation and Destruction
// ============================================================================

/// Open and decode a PSF file. Returns null on failure.
#[no_mangle]
pub unsafe extern "C" fn psf_open(path: *const c_char) -> *mut CPsfDocument {
    if path.is_null() {
        return ptr::null_mut();
    }

    let path_str = match CStr::from_ptr(path).to_str() {
        Ok(s) => s,
        Err(_) => return ptr::null_mut(),
    };

    match PsfDocument::open(path_str) {
        Ok(doc) => Box::into_raw(Box::new(CPsfDocument::new(doc))),
        Err(e) => {
            warn!(path = path_str, error = %e, "psf_open failed");
            ptr::null_mut()
        }
    }
}

/// Free a document handle.
#[no_mangle]
pub unsafe extern "C" fn psf_free(doc: *mut CPsfDocument) {
    if !doc.is_null() {
        drop(Box::from_raw(doc));
    }
}

// ============================================================================
// Sweep Accessors
// ============================================================================

#[no_mangle]
pub unsafe extern "C" fn psf_has_sweep(doc: *const CPsfDocument) -> c_int {
    if doc.is_null() {
        return 0;
    }
    c_int::from((*doc).inner.is_swept())
}

#[no_mangle]
pub unsafe extern "C" fn psf_get_sweep_name(doc: *const CPsfDocument) -> *const c_char {
    if doc.is_null() {
        return ptr::null();
    }
    match &(*doc).cached_sweep_name {
        Some(s) => s.as_ptr(),
        None => ptr::null(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn psf_get_sweep_units(doc: *const CPsfDocument) -> *const c_char {
    if doc.is_null() {
        return ptr::null();
    }
    match &(*doc).cached_sweep_units {
        Some(s) => s.as_ptr(),
        None => ptr::null(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn psf_get_sweep_length(doc: *const CPsfDocument) -> c_int {
    if doc.is_null() {
        return 0;
    }
    (*doc).inner.get_sweep().map_or(0, |s| len_to_c(s.len()))
}

/// Copy up to `max_count` sweep samples. Returns the number copied or -1.
#[no_mangle]
pub unsafe extern "C" fn psf_get_sweep_data(
    doc: *const CPsfDocument,
    out_buffer: *mut c_double,
    max_count: c_int,
) -> c_int {
    if doc.is_null() || out_buffer.is_null() || max_count <= 0 {
        return -1;
    }
    match (*doc).inner.get_sweep() {
        Ok(sweep) => {
            let count = std::cmp::min(sweep.len(), max_count as usize);
            ptr::copy_nonoverlapping(sweep.abscissa.as_ptr(), out_buffer, count);
            count as c_int
        }
        Err(_) => -1,
    }
}

// ============================================================================
// Signal Accessors
// ============================================================================

#[no_mangle]
pub unsafe extern "C" fn psf_get_signal_count(doc: *const CPsfDocument) -> c_int {
    if doc.is_null() {
        return 0;
    }
    len_to_c((*doc).inner.len())
}

#[no_mangle]
pub unsafe extern "C" fn psf_get_signal_name(
    doc: *const CPsfDocument,
    index: c_int,
) -> *const c_char {
    if doc.is_null() || index < 0 {
        return ptr::null();
    }
    match (&(*doc).cached_names).get(index as usize) {
        Some(s) => s.as_ptr(),
        None => ptr::null(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn psf_get_signal_units(
    doc: *const CPsfDocument,
    index: c_int,
) -> *const c_char {
    if doc.is_null() || index < 0 {
        return ptr::null();
    }
    match (&(*doc).cached_units).get(index as usize) {
        Some(s) => s.as_ptr(),
        None => ptr::null(),
    }
}

/// Index of the named signal, or -1
#[no_mangle]
pub unsafe extern "C" fn psf_find_signal(doc: *const CPsfDocument, name: *const c_char) -> c_int {
    if doc.is_null() || name.is_null() {
        return -1;
    }
    let name = match CStr::from_ptr(name).to_str() {
        Ok(s) => s,
        Err(_) => return -1,
    };
    (*doc).inner.signal_index(name).map_or(-1, len_to_c)
}

/// One of the `PSF_KIND_*` codes, or -1
#[no_mangle]
pub unsafe extern "C" fn psf_get_signal_kind(doc: *const CPsfDocument, index: c_int) -> c_int {
    if doc.is_null() || index < 0 {
        return -1;
    }
    match (*doc).inner.signal_at(index as usize) {
        Some(signal) => match signal.kind() {
            TypeKind::Real(_) => PSF_KIND_REAL,
            TypeKind::Complex(_) => PSF_KIND_COMPLEX,
            TypeKind::Integer(_) => PSF_KIND_INTEGER,
            TypeKind::String => PSF_KIND_STRING,
            TypeKind::Struct(_) => PSF_KIND_STRUCT,
            TypeKind::Array(_) => PSF_KIND_ARRAY,
        },
        None => -1,
    }
}

#[no_mangle]
pub unsafe extern "C" fn psf_get_signal_length(doc: *const CPsfDocument, index: c_int) -> c_int {
    if doc.is_null() {
        return 0;
    }
    (*doc).ordinate(index).map_or(0, |o| len_to_c(o.len()))
}

// ============================================================================
// Data Accessors
// ============================================================================

/// Copy real (or integer, widened) samples of a signal.
/// Returns the number copied, or -1 for other kinds.
#[no_mangle]
pub unsafe extern "C" fn psf_get_real_data(
    doc: *const CPsfDocument,
    index: c_int,
    out_buffer: *mut c_double,
    max_count: c_int,
) -> c_int {
    if doc.is_null() || out_buffer.is_null() || max_count <= 0 {
        return -1;
    }

    match (*doc).ordinate(index) {
        Some(Ordinate::Real(vec)) => {
            let count = std::cmp::min(vec.len(), max_count as usize);
            ptr::copy_nonoverlapping(vec.as_ptr(), out_buffer, count);
            count as c_int
        }
        Some(Ordinate::Integer(vec)) => {
            let count = std::cmp::min(vec.len(), max_count as usize);
            for (i, &v) in vec.iter().take(count).enumerate() {
                *out_buffer.add(i) = v as c_double;
            }
            count as c_int
        }
        _ => -1,
    }
}

/// Copy complex samples of a signal into split real/imaginary buffers.
#[no_mangle]
pub unsafe extern "C" fn psf_get_complex_data(
    doc: *const CPsfDocument,
    index: c_int,
    out_real: *mut c_double,
    out_imag: *mut c_double,
    max_count: c_int,
) -> c_int {
    if doc.is_null() || out_real.is_null() || out_imag.is_null() || max_count <= 0 {
        return -1;
    }

    match (*doc).ordinate(index) {
        Some(Ordinate::Complex(vec)) => {
            let count = std::cmp::min(vec.len(), max_count as usize);
            for (i, c) in vec.iter().take(count).enumerate() {
                *out_real.add(i) = c.re;
                *out_imag.add(i) = c.im;
            }
            count as c_int
        }
        _ => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "HEADER\n\"PSF sweep points\" 2\nTYPE\n\"sweep\" FLOAT DOUBLE\n\"V\" COMPLEX DOUBLE PROP( \"units\" \"V\" )\n\"N\" FLOAT DOUBLE PROP( \"units\" \"V^2/Hz\" )\nSWEEP\n\"freq\" \"sweep\" PROP( \"units\" \"Hz\" )\nTRACE\n\"top\" \"V\"\n\"out\" \"N\"\nVALUE\n\"freq\" 1\n\"top\" (1 0)\n\"out\" 2e-9\n\"freq\" 10\n\"top\" (0.5 -0.5)\n\"out\" 4e-9\nEND\n";

    fn open_fixture(name: &str) -> *mut CPsfDocument {
        let path = std::env::temp_dir().join(format!("psf_ffi_{}_{}", std::process::id(), name));
        std::fs::write(&path, DOC).unwrap();
        let c_path = CString::new(path.to_str().unwrap()).unwrap();
        let doc = unsafe { psf_open(c_path.as_ptr()) };
        std::fs::remove_file(&path).ok();
        doc
    }

    #[test]
    fn test_open_null_and_missing() {
        unsafe {
            assert!(psf_open(ptr::null()).is_null());
            let missing = CString::new("/nonexistent/psf_ffi.ac").unwrap();
            assert!(psf_open(missing.as_ptr()).is_null());
            psf_free(ptr::null_mut());
        }
    }

    #[test]
    fn test_sweep_and_signal_metadata() {
        let doc = open_fixture("meta.ac");
        assert!(!doc.is_null());
        unsafe {
            assert_eq!(psf_has_sweep(doc), 1);
            assert_eq!(CStr::from_ptr(psf_get_sweep_name(doc)).to_str().unwrap(), "freq");
            assert_eq!(CStr::from_ptr(psf_get_sweep_units(doc)).to_str().unwrap(), "Hz");
            assert_eq!(psf_get_sweep_length(doc), 2);

            assert_eq!(psf_get_signal_count(doc), 2);
            assert_eq!(CStr::from_ptr(psf_get_signal_name(doc, 1)).to_str().unwrap(), "out");
            assert_eq!(
                CStr::from_ptr(psf_get_signal_units(doc, 1)).to_str().unwrap(),
                "V^2/Hz"
            );
            assert!(psf_get_signal_name(doc, 2).is_null());

            let top = CString::new("top").unwrap();
            assert_eq!(psf_find_signal(doc, top.as_ptr()), 0);
            let missing = CString::new("nope").unwrap();
            assert_eq!(psf_find_signal(doc, missing.as_ptr()), -1);

            assert_eq!(psf_get_signal_kind(doc, 0), PSF_KIND_COMPLEX);
            assert_eq!(psf_get_signal_kind(doc, 1), PSF_KIND_REAL);
            assert_eq!(psf_get_signal_kind(doc, 5), -1);
            psf_free(doc);
        }
    }

    #[test]
    fn test_length_past_c_int_range() {
        assert_eq!(len_to_c(1601), 1601);
        assert_eq!(len_to_c(c_int::MAX as usize), c_int::MAX);
        assert_eq!(len_to_c(c_int::MAX as usize + 1), -1);
    }

    #[test]
    fn test_data_copy_out() {
        let doc = open_fixture("data.ac");
        assert!(!doc.is_null());
        unsafe {
            let mut sweep = [0.0; 4];
            assert_eq!(psf_get_sweep_data(doc, sweep.as_mut_ptr(), 4), 2);
            assert_eq!(&sweep[..2], &[1.0, 10.0]);

            let mut re = [0.0; 2];
            let mut im = [0.0; 2];
            assert_eq!(
                psf_get_complex_data(doc, 0, re.as_mut_ptr(), im.as_mut_ptr(), 2),
                2
            );
            assert_eq!(re, [1.0, 0.5]);
            assert_eq!(im, [0.0, -0.5]);

            let mut out = [0.0; 1];
            assert_eq!(psf_get_real_data(doc, 1, out.as_mut_ptr(), 1), 1);
            assert_eq!(out[0], 2e-9);

            // Kind mismatch
            assert_eq!(psf_get_real_data(doc, 0, out.as_mut_ptr(), 1), -1);
            assert_eq!(psf_get_signal_length(doc, 1), 2);
            psf_free(doc);
        }
    }
}
