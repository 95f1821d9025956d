//! PSF document facade
//!
//! `open` runs the whole pipeline once: sections, types, sweep and trace
//! declarations, then the value block. The resulting [`PsfDocument`] is
//! immutable and only serves read-only views.

use crate::decoder::{self, DecodedValues};
use crate::lexer::Lexer;
use crate::registry::{Declaration, TypeRegistry};
use crate::section::{read_sections, Container, SectionBody};
use crate::signal::SignalTable;
use crate::sweep;
use crate::types::*;
use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::{debug, info, instrument};

/// One fully decoded PSF file
#[derive(Debug)]
pub struct PsfDocument {
    encoding: Encoding,
    header: Properties,
    types: TypeRegistry,
    sweep: Option<Sweep>,
    signals: Vec<Signal>,
    index: HashMap<String, usize>,
}

impl PsfDocument {
    /// Open and decode a PSF file
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => PsfError::FileNotFound(path.to_path_buf()),
            _ => PsfError::Io(e),
        })?;
        if file.metadata()?.len() == 0 {
            return Err(PsfError::malformed("file is empty"));
        }

        // SAFETY: the mapping is read-only and dropped before this call returns.
        let mmap = unsafe { Mmap::map(&file)? };
        info!(
            bytes = mmap.len(),
            megabytes = mmap.len() as f64 / 1_048_576.0,
            "File mapped"
        );

        Self::from_bytes(&mmap)
    }

    /// Decode a PSF document held in memory
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let container = read_sections(data)?;
        let encoding = container.encoding;

        let header = match container.section(SectionKind::Header) {
            Some(section) => {
                let (text, line) = section.text()?;
                Lexer::new(text, line).parse_pairs()?
            }
            None => Properties::new(),
        };
        let types = match container.section(SectionKind::Type) {
            Some(section) => {
                let (text, line) = section.text()?;
                TypeRegistry::parse(text, line)?
            }
            None => TypeRegistry::new(),
        };
        let sweep_decl = match container.section(SectionKind::Sweep) {
            Some(section) => {
                let (text, line) = section.text()?;
                sweep::parse_sweep(text, line, &types)?
            }
            None => None,
        };
        let table = match container.section(SectionKind::Trace) {
            Some(section) => {
                let (text, line) = section.text()?;
                SignalTable::parse(text, line, &types)?
            }
            None => SignalTable::new(),
        };
        debug!(
            types = types.len(),
            traces = table.len(),
            swept = sweep_decl.is_some(),
            "Declarations resolved"
        );

        let (table, values) =
            decode_values(&container, &header, &types, sweep_decl.as_ref(), table)?;

        let sweep = match &sweep_decl {
            Some(decl) => Some(build_sweep(
                decl,
                &header,
                &table,
                values.abscissa,
                values.points,
            )?),
            None => {
                check_unswept(&table, values.points)?;
                None
            }
        };

        let signals = table.into_signals(values.ordinates)?;
        if let Some(sweep) = &sweep {
            if let Some(bad) = signals.iter().find(|s| s.len() != sweep.len()) {
                return Err(PsfError::malformed(format!(
                    "\"{}\" has {} samples, sweep has {}",
                    bad.name,
                    bad.len(),
                    sweep.len()
                )));
            }
        }

        let index = signals
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();

        info!(
            ?encoding,
            signals = signals.len(),
            points = sweep.as_ref().map_or(0, Sweep::len),
            "PSF document decoded"
        );

        Ok(Self {
            encoding,
            header,
            types,
            sweep,
            signals,
            index,
        })
    }

    /// The independent variable
    pub fn get_sweep(&self) -> Result<&Sweep> {
        self.sweep.as_ref().ok_or(PsfError::NoSweep)
    }

    /// All signals in declaration order. Each call starts a fresh iteration.
    pub fn all_signals(&self) -> std::slice::Iter<'_, Signal> {
        self.signals.iter()
    }

    /// Look up a signal by name
    pub fn signal(&self, name: &str) -> Result<&Signal> {
        self.index
            .get(name)
            .map(|&i| &self.signals[i])
            .ok_or_else(|| PsfError::SignalNotFound(name.to_string()))
    }

    /// Declaration-order position of a signal
    pub fn signal_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn signal_at(&self, index: usize) -> Option<&Signal> {
        self.signals.get(index)
    }

    pub fn signal_names(&self) -> impl Iterator<Item = &str> {
        self.signals.iter().map(|s| s.name.as_str())
    }

    /// HEADER section pairs
    pub fn header(&self) -> &Properties {
        &self.header
    }

    /// Value of the `"analysis type"` header key, if present
    pub fn analysis_type(&self) -> Option<&str> {
        self.header.get_str(HEADER_ANALYSIS_TYPE)
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn is_swept(&self) -> bool {
        self.sweep.is_some()
    }

    /// Number of signals
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

/// Run the value decoder matching the section body. A missing VALUE
/// section yields empty ordinates.
fn decode_values(
    container: &Container<'_>,
    header: &Properties,
    types: &TypeRegistry,
    sweep_decl: Option<&Declaration>,
    table: SignalTable,
) -> Result<(SignalTable, DecodedValues)> {
    let Some(section) = container.section(SectionKind::Value) else {
        let ordinates = table
            .iter()
            .map(|decl| Ordinate::with_capacity(&decl.ty, 0))
            .collect();
        return Ok((
            table,
            DecodedValues {
                abscissa: None,
                ordinates,
                points: 0,
            },
        ));
    };

    match section.body {
        SectionBody::Text { text, line } if sweep_decl.is_none() && table.is_empty() => {
            decoder::decode_text_self_typed(text, line, types)
        }
        SectionBody::Text { text, line } => {
            let capacity = decoder::capacity_hint(header);
            let values = decoder::decode_text_rows(text, line, sweep_decl, &table, capacity)?;
            Ok((table, values))
        }
        SectionBody::Binary(bytes) => {
            let Encoding::Binary(endian) = container.encoding else {
                return Err(PsfError::malformed("binary value block in text container"));
            };
            let values = decoder::decode_binary(bytes, endian, sweep_decl, &table)?;
            Ok((table, values))
        }
    }
}

/// Build the sweep and check that the value block filled it exactly
fn build_sweep(
    decl: &Declaration,
    header: &Properties,
    table: &SignalTable,
    abscissa: Option<Vec<f64>>,
    points: usize,
) -> Result<Sweep> {
    if let Some(samples) = abscissa {
        return sweep::build_explicit(decl, samples);
    }
    if points == 0 && !table.is_empty() {
        return Err(PsfError::EmptySweep(format!(
            "value block holds no \"{}\" points",
            decl.name
        )));
    }

    let rows = (!table.is_empty()).then_some(points);
    sweep::build_generated(decl, header, rows)
}

/// A sweep-less document carries exactly one value per signal
fn check_unswept(table: &SignalTable, points: usize) -> Result<()> {
    match points {
        _ if table.is_empty() => Ok(()),
        1 => Ok(()),
        0 => Err(PsfError::TruncatedValueBlock(
            "no values for declared signals".to_string(),
        )),
        n => Err(PsfError::malformed(format!(
            "{} value rows in a document without a sweep",
            n
        ))),
    }
}
