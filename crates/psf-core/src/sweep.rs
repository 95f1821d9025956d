//! Sweep builder
//!
//! Turns the SWEEP declaration into a [`Sweep`], either from samples
//! enumerated in the value block or from a linear/logarithmic rule taken
//! from the header.

use crate::decoder::MAX_CAPACITY_HINT;
use crate::lexer::Lexer;
use crate::registry::{Declaration, TypeRegistry};
use crate::types::*;
use tracing::debug;

/// Parse the SWEEP section. An empty body declares no sweep.
pub fn parse_sweep(
    text: &str,
    line: usize,
    registry: &TypeRegistry,
) -> Result<Option<Declaration>> {
    let mut lexer = Lexer::new(text, line);
    if lexer.at_end()? {
        return Ok(None);
    }

    let name = lexer.expect_str("sweep name")?;
    let decl = Declaration::parse_rest(name, &mut lexer, registry)?;
    if !lexer.at_end()? {
        return Err(lexer.error("only one-dimensional sweeps are supported"));
    }

    match decl.ty.kind {
        TypeKind::Real(_) | TypeKind::Integer(_) => Ok(Some(decl)),
        _ => Err(PsfError::mismatch(
            &decl.name,
            "real sweep type",
            decl.ty.spelling(),
        )),
    }
}

/// Linear or logarithmic generation parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationRule {
    pub start: f64,
    pub stop: f64,
    pub count: i64,
    pub spacing: Spacing,
}

impl GenerationRule {
    /// Read start/stop/count from the header and spacing from the sweep's grid property
    pub fn from_header(decl: &Declaration, header: &Properties) -> Result<Self> {
        let start = header.get_f64(HEADER_SWEEP_MIN).ok_or_else(|| {
            PsfError::malformed(format!("generated sweep without \"{}\"", HEADER_SWEEP_MIN))
        })?;
        let stop = header.get_f64(HEADER_SWEEP_MAX).ok_or_else(|| {
            PsfError::malformed(format!("generated sweep without \"{}\"", HEADER_SWEEP_MAX))
        })?;
        let count = header
            .get(HEADER_SWEEP_POINTS)
            .and_then(PropValue::as_i64)
            .ok_or_else(|| {
                PsfError::EmptySweep(format!("\"{}\" missing", HEADER_SWEEP_POINTS))
            })?;

        Ok(Self {
            start,
            stop,
            count,
            spacing: grid_spacing(decl)?,
        })
    }

    /// Compare the declared count with the rows the value block held.
    /// Without rows to compare against, the count may not exceed the
    /// pre-allocation cap.
    pub fn check_rows(&self, rows: Option<usize>) -> Result<()> {
        if self.count <= 0 {
            return Ok(());
        }
        let count = self.count as u64;
        match rows.map(|n| n as u64) {
            Some(n) if n < count => Err(PsfError::TruncatedValueBlock(format!(
                "{} of {} sweep points present",
                n, count
            ))),
            Some(n) if n > count => Err(PsfError::malformed(format!(
                "{} points in value block, sweep declares {}",
                n, count
            ))),
            None if count > MAX_CAPACITY_HINT as u64 => Err(PsfError::malformed(format!(
                "\"{}\" is {} with no values to back it",
                HEADER_SWEEP_POINTS, count
            ))),
            _ => Ok(()),
        }
    }

    /// Produce the abscissa. Each point is computed from its index.
    pub fn generate(&self) -> Result<Vec<f64>> {
        if self.count <= 0 {
            return Err(PsfError::EmptySweep(format!("count is {}", self.count)));
        }
        if !self.start.is_finite() || !self.stop.is_finite() {
            return Err(PsfError::InvalidSpacing(format!(
                "non-finite bounds [{}, {}]",
                self.start, self.stop
            )));
        }
        if self.spacing == Spacing::Logarithmic && (self.start <= 0.0 || self.stop <= 0.0) {
            return Err(PsfError::InvalidSpacing(format!(
                "logarithmic sweep over [{}, {}]",
                self.start, self.stop
            )));
        }

        let n = self.count as usize;
        if n == 1 {
            return Ok(vec![self.start]);
        }
        if self.start >= self.stop {
            return Err(PsfError::InvalidSpacing(format!(
                "{} points over non-increasing bounds [{}, {}]",
                n, self.start, self.stop
            )));
        }

        let last = n - 1;
        let span = last as f64;
        let points = match self.spacing {
            Spacing::Logarithmic => {
                let (lo, hi) = (self.start.ln(), self.stop.ln());
                (0..n)
                    .map(|i| match i {
                        0 => self.start,
                        i if i == last => self.stop,
                        i => (lo + (hi - lo) * (i as f64 / span)).exp(),
                    })
                    .collect()
            }
            Spacing::Linear | Spacing::Explicit => (0..n)
                .map(|i| match i {
                    0 => self.start,
                    i if i == last => self.stop,
                    i => self.start + (self.stop - self.start) * (i as f64 / span),
                })
                .collect(),
        };
        Ok(points)
    }
}

/// Spacing named by the sweep's `"grid"` property; linear when absent
fn grid_spacing(decl: &Declaration) -> Result<Spacing> {
    let Some(grid) = decl.properties.get(PROP_GRID) else {
        return Ok(Spacing::Linear);
    };
    match grid {
        PropValue::Int(1) => Ok(Spacing::Linear),
        PropValue::Int(2) => Ok(Spacing::Logarithmic),
        PropValue::Str(s) => match s.to_ascii_lowercase().as_str() {
            "lin" | "linear" => Ok(Spacing::Linear),
            "log" | "logarithmic" | "dec" => Ok(Spacing::Logarithmic),
            _ => Err(PsfError::InvalidSpacing(format!("unknown grid \"{}\"", s))),
        },
        other => Err(PsfError::InvalidSpacing(format!("unknown grid {}", other))),
    }
}

/// Sweep whose samples were enumerated in the value block, in file order
pub fn build_explicit(decl: &Declaration, abscissa: Vec<f64>) -> Result<Sweep> {
    if abscissa.is_empty() {
        return Err(PsfError::EmptySweep(format!(
            "value block lists no \"{}\" samples",
            decl.name
        )));
    }
    Ok(Sweep {
        name: decl.name.clone(),
        units: decl.units().to_string(),
        ty: decl.ty.clone(),
        spacing: Spacing::Explicit,
        abscissa,
    })
}

/// Sweep generated from the header rule. `rows` is the number of
/// value rows decoded, or `None` when no signal was declared.
pub fn build_generated(
    decl: &Declaration,
    header: &Properties,
    rows: Option<usize>,
) -> Result<Sweep> {
    let rule = GenerationRule::from_header(decl, header)?;
    rule.check_rows(rows)?;
    let abscissa = rule.generate()?;
    debug!(
        sweep = %decl.name,
        points = abscissa.len(),
        spacing = ?rule.spacing,
        "Sweep generated"
    );
    Ok(Sweep {
        name: decl.name.clone(),
        units: decl.units().to_string(),
        ty: decl.ty.clone(),
        spacing: rule.spacing,
        abscissa,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(start: f64, stop: f64, count: i64, spacing: Spacing) -> GenerationRule {
        GenerationRule {
            start,
            stop,
            count,
            spacing,
        }
    }

    fn registry() -> TypeRegistry {
        TypeRegistry::parse(
            "\"sweep\" FLOAT DOUBLE PROP( \"key\" \"sweep\" )\n\"V\" COMPLEX DOUBLE\n",
            1,
        )
        .unwrap()
    }

    #[test]
    fn test_linear_endpoints_and_monotonic() {
        let points = rule(1.0, 1e9, 1001, Spacing::Linear).generate().unwrap();
        assert_eq!(points.len(), 1001);
        assert_eq!(points[0], 1.0);
        assert_eq!(points[1000], 1e9);
        assert!(points.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_log_endpoints_and_monotonic() {
        let points = rule(1.0, 1e6, 61, Spacing::Logarithmic)
            .generate()
            .unwrap();
        assert_eq!(points.len(), 61);
        assert_eq!(points[0], 1.0);
        assert_eq!(points[60], 1e6);
        assert!(points.windows(2).all(|w| w[1].ln() > w[0].ln()));
        // Ten points per decade
        assert!((points[10] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_descending_bounds_rejected() {
        for spacing in [Spacing::Linear, Spacing::Logarithmic] {
            assert!(matches!(
                rule(5.0, 1.0, 5, spacing).generate(),
                Err(PsfError::InvalidSpacing(_))
            ));
        }
        assert_eq!(
            rule(5.0, 1.0, 1, Spacing::Linear).generate().unwrap(),
            vec![5.0]
        );
    }

    #[test]
    fn test_single_point() {
        assert_eq!(
            rule(3.0, 7.0, 1, Spacing::Linear).generate().unwrap(),
            vec![3.0]
        );
    }

    #[test]
    fn test_empty_sweep() {
        for count in [0, -4] {
            assert!(matches!(
                rule(0.0, 1.0, count, Spacing::Linear).generate(),
                Err(PsfError::EmptySweep(_))
            ));
        }
    }

    #[test]
    fn test_invalid_log_bounds() {
        assert!(matches!(
            rule(0.0, 10.0, 5, Spacing::Logarithmic).generate(),
            Err(PsfError::InvalidSpacing(_))
        ));
        assert!(matches!(
            rule(1.0, -10.0, 5, Spacing::Logarithmic).generate(),
            Err(PsfError::InvalidSpacing(_))
        ));
        assert!(matches!(
            rule(2.0, 2.0, 5, Spacing::Linear).generate(),
            Err(PsfError::InvalidSpacing(_))
        ));
    }

    #[test]
    fn test_parse_sweep_units_from_prop() {
        let decl = parse_sweep(
            "\"freq\" \"sweep\" PROP(\n\"units\" \"Hz\"\n\"grid\" 2\n)\n",
            1,
            &registry(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(decl.name, "freq");
        assert_eq!(decl.units(), "Hz");
        assert_eq!(grid_spacing(&decl).unwrap(), Spacing::Logarithmic);
    }

    #[test]
    fn test_parse_sweep_rejects_complex_and_multiple() {
        let reg = registry();
        assert!(matches!(
            parse_sweep("\"freq\" \"V\"\n", 1, &reg),
            Err(PsfError::TypeMismatch { .. })
        ));
        assert!(matches!(
            parse_sweep("\"a\" \"sweep\"\n\"b\" \"sweep\"\n", 1, &reg),
            Err(PsfError::MalformedContainer(_))
        ));
        assert!(parse_sweep("  \n", 1, &reg).unwrap().is_none());
    }

    #[test]
    fn test_build_generated_from_header() {
        let decl = parse_sweep("\"freq\" \"sweep\" PROP( \"grid\" \"log\" )", 1, &registry())
            .unwrap()
            .unwrap();
        let mut header = Properties::new();
        header.insert(HEADER_SWEEP_MIN, PropValue::Real(10.0));
        header.insert(HEADER_SWEEP_MAX, PropValue::Int(1000));
        header.insert(HEADER_SWEEP_POINTS, PropValue::Int(3));

        let sweep = build_generated(&decl, &header, Some(3)).unwrap();
        assert_eq!(sweep.spacing, Spacing::Logarithmic);
        assert_eq!(sweep.abscissa[0], 10.0);
        assert!((sweep.abscissa[1] - 100.0).abs() < 1e-9);
        assert_eq!(sweep.abscissa[2], 1000.0);
    }

    #[test]
    fn test_declared_count_checked_before_generation() {
        let decl = parse_sweep("\"x\" \"sweep\"", 1, &registry())
            .unwrap()
            .unwrap();
        let mut header = Properties::new();
        header.insert(HEADER_SWEEP_MIN, PropValue::Int(1));
        header.insert(HEADER_SWEEP_MAX, PropValue::Int(3));
        header.insert(HEADER_SWEEP_POINTS, PropValue::Int(i64::MAX));

        assert!(matches!(
            build_generated(&decl, &header, Some(1)),
            Err(PsfError::TruncatedValueBlock(_))
        ));
        assert!(matches!(
            build_generated(&decl, &header, None),
            Err(PsfError::MalformedContainer(_))
        ));

        header.insert(HEADER_SWEEP_POINTS, PropValue::Int(3));
        assert!(matches!(
            build_generated(&decl, &header, Some(4)),
            Err(PsfError::MalformedContainer(_))
        ));
        assert_eq!(build_generated(&decl, &header, None).unwrap().len(), 3);
    }

    #[test]
    fn test_build_explicit_requires_samples() {
        let decl = parse_sweep("\"time\" \"sweep\"", 1, &registry())
            .unwrap()
            .unwrap();
        assert!(matches!(
            build_explicit(&decl, Vec::new()),
            Err(PsfError::EmptySweep(_))
        ));
        let sweep = build_explicit(&decl, vec![0.0, 1e-9]).unwrap();
        assert_eq!(sweep.spacing, Spacing::Explicit);
        assert_eq!(sweep.len(), 2);
    }
}
