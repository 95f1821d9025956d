//! Value decoder
//!
//! Walks the VALUE section once, front to back, filling one ordinate per
//! declared signal. The textual block is point-major (every row names each
//! signal in declaration order); the binary block is signal-major (one
//! packed array per signal). Both produce the same [`DecodedValues`].

use crate::lexer::{Lexer, Token};
use crate::reader::ByteCursor;
use crate::registry::{Declaration, TypeRegistry};
use crate::signal::SignalTable;
use crate::types::*;
use num_complex::Complex64;
use tracing::{debug, trace};

/// Upper bound on speculative pre-allocation from header hints, in
/// elements summed over all signals
pub(crate) const MAX_CAPACITY_HINT: usize = 1 << 20;

/// Output of one value-block walk
#[derive(Debug)]
pub struct DecodedValues {
    /// Sweep samples, when the block enumerates them
    pub abscissa: Option<Vec<f64>>,
    /// One ordinate per declared signal, in declaration order
    pub ordinates: Vec<Ordinate>,
    /// Samples decoded per signal
    pub points: usize,
}

/// Clamp a header-provided point count to a safe pre-allocation size
pub fn capacity_hint(header: &Properties) -> usize {
    header
        .get(HEADER_SWEEP_POINTS)
        .and_then(PropValue::as_i64)
        .map(|n| n.clamp(0, MAX_CAPACITY_HINT as i64) as usize)
        .unwrap_or(0)
}

fn allocate(table: &SignalTable, capacity: usize) -> Vec<Ordinate> {
    let per_signal = capacity.min(MAX_CAPACITY_HINT / table.len().max(1));
    table
        .iter()
        .map(|decl| Ordinate::with_capacity(&decl.ty, per_signal))
        .collect()
}

fn push_value(ordinate: &mut Ordinate, value: Scalar, decl: &Declaration) -> Result<()> {
    ordinate
        .push(value)
        .map_err(|v| PsfError::mismatch(&decl.name, decl.ty.spelling(), describe(&v)))
}

fn describe(value: &Scalar) -> String {
    match value {
        Scalar::Real(x) => format!("real {}", x),
        Scalar::Complex(c) => format!("complex ({} {})", c.re, c.im),
        Scalar::Integer(i) => format!("integer {}", i),
        Scalar::Text(s) => format!("string \"{}\"", s),
        Scalar::Composite(items) => format!("{}-element composite", items.len()),
    }
}

// ============================================================================
// Textual value block
// ============================================================================

/// Decode point-major rows. With a sweep, rows optionally lead with a
/// `"<sweep>" x` entry; without one, exactly the declared signals appear.
pub fn decode_text_rows(
    text: &str,
    line: usize,
    sweep: Option<&Declaration>,
    table: &SignalTable,
    capacity: usize,
) -> Result<DecodedValues> {
    let mut lexer = Lexer::new(text, line);
    let mut ordinates = allocate(table, capacity);

    let explicit = match (sweep, lexer.peek()?) {
        (Some(decl), Some(Token::Str(first))) => *first == decl.name,
        _ => false,
    };
    let mut abscissa = explicit.then(|| Vec::with_capacity(capacity));
    let mut points = 0usize;

    while !lexer.at_end()? {
        if abscissa.is_none() && table.is_empty() {
            return Err(lexer.error("value entry with no declared signals"));
        }

        if let (Some(samples), Some(decl)) = (abscissa.as_mut(), sweep) {
            expect_entry(&mut lexer, &decl.name, points)?;
            match parse_text_value(&mut lexer, &decl.name, &decl.ty)? {
                Scalar::Real(x) => samples.push(x),
                Scalar::Integer(i) => samples.push(i as f64),
                other => {
                    return Err(PsfError::mismatch(
                        &decl.name,
                        decl.ty.spelling(),
                        describe(&other),
                    ))
                }
            }
            lexer.parse_props()?;
        }

        for (decl, ordinate) in table.iter().zip(ordinates.iter_mut()) {
            expect_entry(&mut lexer, &decl.name, points)?;
            let value = parse_text_value(&mut lexer, &decl.name, &decl.ty)?;
            push_value(ordinate, value, decl)?;
            lexer.parse_props()?;
        }

        points += 1;
        if points % 10_000 == 0 {
            trace!(points, "Text rows decoded");
        }
    }

    debug!(
        points,
        signals = table.len(),
        explicit_sweep = explicit,
        "Text value block decoded"
    );
    Ok(DecodedValues {
        abscissa,
        ordinates,
        points,
    })
}

/// Decode a sweep-less block whose entries declare their own types:
/// `"name" "type" value [PROP(...)]`, one sample each.
pub fn decode_text_self_typed(
    text: &str,
    line: usize,
    registry: &TypeRegistry,
) -> Result<(SignalTable, DecodedValues)> {
    let mut lexer = Lexer::new(text, line);
    let mut table = SignalTable::new();
    let mut ordinates = Vec::new();

    while !lexer.at_end()? {
        let name = lexer.expect_str("value name")?;
        let type_name = match lexer.next_token()? {
            Some(Token::Str(t)) => t,
            Some(other) => {
                return Err(lexer.error(format!(
                    "expected type of \"{}\", found {}",
                    name,
                    other.describe()
                )))
            }
            None => {
                return Err(PsfError::TruncatedValueBlock(format!(
                    "entry \"{}\" ends before its type",
                    name
                )))
            }
        };
        let ty = registry.resolve(&type_name)?;
        let value = parse_text_value(&mut lexer, &name, &ty)?;
        let properties = lexer.parse_props()?;

        let decl = Declaration {
            name,
            ty,
            properties,
        };
        let mut ordinate = Ordinate::with_capacity(&decl.ty, 1);
        push_value(&mut ordinate, value, &decl)?;
        table.push(decl)?;
        ordinates.push(ordinate);
    }

    debug!(signals = table.len(), "Self-typed value block decoded");
    let points = usize::from(!ordinates.is_empty());
    Ok((
        table,
        DecodedValues {
            abscissa: None,
            ordinates,
            points,
        },
    ))
}

fn expect_entry(lexer: &mut Lexer<'_>, name: &str, point: usize) -> Result<()> {
    match lexer.next_token()? {
        Some(Token::Str(s)) if s == name => Ok(()),
        Some(other) => Err(lexer.error(format!(
            "expected \"{}\" at point {}, found {}",
            name,
            point,
            other.describe()
        ))),
        None => Err(PsfError::TruncatedValueBlock(format!(
            "\"{}\" missing at point {}",
            name, point
        ))),
    }
}

fn next_value_token<'a>(lexer: &mut Lexer<'a>, name: &str) -> Result<Token<'a>> {
    lexer.next_token()?.ok_or_else(|| {
        PsfError::TruncatedValueBlock(format!("value of \"{}\" cut off", name))
    })
}

fn parse_number(lexer: &mut Lexer<'_>, name: &str, ty: &TypeDescriptor) -> Result<f64> {
    match next_value_token(lexer, name)? {
        Token::Real(x) => Ok(x),
        Token::Int(i) => Ok(i as f64),
        other => Err(PsfError::mismatch(name, ty.spelling(), other.describe())),
    }
}

/// Parse one textual element of type `ty`
fn parse_text_value(lexer: &mut Lexer<'_>, name: &str, ty: &TypeDescriptor) -> Result<Scalar> {
    match &ty.kind {
        TypeKind::Real(_) => match next_value_token(lexer, name)? {
            Token::Real(x) => Ok(Scalar::Real(x)),
            Token::Int(i) => Ok(Scalar::Real(i as f64)),
            other => Err(PsfError::mismatch(name, ty.spelling(), other.describe())),
        },
        TypeKind::Complex(_) => match next_value_token(lexer, name)? {
            Token::LParen => {
                let re = parse_number(lexer, name, ty)?;
                let im = parse_number(lexer, name, ty)?;
                match next_value_token(lexer, name)? {
                    Token::RParen => Ok(Scalar::Complex(Complex64::new(re, im))),
                    other => Err(PsfError::mismatch(
                        name,
                        "(re im) pair",
                        format!("extra {}", other.describe()),
                    )),
                }
            }
            other => Err(PsfError::mismatch(name, ty.spelling(), other.describe())),
        },
        TypeKind::Integer(_) => match next_value_token(lexer, name)? {
            Token::Int(i) => Ok(Scalar::Integer(i)),
            other => Err(PsfError::mismatch(name, ty.spelling(), other.describe())),
        },
        TypeKind::String => match next_value_token(lexer, name)? {
            Token::Str(s) => Ok(Scalar::Text(s)),
            other => Err(PsfError::mismatch(name, ty.spelling(), other.describe())),
        },
        TypeKind::Struct(members) => {
            expect_open(lexer, name, ty)?;
            let mut items = Vec::with_capacity(members.len());
            for member in members {
                items.push(parse_text_value(lexer, name, &member.ty)?);
            }
            match next_value_token(lexer, name)? {
                Token::RParen => Ok(Scalar::Composite(items)),
                other => Err(PsfError::mismatch(
                    name,
                    format!("{} struct members", members.len()),
                    format!("extra {}", other.describe()),
                )),
            }
        }
        TypeKind::Array(element) => {
            expect_open(lexer, name, ty)?;
            let mut items = Vec::new();
            loop {
                match lexer.peek()? {
                    Some(Token::RParen) => {
                        lexer.next_token()?;
                        return Ok(Scalar::Composite(items));
                    }
                    Some(_) => items.push(parse_text_value(lexer, name, element)?),
                    None => {
                        return Err(PsfError::TruncatedValueBlock(format!(
                            "array value of \"{}\" cut off",
                            name
                        )))
                    }
                }
            }
        }
    }
}

fn expect_open(lexer: &mut Lexer<'_>, name: &str, ty: &TypeDescriptor) -> Result<()> {
    match next_value_token(lexer, name)? {
        Token::LParen => Ok(()),
        other => Err(PsfError::mismatch(name, ty.spelling(), other.describe())),
    }
}

// ============================================================================
// Binary value block
// ============================================================================

/// Decode signal-major packed arrays
pub fn decode_binary(
    bytes: &[u8],
    endian: Endian,
    sweep: Option<&Declaration>,
    table: &SignalTable,
) -> Result<DecodedValues> {
    let mut cursor = ByteCursor::new(bytes, endian);
    let arrays = cursor.read_u32()? as usize;

    let explicit = match sweep {
        Some(_) if arrays == table.len() + 1 => true,
        _ if arrays == table.len() => false,
        _ => {
            return Err(PsfError::malformed(format!(
                "value block holds {} arrays for {} signals",
                arrays,
                table.len()
            )))
        }
    };

    let mut expected: Option<usize> = None;
    let abscissa = match sweep {
        Some(decl) if explicit => {
            let count = read_array_header(&mut cursor, decl)?;
            expected = Some(count);
            Some(read_sweep_array(&mut cursor, decl, count)?)
        }
        _ => None,
    };

    let mut ordinates = Vec::with_capacity(table.len());
    for decl in table.iter() {
        let count = read_array_header(&mut cursor, decl)?;
        match expected {
            Some(n) if n != count => {
                return Err(PsfError::malformed(format!(
                    "\"{}\" holds {} samples, expected {}",
                    decl.name, count, n
                )))
            }
            Some(_) => {}
            None => expected = Some(count),
        }
        ordinates.push(read_array(&mut cursor, decl, count)?);
        trace!(signal = %decl.name, count, "Array decoded");
    }

    if cursor.remaining() > 0 {
        return Err(PsfError::malformed(format!(
            "{} unread bytes after last value array",
            cursor.remaining()
        )));
    }

    let points = expected.unwrap_or(0);
    debug!(
        points,
        signals = table.len(),
        explicit_sweep = explicit,
        "Binary value block decoded"
    );
    Ok(DecodedValues {
        abscissa,
        ordinates,
        points,
    })
}

/// Read `width`, `count` and check both against the declaration
fn read_array_header(cursor: &mut ByteCursor<'_>, decl: &Declaration) -> Result<usize> {
    let width = cursor.read_u32()? as usize;
    let count = cursor.read_u32()? as usize;

    if !decl.ty.is_fixed_width() {
        return Err(PsfError::mismatch(
            &decl.name,
            "fixed-width element",
            format!("{} in binary payload", decl.ty.spelling()),
        ));
    }
    if width != decl.ty.byte_width {
        return Err(PsfError::mismatch(
            &decl.name,
            format!("{}-byte {}", decl.ty.byte_width, decl.ty.spelling()),
            format!("{}-byte elements", width),
        ));
    }

    let needed = width
        .checked_mul(count)
        .ok_or_else(|| PsfError::malformed(format!("\"{}\" size overflows", decl.name)))?;
    if needed > cursor.remaining() {
        return Err(PsfError::TruncatedValueBlock(format!(
            "\"{}\" needs {} bytes, {} left",
            decl.name,
            needed,
            cursor.remaining()
        )));
    }
    Ok(count)
}

fn read_sweep_array(
    cursor: &mut ByteCursor<'_>,
    decl: &Declaration,
    count: usize,
) -> Result<Vec<f64>> {
    let mut samples = Vec::with_capacity(count);
    match decl.ty.kind {
        TypeKind::Real(Precision::Double) => cursor.read_doubles_into(count, &mut samples)?,
        TypeKind::Real(Precision::Single) => cursor.read_floats_as_f64_into(count, &mut samples)?,
        _ => {
            for _ in 0..count {
                match read_scalar(cursor, &decl.name, &decl.ty)? {
                    Scalar::Integer(i) => samples.push(i as f64),
                    Scalar::Real(x) => samples.push(x),
                    other => {
                        return Err(PsfError::mismatch(
                            &decl.name,
                            decl.ty.spelling(),
                            describe(&other),
                        ))
                    }
                }
            }
        }
    }
    Ok(samples)
}

fn read_array(cursor: &mut ByteCursor<'_>, decl: &Declaration, count: usize) -> Result<Ordinate> {
    match decl.ty.kind {
        TypeKind::Real(Precision::Double) => {
            let mut v = Vec::with_capacity(count);
            cursor.read_doubles_into(count, &mut v)?;
            Ok(Ordinate::Real(v))
        }
        TypeKind::Real(Precision::Single) => {
            let mut v = Vec::with_capacity(count);
            cursor.read_floats_as_f64_into(count, &mut v)?;
            Ok(Ordinate::Real(v))
        }
        TypeKind::Complex(precision) => {
            let mut v = Vec::with_capacity(count);
            for _ in 0..count {
                let re = read_real(cursor, precision)?;
                let im = read_real(cursor, precision)?;
                v.push(Complex64::new(re, im));
            }
            Ok(Ordinate::Complex(v))
        }
        _ => {
            let mut ordinate = Ordinate::with_capacity(&decl.ty, count);
            for _ in 0..count {
                let value = read_scalar(cursor, &decl.name, &decl.ty)?;
                push_value(&mut ordinate, value, decl)?;
            }
            Ok(ordinate)
        }
    }
}

#[inline]
fn read_real(cursor: &mut ByteCursor<'_>, precision: Precision) -> Result<f64> {
    match precision {
        Precision::Single => Ok(cursor.read_f32()? as f64),
        Precision::Double => cursor.read_f64(),
    }
}

/// Read one packed element of type `ty`
fn read_scalar(cursor: &mut ByteCursor<'_>, name: &str, ty: &TypeDescriptor) -> Result<Scalar> {
    match &ty.kind {
        TypeKind::Real(p) => Ok(Scalar::Real(read_real(cursor, *p)?)),
        TypeKind::Complex(p) => {
            let re = read_real(cursor, *p)?;
            let im = read_real(cursor, *p)?;
            Ok(Scalar::Complex(Complex64::new(re, im)))
        }
        TypeKind::Integer(IntWidth::Byte) => Ok(Scalar::Integer(cursor.read_i8()? as i64)),
        TypeKind::Integer(IntWidth::Long) => Ok(Scalar::Integer(cursor.read_i32()? as i64)),
        TypeKind::Struct(members) => {
            let mut items = Vec::with_capacity(members.len());
            for member in members {
                items.push(read_scalar(cursor, name, &member.ty)?);
            }
            Ok(Scalar::Composite(items))
        }
        TypeKind::String | TypeKind::Array(_) => Err(PsfError::mismatch(
            name,
            "fixed-width element",
            format!("{} in binary payload", ty.spelling()),
        )),
    }
}
