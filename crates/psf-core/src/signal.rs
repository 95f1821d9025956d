//! Signal table
//!
//! Binds each TRACE declaration to its type and its position in the value
//! block. Groups are flattened in declaration order.

use crate::lexer::Lexer;
use crate::registry::{Declaration, TypeRegistry};
use crate::types::*;
use std::collections::HashSet;
use tracing::debug;

/// Ordered signal declarations with unique names
#[derive(Debug, Default)]
pub struct SignalTable {
    decls: Vec<Declaration>,
    names: HashSet<String>,
}

impl SignalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TRACE section body
    pub fn parse(text: &str, line: usize, registry: &TypeRegistry) -> Result<Self> {
        let mut table = Self::new();
        let mut lexer = Lexer::new(text, line);

        while !lexer.at_end()? {
            let name = lexer.expect_str("trace name")?;
            if lexer.eat_word("GROUP")? {
                let count = lexer.expect_integer("group size")?;
                if count < 0 {
                    return Err(lexer.error(format!("group \"{}\" has size {}", name, count)));
                }
                lexer.parse_props()?;
                debug!(group = %name, members = count, "Trace group");
                for _ in 0..count {
                    if lexer.at_end()? {
                        return Err(lexer.error(format!(
                            "group \"{}\" declares {} members, section ended early",
                            name, count
                        )));
                    }
                    let member = lexer.expect_str("trace name")?;
                    table.push(Declaration::parse_rest(member, &mut lexer, registry)?)?;
                }
            } else {
                table.push(Declaration::parse_rest(name, &mut lexer, registry)?)?;
            }
        }

        debug!(signals = table.len(), "Trace table parsed");
        Ok(table)
    }

    /// Append a declaration; names must be unique
    pub fn push(&mut self, decl: Declaration) -> Result<()> {
        if !self.names.insert(decl.name.clone()) {
            return Err(PsfError::DuplicateSignal(decl.name));
        }
        self.decls.push(decl);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Declaration> {
        self.decls.iter()
    }

    /// Attach decoded ordinates, consuming the table
    pub fn into_signals(self, ordinates: Vec<Ordinate>) -> Result<Vec<Signal>> {
        if ordinates.len() != self.decls.len() {
            return Err(PsfError::malformed(format!(
                "{} signals declared, {} decoded",
                self.decls.len(),
                ordinates.len()
            )));
        }
        Ok(self
            .decls
            .into_iter()
            .zip(ordinates)
            .map(|(decl, ordinate)| Signal {
                units: decl.units().to_string(),
                name: decl.name,
                ty: decl.ty,
                properties: decl.properties,
                ordinate,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::parse(
            concat!(
                "\"V\" COMPLEX DOUBLE PROP( \"units\" \"V\" )\n",
                "\"I\" COMPLEX DOUBLE PROP( \"units\" \"A\" )\n",
                "\"N\" FLOAT DOUBLE PROP( \"units\" \"V^2/Hz\" )\n",
            ),
            1,
        )
        .unwrap()
    }

    #[test]
    fn test_group_is_flattened_in_order() {
        let text = "\"group\" GROUP 3\n\"VTOP:p\" \"I\"\n\"top\" \"V\"\n\"out\" \"N\" PROP( \"units\" \"V/sqrt(Hz)\" )\n";
        let table = SignalTable::parse(text, 1, &registry()).unwrap();
        let names: Vec<_> = table.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["VTOP:p", "top", "out"]);
        let units: Vec<_> = table.iter().map(|d| d.units()).collect();
        assert_eq!(units, vec!["A", "V", "V/sqrt(Hz)"]);
    }

    #[test]
    fn test_ungrouped_traces() {
        let table = SignalTable::parse("\"a\" \"V\"\n\"b\" \"N\"\n", 1, &registry()).unwrap();
        assert_eq!(table.len(), 2);
        let second = table.iter().nth(1).unwrap();
        assert_eq!(second.ty.kind, TypeKind::Real(Precision::Double));
    }

    #[test]
    fn test_duplicate_signal() {
        let err = SignalTable::parse("\"a\" \"V\"\n\"a\" \"I\"\n", 1, &registry()).unwrap_err();
        assert!(matches!(err, PsfError::DuplicateSignal(ref n) if n == "a"));
    }

    #[test]
    fn test_unknown_trace_type() {
        let err = SignalTable::parse("\"a\" \"Q\"\n", 1, &registry()).unwrap_err();
        assert!(matches!(err, PsfError::UnknownType(_)));
    }

    #[test]
    fn test_short_group() {
        let err = SignalTable::parse("\"g\" GROUP 2\n\"a\" \"V\"\n", 1, &registry()).unwrap_err();
        assert!(matches!(err, PsfError::MalformedContainer(_)));
    }

    #[test]
    fn test_into_signals_attaches_units() {
        let table = SignalTable::parse("\"top\" \"V\"\n", 1, &registry()).unwrap();
        let signals = table
            .into_signals(vec![Ordinate::Complex(Vec::new())])
            .unwrap();
        assert_eq!(signals[0].units, "V");
        assert_eq!(signals[0].name, "top");
    }
}
