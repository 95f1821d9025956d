//! Type registry
//!
//! Parses the TYPE section into shared [`TypeDescriptor`]s. Types are
//! interned once as `Arc`s; sweeps and signals hold references to them.

use crate::lexer::{Lexer, Token};
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Mapping from type identifier to descriptor, in declaration order
#[derive(Debug, Default)]
pub struct TypeRegistry {
    by_name: HashMap<String, Arc<TypeDescriptor>>,
    order: Vec<Arc<TypeDescriptor>>,
}

/// Right-hand side of a declaration before it is named
enum TypeDef {
    Kind(TypeKind),
    Ref(Arc<TypeDescriptor>),
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TYPE section body
    pub fn parse(text: &str, line: usize) -> Result<Self> {
        let mut registry = Self::new();
        let mut lexer = Lexer::new(text, line);

        while !lexer.at_end()? {
            let name = lexer.expect_str("type name")?;
            let def = registry.parse_typedef(&mut lexer)?;
            let props = lexer.parse_props()?;
            let descriptor = Self::build(name, def, props);
            registry.insert(descriptor, &lexer)?;
        }

        debug!(types = registry.len(), "Type table parsed");
        Ok(registry)
    }

    /// Look up a declared type
    pub fn resolve(&self, id: &str) -> Result<Arc<TypeDescriptor>> {
        self.by_name
            .get(id)
            .cloned()
            .ok_or_else(|| PsfError::UnknownType(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TypeDescriptor>> {
        self.order.iter()
    }

    fn insert(&mut self, descriptor: TypeDescriptor, lexer: &Lexer<'_>) -> Result<()> {
        if self.by_name.contains_key(&descriptor.name) {
            return Err(lexer.error(format!("type \"{}\" declared twice", descriptor.name)));
        }
        let descriptor = Arc::new(descriptor);
        self.by_name
            .insert(descriptor.name.clone(), Arc::clone(&descriptor));
        self.order.push(descriptor);
        Ok(())
    }

    /// Name a parsed definition. A reference inherits the referenced
    /// kind and properties; its own properties take precedence.
    fn build(name: String, def: TypeDef, props: Properties) -> TypeDescriptor {
        match def {
            TypeDef::Kind(kind) => TypeDescriptor::new(name, kind, props),
            TypeDef::Ref(target) => {
                let mut merged = target.properties.clone();
                for (key, value) in props.iter() {
                    merged.insert(key, value.clone());
                }
                TypeDescriptor::new(name, target.kind.clone(), merged)
            }
        }
    }

    fn parse_typedef(&self, lexer: &mut Lexer<'_>) -> Result<TypeDef> {
        let kind = match lexer.expect_token("type definition")? {
            Token::Str(id) => return Ok(TypeDef::Ref(self.resolve(&id)?)),
            Token::Word("FLOAT") => TypeKind::Real(Self::parse_precision(lexer)?),
            Token::Word("COMPLEX") => TypeKind::Complex(Self::parse_precision(lexer)?),
            Token::Word("INT") => match lexer.expect_token("BYTE or LONG")? {
                Token::Word("BYTE") => TypeKind::Integer(IntWidth::Byte),
                Token::Word("LONG") => TypeKind::Integer(IntWidth::Long),
                other => {
                    return Err(lexer.error(format!(
                        "expected BYTE or LONG, found {}",
                        other.describe()
                    )))
                }
            },
            Token::Word("STRING") => match lexer.expect_token("'*'")? {
                Token::Star => TypeKind::String,
                other => {
                    return Err(
                        lexer.error(format!("expected '*', found {}", other.describe()))
                    )
                }
            },
            Token::Word("STRUCT") => TypeKind::Struct(self.parse_members(lexer)?),
            Token::Word("ARRAY") => {
                lexer.expect_lparen()?;
                match lexer.expect_token("'*'")? {
                    Token::Star => {}
                    other => {
                        return Err(
                            lexer.error(format!("expected '*', found {}", other.describe()))
                        )
                    }
                }
                lexer.expect_rparen()?;
                let element = match self.parse_typedef(lexer)? {
                    TypeDef::Ref(target) => target,
                    TypeDef::Kind(kind) => {
                        Arc::new(TypeDescriptor::new("element", kind, Properties::new()))
                    }
                };
                TypeKind::Array(element)
            }
            other => {
                return Err(lexer.error(format!(
                    "expected type definition, found {}",
                    other.describe()
                )))
            }
        };
        Ok(TypeDef::Kind(kind))
    }

    fn parse_precision(lexer: &mut Lexer<'_>) -> Result<Precision> {
        match lexer.expect_token("SINGLE or DOUBLE")? {
            Token::Word("SINGLE") => Ok(Precision::Single),
            Token::Word("DOUBLE") => Ok(Precision::Double),
            other => Err(lexer.error(format!(
                "expected SINGLE or DOUBLE, found {}",
                other.describe()
            ))),
        }
    }

    fn parse_members(&self, lexer: &mut Lexer<'_>) -> Result<Vec<Member>> {
        lexer.expect_lparen()?;
        let mut members = Vec::new();
        loop {
            if matches!(lexer.peek()?, Some(Token::RParen)) {
                lexer.next_token()?;
                return Ok(members);
            }
            let name = lexer.expect_str("member name")?;
            let def = self.parse_typedef(lexer)?;
            let props = lexer.parse_props()?;
            let ty = match def {
                TypeDef::Ref(target) if props.is_empty() => target,
                def => Arc::new(Self::build(name.clone(), def, props)),
            };
            members.push(Member { name, ty });
        }
    }
}

/// A `"name" "type" [PROP(...)]` entry, as used by SWEEP and TRACE
#[derive(Debug, Clone)]
pub struct Declaration {
    pub name: String,
    pub ty: Arc<TypeDescriptor>,
    pub properties: Properties,
}

impl Declaration {
    /// Parse one entry whose name has already been consumed
    pub fn parse_rest(
        name: String,
        lexer: &mut Lexer<'_>,
        registry: &TypeRegistry,
    ) -> Result<Self> {
        let type_name = lexer.expect_str("type reference")?;
        let ty = registry.resolve(&type_name)?;
        let properties = lexer.parse_props()?;
        Ok(Self {
            name,
            ty,
            properties,
        })
    }

    /// Own units, else the type's, else empty
    pub fn units(&self) -> &str {
        self.properties
            .get_str(PROP_UNITS)
            .unwrap_or_else(|| self.ty.units())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AC_TYPES: &str = r#"
"sweep" FLOAT DOUBLE PROP(
"key" "sweep"
)
"V" COMPLEX DOUBLE PROP(
"key" "node"
"units" "V"
)
"I" COMPLEX DOUBLE PROP(
"key" "branch"
"units" "A"
)
"#;

    #[test]
    fn test_parses_scalar_types() {
        let registry = TypeRegistry::parse(AC_TYPES, 1).unwrap();
        assert_eq!(registry.len(), 3);

        let v = registry.resolve("V").unwrap();
        assert_eq!(v.kind, TypeKind::Complex(Precision::Double));
        assert_eq!(v.byte_width, 16);
        assert_eq!(v.units(), "V");

        let sweep = registry.resolve("sweep").unwrap();
        assert_eq!(sweep.kind, TypeKind::Real(Precision::Double));
        assert_eq!(sweep.units(), "");
    }

    #[test]
    fn test_types_are_shared() {
        let registry = TypeRegistry::parse(AC_TYPES, 1).unwrap();
        let a = registry.resolve("I").unwrap();
        let b = registry.resolve("I").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_struct_with_inline_and_referenced_members() {
        let text = r#"
"density" FLOAT DOUBLE PROP( "units" "V^2/Hz" )
"contrib" STRUCT(
"total" "density"
"fn" FLOAT DOUBLE PROP( "units" "V^2/Hz" )
"index" INT LONG
) PROP( "key" "noise" )
"#;
        let registry = TypeRegistry::parse(text, 1).unwrap();
        let contrib = registry.resolve("contrib").unwrap();
        let TypeKind::Struct(members) = &contrib.kind else {
            panic!("expected struct, got {:?}", contrib.kind);
        };
        assert_eq!(members.len(), 3);
        assert!(Arc::ptr_eq(&members[0].ty, &registry.resolve("density").unwrap()));
        assert_eq!(members[1].ty.units(), "V^2/Hz");
        assert_eq!(contrib.byte_width, 8 + 8 + 4);
        assert_eq!(contrib.properties.get_str("key"), Some("noise"));
    }

    #[test]
    fn test_array_and_string() {
        let text = "\"name\" STRING *\n\"wave\" ARRAY ( * ) FLOAT SINGLE\n";
        let registry = TypeRegistry::parse(text, 1).unwrap();
        assert_eq!(registry.resolve("name").unwrap().kind, TypeKind::String);
        let wave = registry.resolve("wave").unwrap();
        match &wave.kind {
            TypeKind::Array(elem) => assert_eq!(elem.kind, TypeKind::Real(Precision::Single)),
            other => panic!("expected array, got {:?}", other),
        }
        assert!(!wave.is_fixed_width());
    }

    #[test]
    fn test_forward_reference_is_unknown_type() {
        let text = "\"pair\" STRUCT( \"a\" \"later\" )\n\"later\" FLOAT DOUBLE\n";
        let err = TypeRegistry::parse(text, 1).unwrap_err();
        assert!(matches!(err, PsfError::UnknownType(ref id) if id == "later"));
    }

    #[test]
    fn test_alias_inherits_and_overrides() {
        let text = "\"V\" FLOAT DOUBLE PROP( \"units\" \"V\" )\n\"Vn\" \"V\" PROP( \"units\" \"V/sqrt(Hz)\" )\n";
        let registry = TypeRegistry::parse(text, 1).unwrap();
        let vn = registry.resolve("Vn").unwrap();
        assert_eq!(vn.kind, TypeKind::Real(Precision::Double));
        assert_eq!(vn.units(), "V/sqrt(Hz)");
    }

    #[test]
    fn test_duplicate_type_and_bad_keyword() {
        let dup = "\"V\" FLOAT DOUBLE\n\"V\" FLOAT SINGLE\n";
        assert!(matches!(
            TypeRegistry::parse(dup, 1).unwrap_err(),
            PsfError::MalformedContainer(_)
        ));
        let bad = "\"V\" FLOAT QUAD\n";
        let err = TypeRegistry::parse(bad, 7).unwrap_err();
        assert!(err.to_string().contains("line 7"));
    }

    #[test]
    fn test_unknown_resolve() {
        let registry = TypeRegistry::new();
        assert!(matches!(
            registry.resolve("V"),
            Err(PsfError::UnknownType(_))
        ));
    }
}
