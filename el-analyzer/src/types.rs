use std::fmt;
use std::str::FromStr;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// A single type name as spelled in a schema: a built-in scalar, a user
/// declared type, or an array of another type (`string[][]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TypeName {
    Bool,
    Number,
    String,
    Null,
    Any,
    /// Array literal without a known element type.
    Array,
    /// Hash literal without a declared shape.
    Object,
    Named(String),
    ArrayOf(Box<TypeName>),
}

impl TypeName {
    pub fn parse(spelling: &str) -> Self {
        let spelling = spelling.trim();
        if let Some(element) = spelling.strip_suffix("[]") {
            return TypeName::ArrayOf(Box::new(TypeName::parse(element)));
        }

        match spelling {
            "bool" => TypeName::Bool,
            "number" => TypeName::Number,
            "string" => TypeName::String,
            "null" => TypeName::Null,
            "any" => TypeName::Any,
            "array" => TypeName::Array,
            "object" => TypeName::Object,
            other => TypeName::Named(other.to_string()),
        }
    }

    pub fn array_of(element: TypeName) -> Self {
        TypeName::ArrayOf(Box::new(element))
    }

    /// Type produced by indexing into a value of this type, if it is an array.
    pub fn element(&self) -> Option<TypeName> {
        match self {
            TypeName::ArrayOf(element) => Some((**element).clone()),
            TypeName::Array => Some(TypeName::Any),
            _ => None,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, TypeName::Array | TypeName::ArrayOf(_))
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeName::Bool => write!(f, "bool"),
            TypeName::Number => write!(f, "number"),
            TypeName::String => write!(f, "string"),
            TypeName::Null => write!(f, "null"),
            TypeName::Any => write!(f, "any"),
            TypeName::Array => write!(f, "array"),
            TypeName::Object => write!(f, "object"),
            TypeName::Named(name) => write!(f, "{name}"),
            TypeName::ArrayOf(element) => write!(f, "{element}[]"),
        }
    }
}

impl FromStr for TypeName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TypeName::parse(s))
    }
}

impl From<String> for TypeName {
    fn from(value: String) -> Self {
        TypeName::parse(&value)
    }
}

impl From<&str> for TypeName {
    fn from(value: &str) -> Self {
        TypeName::parse(value)
    }
}

impl From<TypeName> for String {
    fn from(value: TypeName) -> Self {
        value.to_string()
    }
}

/// Union of the possible result types of an expression, in the order the
/// members were first contributed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeSet(IndexSet<TypeName>);

impl TypeSet {
    pub fn new() -> Self {
        Self(IndexSet::new())
    }

    pub fn any() -> Self {
        Self::of(TypeName::Any)
    }

    pub fn of(ty: TypeName) -> Self {
        let mut set = Self::new();
        set.insert(ty);
        set
    }

    pub fn insert(&mut self, ty: TypeName) -> bool {
        self.0.insert(ty)
    }

    pub fn extend<I: IntoIterator<Item = TypeName>>(&mut self, types: I) {
        self.0.extend(types);
    }

    pub fn contains(&self, ty: &TypeName) -> bool {
        self.0.contains(ty)
    }

    pub fn includes_any(&self) -> bool {
        self.contains(&TypeName::Any)
    }

    pub fn includes_array(&self) -> bool {
        self.0.iter().any(TypeName::is_array)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeName> {
        self.0.iter()
    }

    /// Replaces an empty set with `{any}`.
    pub fn or_any(mut self) -> Self {
        if self.0.is_empty() {
            self.0.insert(TypeName::Any);
        }
        self
    }

    /// Whether a value of the `actual` types may be passed where `self` is expected.
    pub fn accepts(&self, actual: &TypeSet) -> bool {
        if self.includes_any() || actual.includes_any() {
            return true;
        }

        actual.iter().any(|candidate| {
            self.iter().any(|expected| {
                expected == candidate || (*expected == TypeName::Array && candidate.is_array())
            })
        })
    }
}

impl fmt::Display for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, ty) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("|")?;
            }
            write!(f, "{ty}")?;
        }
        Ok(())
    }
}

impl FromIterator<TypeName> for TypeSet {
    fn from_iter<I: IntoIterator<Item = TypeName>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for TypeSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(TypeName::parse).collect()
    }
}

impl IntoIterator for TypeSet {
    type Item = TypeName;
    type IntoIter = indexmap::set::IntoIter<TypeName>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a TypeSet {
    type Item = &'a TypeName;
    type IntoIter = indexmap::set::Iter<'a, TypeName>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_array_spelling() {
        let ty = TypeName::parse("string[][]");
        assert_eq!(
            ty,
            TypeName::array_of(TypeName::array_of(TypeName::String))
        );
        assert_eq!(ty.to_string(), "string[][]");
        assert_eq!(ty.element().map(|t| t.to_string()).as_deref(), Some("string[]"));
    }

    #[test]
    fn untyped_array_indexes_to_any() {
        assert_eq!(TypeName::Array.element(), Some(TypeName::Any));
        assert_eq!(TypeName::Named("custom44".into()).element(), None);
    }

    #[test]
    fn empty_set_normalizes_to_any() {
        assert_eq!(TypeSet::new().or_any().to_string(), "any");
        assert_eq!(TypeSet::of(TypeName::Bool).or_any().to_string(), "bool");
    }

    #[test]
    fn union_keeps_first_contribution_order() {
        let mut set = TypeSet::of(TypeName::Named("custom44".into()));
        set.insert(TypeName::Bool);
        set.insert(TypeName::Named("custom44".into()));
        assert_eq!(set.to_string(), "custom44|bool");
    }

    #[test]
    fn accepts_matches_members_and_untyped_arrays() {
        let expected: TypeSet = ["object"].into_iter().collect();
        assert!(!expected.accepts(&TypeSet::of(TypeName::Number)));
        assert!(expected.accepts(&TypeSet::any()));

        let arrays = TypeSet::of(TypeName::Array);
        assert!(arrays.accepts(&TypeSet::of(TypeName::parse("string[]"))));
    }

    #[test]
    fn deserializes_from_schema_strings() {
        let set: TypeSet = serde_json::from_str(r#"["custom44", "string[]"]"#).unwrap();
        assert_eq!(set.to_string(), "custom44|string[]");
    }
}
