//! Caller supplied description of everything an expression may reference.
//!
//! The serde model mirrors the JSON configuration hosts already use:
//!
//! ```json
//! {
//!   "types": { "User": { "identifiers": [{ "name": "email", "type": ["string"] }] } },
//!   "identifiers": [{ "name": "user", "type": ["User"] }],
//!   "functions": [{ "name": "len", "args": [{ "name": "value" }], "returnType": ["number"] }]
//! }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{LookupError, SchemaError};
use crate::syntax::lexer::normalize_keyword;
use crate::syntax::SyntaxKind;
use crate::types::{TypeName, TypeSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identifier {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeSet>,
}

impl Identifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_type<'a>(mut self, types: impl IntoIterator<Item = &'a str>) -> Self {
        self.ty = Some(types.into_iter().collect());
        self
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_type<'a>(mut self, types: impl IntoIterator<Item = &'a str>) -> Self {
        self.ty = Some(types.into_iter().collect());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<TypeSet>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_arg(mut self, parameter: Parameter) -> Self {
        self.args.push(parameter);
        self
    }

    pub fn returning<'a>(mut self, types: impl IntoIterator<Item = &'a str>) -> Self {
        self.return_type = Some(types.into_iter().collect());
        self
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    pub fn arity(&self) -> Arity {
        Arity {
            min: self.args.iter().filter(|arg| !arg.optional).count(),
            max: self.args.len(),
        }
    }

    /// Completion label: `name(a,b)`.
    pub fn label(&self) -> String {
        let names: Vec<&str> = self.args.iter().map(|arg| arg.name.as_str()).collect();
        format!("{}({})", self.name, names.join(","))
    }
}

/// Accepted argument count of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: usize,
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = |count: usize| if count == 1 { "argument" } else { "arguments" };
        if self.max == 0 {
            write!(f, "no arguments")
        } else if self.min == self.max {
            write!(f, "exactly {} {}", self.max, plural(self.max))
        } else {
            write!(f, "between {} and {} arguments", self.min, self.max)
        }
    }
}

/// Members of one user defined object type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDeclaration {
    #[serde(default)]
    pub identifiers: Vec<Identifier>,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorKeyword {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl OperatorKeyword {
    fn builtin(name: &str, info: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            detail: None,
            info: info.map(str::to_string),
        }
    }
}

pub fn default_operator_keywords() -> Vec<OperatorKeyword> {
    vec![
        OperatorKeyword::builtin(
            "starts with",
            Some("Check if a string starts with a specific string"),
        ),
        OperatorKeyword::builtin(
            "ends with",
            Some("Check if a string ends with a specific string"),
        ),
        OperatorKeyword::builtin(
            "contains",
            Some("Check if a string is not included in another string"),
        ),
        OperatorKeyword::builtin("matches", Some("Check if a string matches a regex pattern")),
        OperatorKeyword::builtin("not in", Some("Check if a value is not included in an array")),
        OperatorKeyword::builtin("in", Some("Check if a value is included in an array")),
        OperatorKeyword::builtin("not", None),
        OperatorKeyword::builtin("or", None),
        OperatorKeyword::builtin("and", None),
        OperatorKeyword::builtin("xor", None),
    ]
}

pub type LookupResult = Result<Option<Arc<TypeDeclaration>>, LookupError>;

/// Hook for fetching type declarations that are not (or not only) held in
/// [`Schema::types`], e.g. loaded lazily from a host registry.
pub trait TypeResolver: Send + Sync {
    fn resolve(&self, name: &TypeName) -> LookupResult;
}

impl<F> TypeResolver for F
where
    F: Fn(&TypeName) -> LookupResult + Send + Sync,
{
    fn resolve(&self, name: &TypeName) -> LookupResult {
        self(name)
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(default)]
    pub types: IndexMap<String, Arc<TypeDeclaration>>,
    #[serde(default)]
    pub identifiers: Vec<Identifier>,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default = "default_operator_keywords")]
    pub operator_keywords: Vec<OperatorKeyword>,
    #[serde(skip)]
    type_resolver: Option<Arc<dyn TypeResolver>>,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            types: IndexMap::new(),
            identifiers: Vec::new(),
            functions: Vec::new(),
            operator_keywords: default_operator_keywords(),
            type_resolver: None,
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("types", &self.types)
            .field("identifiers", &self.identifiers)
            .field("functions", &self.functions)
            .field("operator_keywords", &self.operator_keywords)
            .field("type_resolver", &self.type_resolver.is_some())
            .finish()
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(input: &str) -> Result<Self, SchemaError> {
        let schema: Schema = serde_json::from_str(input)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn from_yaml_str(input: &str) -> Result<Self, SchemaError> {
        let schema: Schema = serde_yaml::from_str(input)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Decodes the contents of a schema file named `path`: YAML for
    /// `.yaml`/`.yml`, JSON otherwise. Reading the file is up to the caller.
    pub fn from_file_contents(path: &Path, contents: &str) -> Result<Self, SchemaError> {
        match path.extension().and_then(|extension| extension.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(contents),
            _ => Self::from_json_str(contents),
        }
    }

    pub fn with_type(mut self, name: impl Into<String>, declaration: TypeDeclaration) -> Self {
        self.types.insert(name.into(), Arc::new(declaration));
        self
    }

    pub fn with_identifier(mut self, identifier: Identifier) -> Self {
        self.identifiers.push(identifier);
        self
    }

    pub fn with_function(mut self, function: Function) -> Self {
        self.functions.push(function);
        self
    }

    /// Replaces the direct `types` lookup with `resolver`.
    pub fn with_type_resolver(mut self, resolver: impl TypeResolver + 'static) -> Self {
        self.type_resolver = Some(Arc::new(resolver));
        self
    }

    /// Checks that optional parameters trail required ones and that no
    /// function repeats a parameter name.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let type_functions = self.types.values().flat_map(|decl| decl.functions.iter());
        for function in self.functions.iter().chain(type_functions) {
            let mut seen_optional = false;
            let mut names = HashSet::new();
            for arg in &function.args {
                if !names.insert(arg.name.as_str()) {
                    return Err(SchemaError::DuplicateParameter {
                        function: function.name.clone(),
                        parameter: arg.name.clone(),
                    });
                }
                if arg.optional {
                    seen_optional = true;
                } else if seen_optional {
                    return Err(SchemaError::RequiredAfterOptional {
                        function: function.name.clone(),
                        parameter: arg.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Looks up the declaration for `name` through the resolver hook, or
    /// directly in `types` when no hook is installed.
    pub fn type_declaration(&self, name: &TypeName) -> LookupResult {
        match &self.type_resolver {
            Some(resolver) => resolver.resolve(name),
            None => Ok(self.types.get(name.to_string().as_str()).cloned()),
        }
    }

    pub fn operator_keyword(&self, name: &str) -> Option<&OperatorKeyword> {
        let name = normalize_keyword(name);
        self.operator_keywords
            .iter()
            .find(|keyword| keyword.name == name)
    }
}

/// A namespace of identifiers and functions: the top-level schema or the
/// members of one type.
pub trait Scope {
    fn identifiers(&self) -> &[Identifier];
    fn functions(&self) -> &[Function];

    fn identifier(&self, name: &str) -> Option<&Identifier> {
        self.identifiers().iter().find(|identifier| identifier.name == name)
    }

    fn function(&self, name: &str) -> Option<&Function> {
        self.functions().iter().find(|function| function.name == name)
    }
}

impl Scope for Schema {
    fn identifiers(&self) -> &[Identifier] {
        &self.identifiers
    }

    fn functions(&self) -> &[Function] {
        &self.functions
    }
}

impl Scope for TypeDeclaration {
    fn identifiers(&self) -> &[Identifier] {
        &self.identifiers
    }

    fn functions(&self) -> &[Function] {
        &self.functions
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Definition<'s> {
    Identifier(&'s Identifier),
    Function(&'s Function),
}

impl<'s> Definition<'s> {
    pub fn info(&self) -> Option<&'s str> {
        match self {
            Definition::Identifier(identifier) => identifier.info.as_deref(),
            Definition::Function(function) => function.info.as_deref(),
        }
    }

    /// Declared type of an identifier, or return type of a function.
    pub fn result_type(&self) -> Option<&'s TypeSet> {
        match self {
            Definition::Identifier(identifier) => identifier.ty.as_ref(),
            Definition::Function(function) => function.return_type.as_ref(),
        }
    }
}

/// Exact-name lookup of a reference of the given kind. Functions and methods
/// resolve against functions, variables and properties against identifiers.
pub fn resolve_identifier<'s, S>(kind: SyntaxKind, name: &str, scope: &'s S) -> Option<Definition<'s>>
where
    S: Scope + ?Sized,
{
    match kind {
        SyntaxKind::Function | SyntaxKind::Method => {
            scope.function(name).map(Definition::Function)
        }
        SyntaxKind::Variable | SyntaxKind::Property => {
            scope.identifier(name).map(Definition::Identifier)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: &str = r#"{
        "types": {
            "custom44": {
                "identifiers": [{"name": "property11", "type": ["any"]}],
                "functions": [{"name": "firstMethod", "args": [], "returnType": ["custom44"]}]
            }
        },
        "identifiers": [{"name": "obj", "type": ["custom44"], "info": "An object"}],
        "functions": [
            {"name": "any_fn", "args": [{"name": "anything", "type": ["any"]}, {"name": "optional", "optional": true}]}
        ]
    }"#;

    #[test]
    fn parses_json_schema_with_default_keywords() {
        let schema = Schema::from_json_str(JSON).unwrap();
        assert_eq!(schema.identifiers[0].ty.as_ref().unwrap().to_string(), "custom44");
        assert_eq!(schema.functions[0].arity(), Arity { min: 1, max: 2 });
        assert_eq!(schema.operator_keywords.len(), 10);
        assert!(schema.operator_keyword("not   in").is_some());
    }

    #[test]
    fn parses_yaml_schema() {
        let yaml = "
identifiers:
  - name: arr
    type: ['string[]']
functions:
  - name: smh
    returnType: [string]
operatorKeywords:
  - name: in
";
        let schema = Schema::from_yaml_str(yaml).unwrap();
        assert_eq!(schema.identifiers[0].ty.as_ref().unwrap().to_string(), "string[]");
        assert_eq!(schema.functions[0].label(), "smh()");
        assert_eq!(schema.operator_keywords.len(), 1);
    }

    #[test]
    fn rejects_required_after_optional() {
        let json = r#"{"functions": [{"name": "f", "args": [{"name": "a", "optional": true}, {"name": "b"}]}]}"#;
        let err = Schema::from_json_str(json).unwrap_err();
        assert!(matches!(err, SchemaError::RequiredAfterOptional { .. }));
        assert_eq!(
            err.to_string(),
            "function `f`: required parameter `b` follows an optional one"
        );
    }

    #[test]
    fn rejects_duplicate_parameters() {
        let json = r#"{"functions": [{"name": "f", "args": [{"name": "a"}, {"name": "a"}]}]}"#;
        assert!(matches!(
            Schema::from_json_str(json),
            Err(SchemaError::DuplicateParameter { .. })
        ));
    }

    #[test]
    fn arity_descriptions() {
        let describe = |min, max| Arity { min, max }.to_string();
        assert_eq!(describe(0, 0), "no arguments");
        assert_eq!(describe(1, 1), "exactly 1 argument");
        assert_eq!(describe(2, 2), "exactly 2 arguments");
        assert_eq!(describe(1, 2), "between 1 and 2 arguments");
    }

    #[test]
    fn resolver_hook_replaces_direct_lookup() {
        let schema = Schema::new().with_type_resolver(|name: &TypeName| -> LookupResult {
            if name.to_string() == "remote" {
                Ok(Some(Arc::new(TypeDeclaration::default())))
            } else {
                Err(LookupError::new(name.to_string(), "unreachable registry"))
            }
        });
        assert!(schema
            .type_declaration(&TypeName::parse("remote"))
            .unwrap()
            .is_some());
        assert!(schema.type_declaration(&TypeName::parse("other")).is_err());
    }

    #[test]
    fn resolve_identifier_dispatches_on_kind() {
        let schema = Schema::from_json_str(JSON).unwrap();
        let found = resolve_identifier(SyntaxKind::Variable, "obj", &schema).unwrap();
        assert_eq!(found.info(), Some("An object"));
        assert!(resolve_identifier(SyntaxKind::Function, "obj", &schema).is_none());

        let decl = schema.types["custom44"].clone();
        let method = resolve_identifier(SyntaxKind::Method, "firstMethod", decl.as_ref()).unwrap();
        assert_eq!(method.result_type().unwrap().to_string(), "custom44");
    }

    #[test]
    fn file_contents_are_decoded_by_extension() {
        let yaml = "identifiers:\n  - name: obj\n";
        let schema = Schema::from_file_contents(Path::new("schema.yml"), yaml).unwrap();
        assert_eq!(schema.identifiers[0].name, "obj");

        let error = Schema::from_file_contents(Path::new("schema.json"), yaml).unwrap_err();
        assert!(matches!(error, SchemaError::Json(_)));
    }
}
