use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use crate::schema::{resolve_identifier, Function, Schema, Scope, TypeDeclaration};
use crate::syntax::{SyntaxKind, SyntaxNode};
use crate::types::{TypeName, TypeSet};

/// How much of a damaged tree the resolver is willing to look through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveMode {
    /// Only well-formed nodes contribute types.
    #[default]
    Exact,
    /// `Error` nodes contribute the type of their last operand, so code
    /// assistance keeps working while the user is mid-edit.
    Lenient,
}

/// State for one analysis pass over one tree.
///
/// Type declaration lookups are memoized for the lifetime of the analyzer,
/// which callers keep to a single pass so a swapped schema or resolver is
/// always observed by the next pass.
pub struct Analyzer<'s> {
    schema: &'s Schema,
    declarations: RefCell<HashMap<TypeName, Option<Arc<TypeDeclaration>>>>,
}

impl<'s> Analyzer<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            declarations: RefCell::new(HashMap::new()),
        }
    }

    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    /// Type declaration for `name`. Lookup failures are logged and treated as
    /// "no declaration".
    pub fn declaration(&self, name: &TypeName) -> Option<Arc<TypeDeclaration>> {
        if let Some(cached) = self.declarations.borrow().get(name) {
            return cached.clone();
        }

        let resolved = match self.schema.type_declaration(name) {
            Ok(declaration) => declaration,
            Err(error) => {
                tracing::warn!(type_name = %name, %error, "type lookup failed");
                None
            }
        };
        self.declarations
            .borrow_mut()
            .insert(name.clone(), resolved.clone());
        resolved
    }

    /// Possible result types of `node`; never empty.
    pub fn resolve_types(&self, node: SyntaxNode<'_>, mode: ResolveMode) -> TypeSet {
        self.collect_types(Some(node), mode).or_any()
    }

    fn resolve_optional(&self, node: Option<SyntaxNode<'_>>, mode: ResolveMode) -> TypeSet {
        self.collect_types(node, mode).or_any()
    }

    fn collect_types(&self, node: Option<SyntaxNode<'_>>, mode: ResolveMode) -> TypeSet {
        let mut types = TypeSet::new();
        let Some(node) = node else {
            return types;
        };

        if let Some(tag) = node.type_tag() {
            types.insert(tag.clone());
            return types;
        }

        match node.kind() {
            SyntaxKind::Call | SyntaxKind::Application => {
                types.extend(self.resolve_optional(node.first_operand(), mode));
            }
            SyntaxKind::Variable | SyntaxKind::Function => {
                let declared = resolve_identifier(node.kind(), node.text(), self.schema)
                    .and_then(|definition| definition.result_type());
                if let Some(declared) = declared {
                    types.extend(declared.iter().cloned());
                }
            }
            SyntaxKind::PropertyAccess | SyntaxKind::MethodAccess => {
                let Some(member) = node.last_child() else {
                    return types;
                };
                let expected = if node.kind() == SyntaxKind::PropertyAccess {
                    SyntaxKind::Property
                } else {
                    SyntaxKind::Method
                };
                if member.kind() != expected {
                    return types;
                }

                for base in self.resolve_optional(node.first_operand(), mode) {
                    let Some(declaration) = self.declaration(&base) else {
                        continue;
                    };
                    let declared = resolve_identifier(member.kind(), member.text(), declaration.as_ref())
                        .and_then(|definition| definition.result_type());
                    if let Some(declared) = declared {
                        types.extend(declared.iter().cloned());
                    }
                }
            }
            SyntaxKind::ArrayAccess => {
                for base in self.resolve_optional(node.first_operand(), mode) {
                    if let Some(element) = base.element() {
                        types.insert(element);
                    }
                }
            }
            SyntaxKind::TernaryExpression => {
                let mut operands = node.operands().skip(1);
                types.extend(self.resolve_optional(operands.next(), mode));
                types.extend(self.resolve_optional(operands.next(), mode));
            }
            SyntaxKind::BinaryExpression => self.collect_binary(node, mode, &mut types),
            SyntaxKind::UnaryExpression => {
                if let Some(operator) = node.operator() {
                    match operator.text() {
                        "not" | "!" => {
                            types.insert(TypeName::Bool);
                        }
                        "+" | "-" => {
                            types.insert(TypeName::Number);
                        }
                        _ => {}
                    }
                }
            }
            SyntaxKind::Error if mode == ResolveMode::Lenient => {
                if let Some(last) = node.last_operand() {
                    types.extend(self.resolve_optional(Some(last), mode));
                }
            }
            _ => {}
        }

        types
    }

    fn collect_binary(&self, node: SyntaxNode<'_>, mode: ResolveMode, types: &mut TypeSet) {
        let Some(operator) = node.operator() else {
            return;
        };
        let left = node.first_operand();
        let right = node.operands().nth(1);

        if operator.kind() == SyntaxKind::OperatorKeyword {
            types.insert(TypeName::Bool);
            return;
        }

        match operator.text() {
            "?:" | "??" => {
                types.extend(self.resolve_optional(left, mode));
                types.extend(self.resolve_optional(right, mode));
            }
            "?" => types.extend(self.resolve_optional(right, mode)),
            "||" | "&&" | "==" | "!=" | "===" | "!==" | ">=" | "<=" | ">" | "<" => {
                types.insert(TypeName::Bool);
            }
            "**" | "|" | "^" | "&" | "<<" | ">>" | "+" | "-" | "*" | "/" | "%" => {
                types.insert(TypeName::Number);
            }
            "~" => {
                types.insert(TypeName::String);
            }
            ".." => {
                types.insert(TypeName::array_of(TypeName::Number));
            }
            _ => {}
        }
    }

    /// Definition of the function invoked through `callee`: a bare
    /// `Function` reference or a member access on some base expression.
    /// The first type of the base that declares the method wins.
    pub fn resolve_function(&self, callee: SyntaxNode<'_>) -> Option<Function> {
        match callee.kind() {
            SyntaxKind::Function => self.schema.function(callee.text()).cloned(),
            SyntaxKind::MethodAccess | SyntaxKind::PropertyAccess => {
                let member = callee.last_child()?;
                if !matches!(member.kind(), SyntaxKind::Method | SyntaxKind::Property) {
                    return None;
                }
                let base = callee.first_operand()?;
                self.resolve_types(base, ResolveMode::Exact)
                    .iter()
                    .find_map(|ty| {
                        self.declaration(ty)
                            .and_then(|declaration| declaration.function(member.text()).cloned())
                    })
            }
            _ => None,
        }
    }

    /// Types of the base expression when `member` is the tail of a member
    /// access (`base.member`).
    pub fn member_base_types(&self, member: SyntaxNode<'_>, mode: ResolveMode) -> Option<TypeSet> {
        let parent = member.parent()?;
        if !parent.kind().is_member_access() || member.prev_sibling().is_none() {
            return None;
        }
        let base = parent.first_operand()?;
        Some(self.resolve_types(base, mode))
    }
}
