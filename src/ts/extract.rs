//! Top-level entity extraction from Python sources.
//!
//! Only direct children of the module are inspected; nested classes and
//! functions never become entities of their own. Spans are the definition
//! nodes' own ranges as reported by tree-sitter, converted through
//! [`LineIndex`] so they use the same coordinates the patcher resolves.

use crate::position::{LineIndex, SourceSpan};
use crate::ts::classify::{classify, DefinitionKind, EntityKind};
use crate::ts::errors::TreeSitterError;
use crate::ts::parser::PythonParser;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tree_sitter::Node;

/// Name of the module-level route table Django's URL resolver reads.
const ROUTE_TABLE: &str = "urlpatterns";

/// Class variables with this suffix are `choices=` tables.
const CHOICES_SUFFIX: &str = "_CHOICES";

/// Decorators that turn a method into a property.
const PROPERTY_DECORATORS: &[&str] = &["property", "cached_property"];

/// A classified top-level definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    pub file_path: PathBuf,
    pub kind: EntityKind,
    #[serde(flatten)]
    pub span: SourceSpan,
    pub fields: Vec<String>,
    pub methods: Vec<String>,
    /// Declarations behind `fields`, in the same order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_details: Vec<FieldInfo>,
    /// Options of the nested `class Meta`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, MetaValue>,
    /// Methods decorated with `@property` or `@cached_property`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorators: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteInfo>,
}

/// One field declaration: `name = models.CharField("Name", max_length=20)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    /// Callee as written (`models.CharField`).
    pub field_type: String,
    /// Positional arguments; string literals are unquoted.
    pub args: Vec<String>,
    /// Keyword arguments other than a resolved `choices=`.
    pub kwargs: BTreeMap<String, String>,
    /// `choices=` resolved through a class-level `*_CHOICES` table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Choice>>,
}

/// A `(value, label)` entry of a choices table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub value: String,
    pub label: String,
}

/// A `class Meta` option value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Scalar(String),
    List(Vec<String>),
}

/// Class-level constants and choices tables, in declaration order.
#[derive(Debug, Default)]
struct ClassScope {
    constants: BTreeMap<String, String>,
    choices: BTreeMap<String, Vec<Choice>>,
}

/// Route details of a `URLPattern` entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    /// Route string (`"items/<int:pk>/"`) or router prefix.
    pub pattern: Option<String>,
    /// View expression as written (`views.item_detail`, `ItemViewSet`).
    pub view: Option<String>,
    /// `name=` of a route or `basename=` of a router registration.
    pub name: Option<String>,
}

/// A file that could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{}:{}: {}", .file_path.display(), .line, .message)]
pub struct ParseError {
    pub file_path: PathBuf,
    pub line: usize,
    pub message: String,
}

/// Entities of one file, or the reason there are none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub entities: Vec<EntityDescriptor>,
    pub diagnostics: Vec<ParseError>,
}

/// Extract entities from `source` using the given parser.
///
/// A syntax error anywhere in the file yields a single [`ParseError`] and
/// no entities. Only parser failures (language setup, timeout) are errors.
pub fn extract(
    parser: &mut PythonParser,
    file_path: &Path,
    source: &str,
) -> Result<Extraction, TreeSitterError> {
    let parsed = parser.parse_with_source(source)?;
    let index = LineIndex::new(source);

    if let Some(error) = parsed.first_error() {
        let line = index.position(error.byte_start).line;
        tracing::debug!(file = %file_path.display(), line, "syntax error");
        return Ok(Extraction {
            entities: Vec::new(),
            diagnostics: vec![ParseError {
                file_path: file_path.to_path_buf(),
                line,
                message: error.message,
            }],
        });
    }

    let walker = Walker {
        source,
        index: &index,
        file_path,
    };
    let mut entities = Vec::new();
    let root = parsed.root_node();
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        walker.visit_top_level(child, &mut entities);
    }

    Ok(Extraction {
        entities,
        diagnostics: Vec::new(),
    })
}

struct Walker<'s, 'i> {
    source: &'s str,
    index: &'i LineIndex<'s>,
    file_path: &'s Path,
}

impl<'s, 'i> Walker<'s, 'i> {
    fn text(&self, node: Node<'_>) -> &'s str {
        &self.source[node.byte_range()]
    }

    fn visit_top_level(&self, node: Node<'_>, out: &mut Vec<EntityDescriptor>) {
        match node.kind() {
            "class_definition" => self.visit_class(node, Vec::new(), out),
            "function_definition" => self.visit_function(node, Vec::new(), out),
            "decorated_definition" => {
                let decorators = self.decorators(node);
                let Some(definition) = node.child_by_field_name("definition") else {
                    return;
                };
                match definition.kind() {
                    "class_definition" => self.visit_class(definition, decorators, out),
                    "function_definition" => self.visit_function(definition, decorators, out),
                    _ => {}
                }
            }
            "expression_statement" => self.visit_statement(node, out),
            _ => {}
        }
    }

    fn visit_class(&self, node: Node<'_>, decorators: Vec<String>, out: &mut Vec<EntityDescriptor>) {
        let Some(name) = node.child_by_field_name("name") else {
            return;
        };
        let bases = self.bases(node);
        let kind = classify(
            DefinitionKind::Class,
            &bases.iter().cloned().collect(),
            &decorators.iter().cloned().collect(),
        );
        let Some(kind) = kind else {
            return;
        };

        let body = node.child_by_field_name("body");
        let (field_details, meta) = match (kind, body) {
            (EntityKind::Model | EntityKind::Serializer, Some(body)) => {
                (self.field_details(body), self.meta(body))
            }
            _ => (Vec::new(), BTreeMap::new()),
        };
        let fields = field_details.iter().map(|f| f.name.clone()).collect();
        let methods = body.map(|b| self.methods(b)).unwrap_or_default();
        let properties = body.map(|b| self.properties(b)).unwrap_or_default();

        out.push(EntityDescriptor {
            name: self.text(name).to_string(),
            file_path: self.file_path.to_path_buf(),
            kind,
            span: self.index.span(node.byte_range()),
            fields,
            methods,
            field_details,
            meta,
            properties,
            docstring: body.and_then(|b| self.docstring(b)),
            bases,
            decorators,
            route: None,
        });
    }

    fn visit_function(
        &self,
        node: Node<'_>,
        decorators: Vec<String>,
        out: &mut Vec<EntityDescriptor>,
    ) {
        let Some(name) = node.child_by_field_name("name") else {
            return;
        };
        let decorator_set: BTreeSet<String> = decorators.iter().cloned().collect();
        let Some(kind) = classify(DefinitionKind::Function, &BTreeSet::new(), &decorator_set)
        else {
            return;
        };

        out.push(EntityDescriptor {
            name: self.text(name).to_string(),
            file_path: self.file_path.to_path_buf(),
            kind,
            span: self.index.span(node.byte_range()),
            fields: Vec::new(),
            methods: Vec::new(),
            field_details: Vec::new(),
            meta: BTreeMap::new(),
            properties: Vec::new(),
            docstring: node
                .child_by_field_name("body")
                .and_then(|b| self.docstring(b)),
            bases: Vec::new(),
            decorators,
            route: None,
        });
    }

    /// Module-level statements: route tables and router registrations.
    fn visit_statement(&self, node: Node<'_>, out: &mut Vec<EntityDescriptor>) {
        let Some(expr) = node.named_child(0) else {
            return;
        };
        match expr.kind() {
            "assignment" | "augmented_assignment" => {
                let is_route_table = expr
                    .child_by_field_name("left")
                    .is_some_and(|left| left.kind() == "identifier" && self.text(left) == ROUTE_TABLE);
                if !is_route_table {
                    return;
                }
                if let Some(right) = expr.child_by_field_name("right") {
                    self.visit_route_table(expr, right, out);
                }
            }
            "call" => self.visit_registration(expr, out),
            _ => {}
        }
    }

    fn visit_route_table(&self, assignment: Node<'_>, right: Node<'_>, out: &mut Vec<EntityDescriptor>) {
        let empty = BTreeSet::new();
        let Some(kind) = classify(DefinitionKind::RouteTable, &empty, &empty) else {
            return;
        };

        if right.kind() != "list" {
            out.push(self.route_entity(
                ROUTE_TABLE.to_string(),
                kind,
                assignment,
                RouteInfo {
                    view: Some(self.text(right).to_string()),
                    ..RouteInfo::default()
                },
            ));
            return;
        }

        let mut cursor = right.walk();
        for element in right.named_children(&mut cursor) {
            if element.kind() == "comment" {
                continue;
            }
            let route = if element.kind() == "call" {
                self.route_call(element)
            } else {
                RouteInfo {
                    view: Some(self.text(element).to_string()),
                    ..RouteInfo::default()
                }
            };
            let name = route
                .name
                .clone()
                .or_else(|| route.pattern.clone())
                .unwrap_or_else(|| self.text(element).to_string());
            out.push(self.route_entity(name, kind, element, route));
        }
    }

    /// `router.register(prefix, viewset, basename=...)`.
    fn visit_registration(&self, call: Node<'_>, out: &mut Vec<EntityDescriptor>) {
        let is_register = call
            .child_by_field_name("function")
            .filter(|f| f.kind() == "attribute")
            .and_then(|f| f.child_by_field_name("attribute"))
            .is_some_and(|attr| self.text(attr) == "register");
        if !is_register {
            return;
        }

        let empty = BTreeSet::new();
        let Some(kind) = classify(DefinitionKind::RouteRegistration, &empty, &empty) else {
            return;
        };

        let (positional, keywords) = self.arguments(call);
        let route = RouteInfo {
            pattern: positional.first().map(|n| self.literal(*n)),
            view: positional.get(1).map(|n| self.text(*n).to_string()),
            name: keywords
                .iter()
                .find(|(k, _)| *k == "basename")
                .map(|(_, v)| self.literal(*v))
                .or_else(|| positional.get(2).map(|n| self.literal(*n))),
        };
        let name = route
            .name
            .clone()
            .or_else(|| route.pattern.clone())
            .unwrap_or_else(|| self.text(call).to_string());
        out.push(self.route_entity(name, kind, call, route));
    }

    fn route_call(&self, call: Node<'_>) -> RouteInfo {
        let (positional, keywords) = self.arguments(call);
        RouteInfo {
            pattern: positional.first().map(|n| self.literal(*n)),
            view: positional.get(1).map(|n| self.text(*n).to_string()),
            name: keywords
                .iter()
                .find(|(k, _)| *k == "name")
                .map(|(_, v)| self.literal(*v)),
        }
    }

    fn route_entity(&self, name: String, kind: EntityKind, node: Node<'_>, route: RouteInfo) -> EntityDescriptor {
        EntityDescriptor {
            name,
            file_path: self.file_path.to_path_buf(),
            kind,
            span: self.index.span(node.byte_range()),
            fields: Vec::new(),
            methods: Vec::new(),
            field_details: Vec::new(),
            meta: BTreeMap::new(),
            properties: Vec::new(),
            docstring: None,
            bases: Vec::new(),
            decorators: Vec::new(),
            route: Some(route),
        }
    }

    /// Positional argument nodes and `(keyword, value)` pairs of a call.
    #[allow(clippy::type_complexity)]
    fn arguments<'t>(&self, call: Node<'t>) -> (Vec<Node<'t>>, Vec<(&'s str, Node<'t>)>) {
        let mut positional = Vec::new();
        let mut keywords = Vec::new();
        let Some(args) = call.child_by_field_name("arguments") else {
            return (positional, keywords);
        };

        let mut cursor = args.walk();
        for arg in args.named_children(&mut cursor) {
            match arg.kind() {
                "comment" => {}
                "keyword_argument" => {
                    if let (Some(k), Some(v)) = (
                        arg.child_by_field_name("name"),
                        arg.child_by_field_name("value"),
                    ) {
                        keywords.push((self.text(k), v));
                    }
                }
                _ => positional.push(arg),
            }
        }
        (positional, keywords)
    }

    /// Declared bases as written, keyword arguments (`metaclass=`) excluded.
    fn bases(&self, class: Node<'_>) -> Vec<String> {
        let Some(superclasses) = class.child_by_field_name("superclasses") else {
            return Vec::new();
        };
        let mut cursor = superclasses.walk();
        let bases = superclasses
            .named_children(&mut cursor)
            .filter(|n| !matches!(n.kind(), "keyword_argument" | "comment"))
            .map(|n| self.text(n).to_string())
            .collect();
        bases
    }

    /// Decorator names with call arguments stripped (`app.task(bind=True)` -> `app.task`).
    fn decorators(&self, decorated: Node<'_>) -> Vec<String> {
        let mut cursor = decorated.walk();
        let decorators = decorated
            .named_children(&mut cursor)
            .filter(|n| n.kind() == "decorator")
            .filter_map(|d| d.named_child(0))
            .map(|expr| {
                let target = if expr.kind() == "call" {
                    expr.child_by_field_name("function").unwrap_or(expr)
                } else {
                    expr
                };
                self.text(target).split_whitespace().collect::<String>()
            })
            .collect();
        decorators
    }

    /// `name = value` statements with a plain identifier target.
    fn assignment<'t>(&self, stmt: Node<'t>) -> Option<(&'s str, Node<'t>)> {
        if stmt.kind() != "expression_statement" {
            return None;
        }
        let assign = stmt.named_child(0).filter(|e| e.kind() == "assignment")?;
        let left = assign
            .child_by_field_name("left")
            .filter(|l| l.kind() == "identifier")?;
        let right = assign.child_by_field_name("right")?;
        Some((self.text(left), right))
    }

    /// Class-body assignments whose value is a call, as field declarations.
    fn field_details(&self, body: Node<'_>) -> Vec<FieldInfo> {
        let scope = self.class_scope(body);
        let mut cursor = body.walk();
        let fields = body
            .named_children(&mut cursor)
            .filter_map(|stmt| self.assignment(stmt))
            .filter(|(_, value)| value.kind() == "call")
            .map(|(name, call)| self.field_info(name, call, &scope))
            .collect();
        fields
    }

    fn field_info(&self, name: &str, call: Node<'_>, scope: &ClassScope) -> FieldInfo {
        let field_type: String = call
            .child_by_field_name("function")
            .map(|f| self.text(f).split_whitespace().collect())
            .unwrap_or_default();
        let (positional, keywords) = self.arguments(call);

        let mut choices = None;
        let mut kwargs = BTreeMap::new();
        for (key, value) in keywords {
            if key == "choices" {
                if let Some(table) = scope.choices.get(self.text(value)) {
                    choices = Some(table.clone());
                    continue;
                }
            }
            kwargs.insert(key.to_string(), self.literal(value));
        }

        FieldInfo {
            name: name.to_string(),
            field_type,
            args: positional.iter().map(|n| self.literal(*n)).collect(),
            kwargs,
            choices,
        }
    }

    /// String constants and `*_CHOICES` tables of a class body. Choice
    /// values naming an earlier string constant resolve to its value.
    fn class_scope(&self, body: Node<'_>) -> ClassScope {
        let mut scope = ClassScope::default();
        let mut cursor = body.walk();
        let assignments: Vec<(&str, Node<'_>)> = body
            .named_children(&mut cursor)
            .filter_map(|stmt| self.assignment(stmt))
            .collect();

        for (name, value) in assignments {
            match value.kind() {
                "string" => {
                    scope.constants.insert(name.to_string(), self.literal(value));
                }
                "list" | "tuple" if name.ends_with(CHOICES_SUFFIX) => {
                    let table = self.choices(value, &scope.constants);
                    scope.choices.insert(name.to_string(), table);
                }
                _ => {}
            }
        }
        scope
    }

    /// Two-element tuples of a choices table; other entries are skipped.
    fn choices(&self, table: Node<'_>, constants: &BTreeMap<String, String>) -> Vec<Choice> {
        let mut cursor = table.walk();
        let entries: Vec<Node<'_>> = table
            .named_children(&mut cursor)
            .filter(|n| n.kind() == "tuple")
            .collect();

        entries
            .into_iter()
            .filter_map(|entry| {
                let mut cursor = entry.walk();
                let items: Vec<Node<'_>> = entry
                    .named_children(&mut cursor)
                    .filter(|n| n.kind() != "comment")
                    .collect();
                let [value, label] = items.as_slice() else {
                    return None;
                };
                let value = match value.kind() {
                    "identifier" => constants
                        .get(self.text(*value))
                        .cloned()
                        .unwrap_or_else(|| self.text(*value).to_string()),
                    _ => self.literal(*value),
                };
                Some(Choice {
                    value,
                    label: self.literal(*label),
                })
            })
            .collect()
    }

    /// Literal options of a nested `class Meta`.
    fn meta(&self, body: Node<'_>) -> BTreeMap<String, MetaValue> {
        let mut cursor = body.walk();
        let meta_body = body
            .named_children(&mut cursor)
            .filter(|n| n.kind() == "class_definition")
            .find(|n| {
                n.child_by_field_name("name")
                    .is_some_and(|name| self.text(name) == "Meta")
            })
            .and_then(|meta| meta.child_by_field_name("body"));
        let Some(meta_body) = meta_body else {
            return BTreeMap::new();
        };

        let mut cursor = meta_body.walk();
        let options = meta_body
            .named_children(&mut cursor)
            .filter_map(|stmt| self.assignment(stmt))
            .filter_map(|(name, value)| Some((name.to_string(), self.meta_value(value)?)))
            .collect();
        options
    }

    fn meta_value(&self, node: Node<'_>) -> Option<MetaValue> {
        match node.kind() {
            "list" | "tuple" => {
                let mut cursor = node.walk();
                let items = node
                    .named_children(&mut cursor)
                    .filter_map(|item| self.scalar(item))
                    .collect();
                Some(MetaValue::List(items))
            }
            _ => self.scalar(node).map(MetaValue::Scalar),
        }
    }

    /// Literals and plain names; calls and other expressions are skipped.
    fn scalar(&self, node: Node<'_>) -> Option<String> {
        match node.kind() {
            "string" | "integer" | "float" | "true" | "false" | "none" | "identifier"
            | "attribute" => Some(self.literal(node)),
            _ => None,
        }
    }

    /// Names of class-body methods decorated as properties.
    fn properties(&self, body: Node<'_>) -> Vec<String> {
        let mut cursor = body.walk();
        let properties = body
            .named_children(&mut cursor)
            .filter(|stmt| stmt.kind() == "decorated_definition")
            .filter(|stmt| {
                self.decorators(*stmt).iter().any(|d| {
                    let last = d.rsplit('.').next().unwrap_or(d);
                    PROPERTY_DECORATORS.contains(&last)
                })
            })
            .filter_map(|stmt| stmt.child_by_field_name("definition"))
            .filter(|def| def.kind() == "function_definition")
            .filter_map(|def| def.child_by_field_name("name"))
            .map(|name| self.text(name).to_string())
            .collect();
        properties
    }

    /// Names of functions defined directly in a class body.
    fn methods(&self, body: Node<'_>) -> Vec<String> {
        let mut cursor = body.walk();
        let methods = body
            .named_children(&mut cursor)
            .filter_map(|stmt| match stmt.kind() {
                "function_definition" => Some(stmt),
                "decorated_definition" => stmt
                    .child_by_field_name("definition")
                    .filter(|d| d.kind() == "function_definition"),
                _ => None,
            })
            .filter_map(|def| def.child_by_field_name("name"))
            .map(|name| self.text(name).to_string())
            .collect();
        methods
    }

    fn docstring(&self, body: Node<'_>) -> Option<String> {
        let mut cursor = body.walk();
        let first = body
            .named_children(&mut cursor)
            .find(|n| n.kind() != "comment")?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let expr = first.named_child(0)?;
        if expr.kind() != "string" {
            return None;
        }
        Some(unquote(self.text(expr)).trim().to_string())
    }

    /// String literal contents, or the raw text for anything else.
    fn literal(&self, node: Node<'_>) -> String {
        let text = self.text(node);
        if node.kind() == "string" {
            unquote(text).to_string()
        } else {
            text.to_string()
        }
    }
}

/// Strip a Python string prefix and quotes: `r"^items/$"` -> `^items/$`.
fn unquote(literal: &str) -> &str {
    let body = literal.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if body.len() >= 2 * quote.len() && body.starts_with(quote) && body.ends_with(quote) {
            return &body[quote.len()..body.len() - quote.len()];
        }
    }
    literal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> Extraction {
        let mut parser = PythonParser::new().unwrap();
        extract(&mut parser, Path::new("app/models.py"), source).unwrap()
    }

    #[test]
    fn model_span_and_fields() {
        let source = "class Foo(models.Model):\n    name = models.CharField()\n";
        let extraction = run(source);

        assert!(extraction.diagnostics.is_empty());
        assert_eq!(extraction.entities.len(), 1);
        let foo = &extraction.entities[0];
        assert_eq!(foo.name, "Foo");
        assert_eq!(foo.kind, EntityKind::Model);
        assert_eq!(foo.span, SourceSpan::new(1, 0, 2, 29));
        assert_eq!(foo.fields, vec!["name"]);
        assert!(foo.methods.is_empty());
        assert_eq!(foo.bases, vec!["models.Model"]);
    }

    #[test]
    fn model_details() {
        let source = r#"
from django.db import models


class Order(models.Model):
    """An order placed by a customer."""

    STATUS_PENDING = "pending"
    STATUS_CHOICES = [(STATUS_PENDING, "Pending")]

    status = models.CharField(max_length=20, choices=STATUS_CHOICES)
    customer = models.ForeignKey("Customer", on_delete=models.CASCADE)

    class Meta:
        ordering = ["-id"]

    def __str__(self):
        return self.status

    @property
    def is_pending(self):
        def inner():
            return True
        return inner()
"#;
        let extraction = run(source);
        assert_eq!(extraction.entities.len(), 1);
        let order = &extraction.entities[0];
        assert_eq!(order.fields, vec!["status", "customer"]);
        assert_eq!(order.methods, vec!["__str__", "is_pending"]);
        assert_eq!(order.properties, vec!["is_pending"]);
        assert_eq!(order.docstring.as_deref(), Some("An order placed by a customer."));
        assert_eq!(order.span.start_line, 5);

        let status = &order.field_details[0];
        assert_eq!(status.name, "status");
        assert_eq!(status.field_type, "models.CharField");
        assert!(status.args.is_empty());
        assert_eq!(
            status.kwargs,
            BTreeMap::from([("max_length".to_string(), "20".to_string())])
        );
        assert_eq!(
            status.choices,
            Some(vec![Choice {
                value: "pending".to_string(),
                label: "Pending".to_string(),
            }])
        );

        let customer = &order.field_details[1];
        assert_eq!(customer.field_type, "models.ForeignKey");
        assert_eq!(customer.args, vec!["Customer"]);
        assert_eq!(customer.kwargs["on_delete"], "models.CASCADE");
        assert_eq!(customer.choices, None);

        assert_eq!(
            order.meta,
            BTreeMap::from([(
                "ordering".to_string(),
                MetaValue::List(vec!["-id".to_string()])
            )])
        );
    }

    #[test]
    fn choices_tables() {
        let source = r#"
class Shirt(models.Model):
    LARGE = "l"
    SIZE_CHOICES = (
        ("s", "Small"),
        (LARGE, "Large"),
        (MEDIUM, "Medium"),
        "ignored",
    )
    size = models.CharField("Size", max_length=1, choices=SIZE_CHOICES)
    kind = models.CharField(choices=Kind.choices, default=Kind.PLAIN)
"#;
        let shirt = &run(source).entities[0];
        assert_eq!(shirt.fields, vec!["size", "kind"]);

        let size = &shirt.field_details[0];
        assert_eq!(size.args, vec!["Size"]);
        assert!(!size.kwargs.contains_key("choices"));
        let values: Vec<(&str, &str)> = size
            .choices
            .as_ref()
            .unwrap()
            .iter()
            .map(|c| (c.value.as_str(), c.label.as_str()))
            .collect();
        assert_eq!(
            values,
            vec![("s", "Small"), ("l", "Large"), ("MEDIUM", "Medium")]
        );

        // Not a class-level table: kept as written.
        let kind = &shirt.field_details[1];
        assert_eq!(kind.choices, None);
        assert_eq!(kind.kwargs["choices"], "Kind.choices");
        assert_eq!(kind.kwargs["default"], "Kind.PLAIN");
    }

    #[test]
    fn meta_options_and_properties() {
        let source = r#"
class Entry(models.Model):
    body = models.TextField()

    class Meta:
        abstract = True
        db_table = 'blog_entry'
        unique_together = ("body", 3)
        constraints = [models.UniqueConstraint(fields=["body"], name="u")]

    @cached_property
    def preview(self):
        return self.body[:20]

    @functools.cached_property
    def words(self):
        return self.body.split()

    @staticmethod
    def helper():
        pass
"#;
        let entry = &run(source).entities[0];
        assert_eq!(entry.meta["abstract"], MetaValue::Scalar("True".to_string()));
        assert_eq!(entry.meta["db_table"], MetaValue::Scalar("blog_entry".to_string()));
        assert_eq!(
            entry.meta["unique_together"],
            MetaValue::List(vec!["body".to_string(), "3".to_string()])
        );
        assert_eq!(entry.meta["constraints"], MetaValue::List(Vec::new()));
        assert_eq!(entry.properties, vec!["preview", "words"]);
        assert_eq!(entry.methods, vec!["preview", "words", "helper"]);
        // Meta is not a field.
        assert_eq!(entry.fields, vec!["body"]);

        let json = serde_json::to_value(entry).unwrap();
        assert_eq!(json["meta"]["abstract"], "True");
        assert_eq!(json["meta"]["unique_together"][1], "3");
        assert_eq!(json["field_details"][0]["field_type"], "models.TextField");
    }

    #[test]
    fn only_top_level_definitions() {
        let source = r#"
def helper():
    class Inner(models.Model):
        pass
    return Inner


class Plain:
    class Nested(models.Model):
        pass
"#;
        assert!(run(source).entities.is_empty());
    }

    #[test]
    fn views_serializers_commands_tasks() {
        let source = r#"
from celery import shared_task


class ItemSerializer(serializers.ModelSerializer):
    title = serializers.CharField()

    class Meta:
        model = Item
        fields = ["id", "title"]

    def validate_title(self, value):
        return value


class ItemViewSet(viewsets.ModelViewSet):
    queryset = Item.objects.all()

    @action(detail=True, methods=["post"])
    def publish(self, request, pk=None):
        pass


@api_view(["GET"])
def health(request):
    pass


class Command(BaseCommand):
    help = "Sync"

    def add_arguments(self, parser):
        pass

    def handle(self, *args, **options):
        pass


@shared_task(bind=True)
def sync_items(self):
    """Pull items from upstream."""


async def not_an_entity():
    pass
"#;
        let entities = run(source).entities;
        let summary: Vec<(&str, EntityKind)> =
            entities.iter().map(|e| (e.name.as_str(), e.kind)).collect();
        assert_eq!(
            summary,
            vec![
                ("ItemSerializer", EntityKind::Serializer),
                ("ItemViewSet", EntityKind::View),
                ("health", EntityKind::View),
                ("Command", EntityKind::Command),
                ("sync_items", EntityKind::Task),
            ]
        );

        assert_eq!(entities[0].fields, vec!["title"]);
        assert_eq!(entities[0].methods, vec!["validate_title"]);
        assert_eq!(
            entities[0].meta["fields"],
            MetaValue::List(vec!["id".to_string(), "title".to_string()])
        );
        assert_eq!(entities[0].meta["model"], MetaValue::Scalar("Item".to_string()));
        // Views never report fields, even for call assignments.
        assert!(entities[1].fields.is_empty());
        assert!(entities[1].field_details.is_empty());
        assert!(entities[1].meta.is_empty());
        assert_eq!(entities[1].methods, vec!["publish"]);
        assert_eq!(entities[2].decorators, vec!["api_view"]);
        assert_eq!(entities[3].methods, vec!["add_arguments", "handle"]);
        assert_eq!(entities[4].decorators, vec!["shared_task"]);
        assert_eq!(entities[4].docstring.as_deref(), Some("Pull items from upstream."));
    }

    #[test]
    fn decorated_span_starts_at_definition() {
        let source = "@shared_task\ndef ping():\n    return 1\n";
        let entities = run(source).entities;
        assert_eq!(entities[0].span, SourceSpan::new(2, 0, 3, 12));
    }

    #[test]
    fn url_patterns() {
        let source = r#"from django.urls import path

from . import views

router = DefaultRouter()
router.register(r"items", views.ItemViewSet, basename="item")

urlpatterns = [
    path("", views.index, name="index"),
    # detail
    path("items/<int:pk>/", views.item_detail),
    *router.urls,
]
"#;
        let entities = run(source).entities;
        let names: Vec<&str> = entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["item", "index", "items/<int:pk>/", "*router.urls"]);
        assert!(entities.iter().all(|e| e.kind == EntityKind::UrlPattern));

        let registration = entities[0].route.as_ref().unwrap();
        assert_eq!(registration.pattern.as_deref(), Some("items"));
        assert_eq!(registration.view.as_deref(), Some("views.ItemViewSet"));

        let index = entities[1].route.as_ref().unwrap();
        assert_eq!(index.pattern.as_deref(), Some(""));
        assert_eq!(index.view.as_deref(), Some("views.index"));
        assert_eq!(index.name.as_deref(), Some("index"));
        assert_eq!(entities[1].span, SourceSpan::new(9, 4, 9, 39));
    }

    #[test]
    fn non_list_route_table() {
        let source = "urlpatterns = router.urls\nurlpatterns += [path('x/', v)]\n";
        let entities = run(source).entities;
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].name, "urlpatterns");
        assert_eq!(entities[0].route.as_ref().unwrap().view.as_deref(), Some("router.urls"));
        assert_eq!(entities[1].name, "x/");
    }

    #[test]
    fn syntax_error_yields_single_diagnostic() {
        let source = "class Ok(models.Model):\n    pass\n\nclass Broken(models.Model:\n    pass\n";
        let extraction = run(source);
        assert!(extraction.entities.is_empty());
        assert_eq!(extraction.diagnostics.len(), 1);
        let diagnostic = &extraction.diagnostics[0];
        assert_eq!(diagnostic.file_path, PathBuf::from("app/models.py"));
        assert!(diagnostic.line >= 4);
    }

    #[test]
    fn spans_use_code_point_columns() {
        let source = "# café ☕\nclass Café(models.Model):\n    nom = models.CharField(default='é')\n";
        let entities = run(source).entities;
        assert_eq!(entities[0].name, "Café");
        assert_eq!(entities[0].span, SourceSpan::new(2, 0, 3, 39));
    }

    #[test]
    fn unquote_literals() {
        assert_eq!(unquote("\"abc\""), "abc");
        assert_eq!(unquote("r'^a/$'"), "^a/$");
        assert_eq!(unquote("\"\"\"doc\"\"\""), "doc");
        assert_eq!(unquote("name"), "name");
    }
}
