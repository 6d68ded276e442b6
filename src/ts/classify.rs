//! Classification of top-level definitions into entity kinds.
//!
//! [`classify`] is a pure function over the definition's syntactic kind and
//! the names of its declared bases and decorators. All knowledge about which
//! Django / DRF / Celery names mean what lives in the tables below.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Domain kind of a top-level entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Model,
    View,
    Serializer,
    #[serde(rename = "URLPattern")]
    UrlPattern,
    Task,
    Command,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Model,
        EntityKind::View,
        EntityKind::Serializer,
        EntityKind::UrlPattern,
        EntityKind::Task,
        EntityKind::Command,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Model => "Model",
            EntityKind::View => "View",
            EntityKind::Serializer => "Serializer",
            EntityKind::UrlPattern => "URLPattern",
            EntityKind::Task => "Task",
            EntityKind::Command => "Command",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    /// Accepts the canonical names case-insensitively, plus the plural
    /// forms used for listing endpoints (`models`, `endpoints`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "model" | "models" => Ok(EntityKind::Model),
            "view" | "views" | "viewset" | "viewsets" => Ok(EntityKind::View),
            "serializer" | "serializers" => Ok(EntityKind::Serializer),
            "urlpattern" | "urlpatterns" | "url" | "urls" | "endpoint" | "endpoints" => {
                Ok(EntityKind::UrlPattern)
            }
            "task" | "tasks" => Ok(EntityKind::Task),
            "command" | "commands" => Ok(EntityKind::Command),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

/// Syntactic shape of a top-level definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Class,
    Function,
    /// An entry of a module-level `urlpatterns` table.
    RouteTable,
    /// A module-level `router.register(...)` call.
    RouteRegistration,
}

/// Class base names per kind, in precedence order.
const CLASS_RULES: &[(EntityKind, &[&str])] = &[
    (EntityKind::Command, &["BaseCommand", "LabelCommand", "AppCommand"]),
    (
        EntityKind::Serializer,
        &[
            "Serializer",
            "ModelSerializer",
            "HyperlinkedModelSerializer",
            "ListSerializer",
        ],
    ),
    (
        EntityKind::View,
        &[
            "ViewSet",
            "ModelViewSet",
            "ReadOnlyModelViewSet",
            "GenericViewSet",
            "APIView",
            "GenericAPIView",
            "CreateAPIView",
            "ListAPIView",
            "RetrieveAPIView",
            "DestroyAPIView",
            "UpdateAPIView",
            "ListCreateAPIView",
            "RetrieveUpdateAPIView",
            "RetrieveDestroyAPIView",
            "RetrieveUpdateDestroyAPIView",
            "View",
            "TemplateView",
            "RedirectView",
            "ListView",
            "DetailView",
            "CreateView",
            "UpdateView",
            "DeleteView",
            "FormView",
        ],
    ),
    (EntityKind::Model, &["Model"]),
    (EntityKind::Task, &["Task"]),
];

/// Function decorator names per kind, in precedence order.
const FUNCTION_RULES: &[(EntityKind, &[&str])] = &[
    (
        EntityKind::View,
        &[
            "api_view",
            "require_http_methods",
            "require_GET",
            "require_POST",
            "require_safe",
        ],
    ),
    (EntityKind::Task, &["task", "shared_task", "periodic_task"]),
];

/// Map a definition to its entity kind, or `None` if it is not an entity.
///
/// Base and decorator names may be dotted (`models.Model`, `app.task`);
/// only the last segment is looked up, and subscripts (`Generic[T]`) are
/// ignored.
pub fn classify(
    kind: DefinitionKind,
    bases: &BTreeSet<String>,
    decorators: &BTreeSet<String>,
) -> Option<EntityKind> {
    match kind {
        DefinitionKind::Class => first_match(CLASS_RULES, bases),
        DefinitionKind::Function => first_match(FUNCTION_RULES, decorators),
        DefinitionKind::RouteTable | DefinitionKind::RouteRegistration => {
            Some(EntityKind::UrlPattern)
        }
    }
}

fn first_match(rules: &[(EntityKind, &[&str])], names: &BTreeSet<String>) -> Option<EntityKind> {
    let segments: BTreeSet<&str> = names.iter().map(|n| last_segment(n)).collect();
    rules
        .iter()
        .find(|(_, table)| table.iter().any(|name| segments.contains(name)))
        .map(|(kind, _)| *kind)
}

fn last_segment(name: &str) -> &str {
    let name = name.split('[').next().unwrap_or(name).trim();
    name.rsplit('.').next().unwrap_or(name)
}
