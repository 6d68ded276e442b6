//! End-to-end workflow test
//!
//! Tests the complete workflow:
//! 1. Discover apps
//! 2. List entities across every conventional module
//! 3. Modify an entity through the span a listing reported
//! 4. Re-list and check the new state

use django_patcher::{
    content_hash, Engine, EngineConfig, EntityKind, ErrorKind, ModificationRequest, SourceSpan,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const MODELS: &str = r#"from django.db import models


class Post(models.Model):
    """A blog post."""

    MAX_TAGS = 5
    title = models.CharField(max_length=200)

    def __str__(self):
        return self.title
"#;

const VIEWS: &str = r#"from rest_framework import viewsets
from rest_framework.decorators import api_view
from rest_framework.response import Response


class PostViewSet(viewsets.ModelViewSet):
    queryset = Post.objects.all()

    def perform_create(self, serializer):
        serializer.save()


@api_view(["GET"])
def index(request):
    return Response({})


def about(request):
    return None
"#;

const SERIALIZERS: &str = r#"from rest_framework import serializers


class PostSerializer(serializers.ModelSerializer):
    title = serializers.CharField()

    class Meta:
        model = Post
        fields = ["title"]
"#;

const URLS: &str = r#"from django.urls import path
from rest_framework.routers import DefaultRouter

from . import views

router = DefaultRouter()
router.register(r"posts", views.PostViewSet, basename="post")

urlpatterns = [
    path("", views.index, name="index"),
    path("about/", views.about),
]
urlpatterns += router.urls
"#;

const TASK: &str = r#"from celery import shared_task


@shared_task
def publish_post(post_id):
    pass
"#;

const COMMAND: &str = r#"from django.core.management.base import BaseCommand


class Command(BaseCommand):
    help = "Rebuild the search index"

    def handle(self, *args, **options):
        pass
"#;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Create a minimal Django project with one fully populated app.
fn setup_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write(root, "apps/blog/apps.py", "from django.apps import AppConfig\n");
    write(root, "apps/blog/models.py", MODELS);
    write(root, "apps/blog/views.py", VIEWS);
    write(root, "apps/blog/serializers.py", SERIALIZERS);
    write(root, "apps/blog/urls.py", URLS);
    write(root, "apps/blog/tasks/__init__.py", "");
    write(root, "apps/blog/tasks/publish.py", TASK);
    write(root, "apps/blog/management/commands/reindex.py", COMMAND);
    write(root, "apps/shop/models.py", "class Product(models.Model):\n    pass\n");
    write(root, "apps/static/readme.txt", "not an app\n");

    dir
}

fn engine(dir: &TempDir) -> Engine {
    let mut config = EngineConfig::for_workspace(dir.path());
    config.apps_dirs = vec!["apps".into()];
    Engine::new(config).unwrap()
}

#[test]
fn test_discovers_apps() {
    let dir = setup_project();
    let apps = engine(&dir).list_apps().unwrap();
    let names: Vec<&str> = apps.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["blog", "shop"]);
}

#[test]
fn test_lists_every_entity_kind() {
    let dir = setup_project();
    let listing = engine(&dir).list_entities("blog", None).unwrap();
    assert!(listing.diagnostics.is_empty(), "{:?}", listing.diagnostics);

    let count = |kind| listing.entities.iter().filter(|e| e.kind == kind).count();
    assert_eq!(count(EntityKind::Model), 1);
    assert_eq!(count(EntityKind::View), 2);
    assert_eq!(count(EntityKind::Serializer), 1);
    assert_eq!(count(EntityKind::UrlPattern), 4);
    assert_eq!(count(EntityKind::Task), 1);
    assert_eq!(count(EntityKind::Command), 1);

    let post = listing.entities.iter().find(|e| e.name == "Post").unwrap();
    assert_eq!(post.fields, vec!["title"]);
    assert_eq!(post.methods, vec!["__str__"]);
    assert_eq!(post.docstring.as_deref(), Some("A blog post."));

    let serializer = listing
        .entities
        .iter()
        .find(|e| e.kind == EntityKind::Serializer)
        .unwrap();
    assert_eq!(serializer.fields, vec!["title"]);

    let registered = listing.entities.iter().find(|e| e.name == "post").unwrap();
    let route = registered.route.as_ref().unwrap();
    assert_eq!(route.pattern.as_deref(), Some("posts"));
    assert_eq!(route.view.as_deref(), Some("views.PostViewSet"));

    assert!(listing.entities.iter().all(|e| e.name != "about"));
}

#[test]
fn test_listing_order_follows_files_then_source() {
    let dir = setup_project();
    let listing = engine(&dir).list_entities("blog", None).unwrap();
    let files: Vec<String> = listing
        .entities
        .iter()
        .map(|e| e.file_path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();

    let mut deduped = files.clone();
    deduped.dedup();
    assert_eq!(
        deduped,
        vec![
            "models.py",
            "views.py",
            "serializers.py",
            "urls.py",
            "publish.py",
            "reindex.py"
        ]
    );
}

#[test]
fn test_modify_entity_from_listing() {
    let dir = setup_project();
    let engine = engine(&dir);

    let listing = engine.list_entities("blog", Some(EntityKind::Model)).unwrap();
    let post = &listing.entities[0];

    let replacement = "class Post(models.Model):\n    title = models.CharField(max_length=200)\n    body = models.TextField()";
    let request = ModificationRequest::from_entity(post, replacement);
    let result = engine.modify(&request).unwrap();

    let written = fs::read_to_string(&post.file_path).unwrap();
    assert!(result.success);
    assert_eq!(result.content_hash, content_hash(&written));
    assert!(written.starts_with("from django.db import models\n\n\nclass Post"));
    assert!(written.ends_with("body = models.TextField()\n"));

    let relisted = engine.list_entities("blog", Some(EntityKind::Model)).unwrap();
    assert_eq!(relisted.entities[0].fields, vec!["title", "body"]);
    assert!(relisted.entities[0].methods.is_empty());
}

#[test]
fn test_foo_model_scenario() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "apps/inventory/models.py",
        "class Foo(models.Model):\n    name = models.CharField()\n",
    );
    let engine = engine(&dir);

    let listing = engine.list_entities("inventory", None).unwrap();
    assert_eq!(listing.entities.len(), 1);
    let foo = &listing.entities[0];
    assert_eq!(foo.kind, EntityKind::Model);
    assert_eq!(foo.span, SourceSpan::new(1, 0, 2, 29));
    assert_eq!(foo.fields, vec!["name"]);

    let request = ModificationRequest::from_entity(
        foo,
        "class Foo(models.Model):\n    title = models.CharField()",
    );
    engine.modify(&request).unwrap();

    let listing = engine.list_entities("inventory", None).unwrap();
    assert_eq!(listing.entities[0].fields, vec!["title"]);
}

#[test]
fn test_foo_field_replacement() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "apps/inventory/models.py",
        "class Foo(models.Model):\n    name = models.CharField()\n",
    );
    let engine = engine(&dir);
    let file = dir.path().join("apps/inventory/models.py");

    // Columns count code points, so the field line ends at 29
    // (DESIGN.md decision 3).
    let request = ModificationRequest::new(
        &file,
        SourceSpan::new(2, 4, 2, 29),
        "name = models.CharField(max_length=255)",
    );
    let result = engine.modify(&request).unwrap();

    let expected = "class Foo(models.Model):\n    name = models.CharField(max_length=255)\n";
    assert_eq!(fs::read_to_string(&file).unwrap(), expected);
    assert!(result.success);
    assert_eq!(result.new_length, expected.chars().count());
    assert_eq!(result.content_hash, content_hash(expected));

    let listing = engine.list_entities("inventory", None).unwrap();
    assert_eq!(listing.entities[0].span, SourceSpan::new(1, 0, 2, 43));
}

#[test]
fn test_partial_failure_listing() {
    let dir = setup_project();
    write(dir.path(), "apps/blog/views.py", "def broken(:\n    pass\n");

    let listing = engine(&dir).list_entities("blog", None).unwrap();
    assert_eq!(listing.diagnostics.len(), 1);
    let diagnostic = &listing.diagnostics[0];
    assert_eq!(diagnostic.kind, ErrorKind::Parse);
    assert_eq!(diagnostic.line, Some(1));
    assert!(diagnostic.file_path.ends_with("views.py"));

    // Everything else is still listed.
    assert!(listing.entities.iter().any(|e| e.name == "Post"));
    assert!(listing.entities.iter().all(|e| e.kind != EntityKind::View));
}

#[test]
fn test_path_violation_regardless_of_existence() {
    let dir = setup_project();
    let outside = TempDir::new().unwrap();
    fs::write(outside.path().join("real.py"), "x = 1\n").unwrap();
    let engine = engine(&dir);

    for target in [
        outside.path().join("real.py"),
        outside.path().join("missing.py"),
        dir.path().join("apps/../../escape.py"),
    ] {
        let request = ModificationRequest::new(target, SourceSpan::point(1, 0), "import os\n");
        let err = engine.modify(&request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathViolation);
    }
    assert_eq!(
        fs::read_to_string(outside.path().join("real.py")).unwrap(),
        "x = 1\n"
    );
}

#[test]
fn test_concurrent_insertions_serialize() {
    let dir = setup_project();
    let engine = engine(&dir);
    let target = dir.path().join("apps/shop/models.py");

    std::thread::scope(|scope| {
        for i in 0..8 {
            let engine = &engine;
            let target = target.clone();
            scope.spawn(move || {
                let request =
                    ModificationRequest::new(target, SourceSpan::point(1, 0), format!("# {i}\n"));
                engine.modify(&request).unwrap();
            });
        }
    });

    let written = fs::read_to_string(&target).unwrap();
    for i in 0..8 {
        assert!(written.contains(&format!("# {i}\n")), "missing insertion {i}");
    }
    assert!(written.ends_with("class Product(models.Model):\n    pass\n"));
}

#[test]
fn test_unknown_app_and_file() {
    let dir = setup_project();
    let engine = engine(&dir);

    let err = engine.list_entities("static", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = engine.find_app_file("blog", "admin.py").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let file = engine.find_app_file("blog", "urls.py").unwrap();
    assert!(file.ends_with("apps/blog/urls.py"));
}
