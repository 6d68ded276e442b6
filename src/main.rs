use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use django_patcher::config::{apply_env, load_from_path};
use django_patcher::edit::EditVerification;
use django_patcher::{
    Engine, EngineConfig, EngineError, EntityKind, ErrorKind, Listing, ModificationRequest,
    RangeError, SourceSpan,
};
use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Config file picked up from the current directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "django-patcher.toml";

#[derive(Parser)]
#[command(name = "django-patcher")]
#[command(about = "Inspect and patch Django app sources by position", long_about = None)]
#[command(version)]
struct Cli {
    /// Workspace root (overrides config and DJANGO_PATCHER_WORKSPACE)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Apps directory; repeat for several (overrides DJANGO_PROJECT_APPS_DIR)
    #[arg(long = "apps-dir", global = true)]
    apps_dirs: Vec<PathBuf>,

    /// Config file (defaults to ./django-patcher.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List discovered apps
    Apps {
        #[arg(long)]
        json: bool,
    },

    /// List the source files scanned for an app
    Files { app: String },

    /// List entities defined in an app
    List {
        app: String,

        /// Only show one kind (model, view, serializer, urlpattern, task, command)
        #[arg(short, long)]
        kind: Option<EntityKind>,

        #[arg(long)]
        json: bool,
    },

    /// List entities defined in a single file
    Inspect {
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Replace the text inside a span
    Modify {
        #[arg(short, long)]
        file: PathBuf,

        #[command(flatten)]
        span: SpanArgs,

        /// Replacement text
        #[arg(
            short,
            long,
            conflicts_with = "replacement_file",
            required_unless_present = "replacement_file"
        )]
        replacement: Option<String>,

        /// Read the replacement text from a file
        #[arg(long)]
        replacement_file: Option<PathBuf>,

        /// Refuse the edit unless the span currently holds this text
        #[arg(long)]
        expect: Option<String>,

        /// Require a cleanly parsing file and a start on a syntax boundary
        #[arg(long)]
        strict: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        #[arg(long)]
        json: bool,
    },

    /// Resolve a span to absolute offsets
    Resolve {
        #[arg(short, long)]
        file: PathBuf,

        #[command(flatten)]
        span: SpanArgs,
    },
}

#[derive(clap::Args)]
struct SpanArgs {
    #[arg(long)]
    start_line: usize,
    #[arg(long)]
    start_col: usize,
    #[arg(long)]
    end_line: usize,
    #[arg(long)]
    end_col: usize,
}

impl SpanArgs {
    /// The span, rejected early if its shape is invalid for any text.
    fn span(&self) -> Result<SourceSpan, RangeError> {
        let span = SourceSpan::new(self.start_line, self.start_col, self.end_line, self.end_col);
        span.validate()?;
        Ok(span)
    }
}

#[derive(Serialize)]
struct ErrorReport<'a> {
    success: bool,
    kind: &'a str,
    message: String,
}

fn main() {
    let cli = Cli::parse();

    // RUST_LOG overrides; the library only logs warnings by default.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let json = matches!(
        cli.command,
        Commands::Apps { json: true }
            | Commands::List { json: true, .. }
            | Commands::Inspect { json: true, .. }
            | Commands::Modify { json: true, .. }
    );

    if let Err(err) = run(cli) {
        report_error(&err, json);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let strict_flag = matches!(cli.command, Commands::Modify { strict: true, .. });
    let config = resolve_config(&cli, strict_flag)?;
    let engine = Engine::new(config)?;

    match cli.command {
        Commands::Apps { json } => cmd_apps(&engine, json),
        Commands::Files { app } => cmd_files(&engine, &app),
        Commands::List { app, kind, json } => cmd_list(&engine, &app, kind, json),
        Commands::Inspect { file, json } => cmd_inspect(&engine, &file, json),
        Commands::Modify {
            file,
            span,
            replacement,
            replacement_file,
            expect,
            strict: _,
            diff,
            dry_run,
            json,
        } => {
            let span = span.span().map_err(EngineError::from)?;
            let replacement = match (replacement, replacement_file) {
                (Some(text), _) => text,
                (None, Some(path)) => fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => anyhow::bail!("one of --replacement or --replacement-file is required"),
            };
            let mut request = ModificationRequest::new(file, span, replacement);
            request.expected = expect.map(EditVerification::ExactMatch);
            cmd_modify(&engine, &request, diff, dry_run, json)
        }
        Commands::Resolve { file, span } => {
            let span = span.span().map_err(EngineError::from)?;
            cmd_resolve(&engine, &file, &span)
        }
    }
}

/// Build the config with precedence CLI flag > environment > file > defaults.
fn resolve_config(cli: &Cli, strict: bool) -> Result<EngineConfig, EngineError> {
    let default_file = PathBuf::from(DEFAULT_CONFIG_FILE);
    let config = match &cli.config {
        Some(path) => load_from_path(path)?,
        None if default_file.is_file() => load_from_path(&default_file)?,
        None => EngineConfig::default(),
    };

    let mut config = apply_env(config)?;
    if let Some(workspace) = &cli.workspace {
        config.workspace_root = workspace.clone();
    }
    if !cli.apps_dirs.is_empty() {
        config.apps_dirs = cli.apps_dirs.clone();
    }
    if strict {
        config.strict = true;
    }
    Ok(config)
}

/// Engine errors carry their own kind; the rest are I/O or usage failures.
fn error_kind(err: &anyhow::Error) -> ErrorKind {
    match err.downcast_ref::<EngineError>() {
        Some(err) => err.kind(),
        None if err.is::<std::io::Error>() || err.is::<serde_json::Error>() => ErrorKind::Io,
        None => ErrorKind::Config,
    }
}

fn report_error(err: &anyhow::Error, json: bool) {
    let kind = error_kind(err);
    if json {
        let report = ErrorReport {
            success: false,
            kind: kind.as_str(),
            message: format!("{err:#}"),
        };
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(_) => eprintln!("{} {:#}", "✗".red(), err),
        }
    } else {
        eprintln!("{} [{}] {:#}", "✗".red(), kind, err);
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn relative<'a>(engine: &Engine, path: &'a Path) -> std::borrow::Cow<'a, str> {
    path.strip_prefix(engine.workspace_root())
        .unwrap_or(path)
        .to_string_lossy()
}

fn cmd_apps(engine: &Engine, json: bool) -> Result<()> {
    let apps = engine.list_apps()?;
    if json {
        return print_json(&apps);
    }

    if apps.is_empty() {
        println!("{}", "No apps found".yellow());
    }
    for app in &apps {
        println!("{}  {}", app.name.bold(), relative(engine, &app.path).dimmed());
    }
    Ok(())
}

fn cmd_files(engine: &Engine, app: &str) -> Result<()> {
    for file in engine.list_files(app)? {
        println!("{}", relative(engine, &file));
    }
    Ok(())
}

fn cmd_list(engine: &Engine, app: &str, kind: Option<EntityKind>, json: bool) -> Result<()> {
    let listing = engine.list_entities(app, kind)?;
    if json {
        return print_json(&listing);
    }
    print_listing(engine, &listing);
    Ok(())
}

fn cmd_inspect(engine: &Engine, file: &Path, json: bool) -> Result<()> {
    let listing = engine.inspect_file(file)?;
    if json {
        return print_json(&listing);
    }
    print_listing(engine, &listing);
    Ok(())
}

fn print_listing(engine: &Engine, listing: &Listing) {
    for entity in &listing.entities {
        println!(
            "{:<11} {}  {}:{}",
            entity.kind.as_str().cyan(),
            entity.name.bold(),
            relative(engine, &entity.file_path).dimmed(),
            entity.span,
        );
        if !entity.fields.is_empty() {
            println!("            fields: {}", entity.fields.join(", "));
        }
        if !entity.methods.is_empty() {
            println!("            methods: {}", entity.methods.join(", "));
        }
        if let Some(route) = &entity.route {
            let pattern = route.pattern.as_deref().unwrap_or("?");
            let view = route.view.as_deref().unwrap_or("?");
            println!("            route: {pattern} -> {view}");
        }
    }

    for diagnostic in &listing.diagnostics {
        let location = match diagnostic.line {
            Some(line) => format!("{}:{}", relative(engine, &diagnostic.file_path), line),
            None => relative(engine, &diagnostic.file_path).into_owned(),
        };
        eprintln!(
            "{} {} [{}] {}",
            "⚠".yellow(),
            location,
            diagnostic.kind,
            diagnostic.message
        );
    }

    println!();
    println!(
        "{} entities, {} diagnostics",
        format!("{}", listing.entities.len()).green(),
        format!("{}", listing.diagnostics.len()).yellow()
    );
}

fn cmd_modify(
    engine: &Engine,
    request: &ModificationRequest,
    show_diff: bool,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    if dry_run || show_diff {
        let prepared = engine.preview(request)?;
        if show_diff {
            display_diff(&prepared.path, &prepared.original, &prepared.updated);
        }
        if dry_run {
            let result = prepared.result();
            if json {
                return print_json(&result);
            }
            println!(
                "{} Would write {} ({} code points, hash {})",
                "⊙".yellow(),
                relative(engine, &prepared.path),
                result.new_length,
                result.content_hash
            );
            return Ok(());
        }
    }

    let result = engine.modify(request)?;
    if json {
        return print_json(&result);
    }
    println!(
        "{} Modified {} at {} ({} code points, hash {})",
        "✓".green(),
        request.file_path.display(),
        request.span,
        result.new_length,
        result.content_hash
    );
    Ok(())
}

fn cmd_resolve(engine: &Engine, file: &Path, span: &SourceSpan) -> Result<()> {
    let resolved = engine.resolve(file, span)?;
    println!(
        "chars {}..{}  bytes {}..{}",
        resolved.chars.start, resolved.chars.end, resolved.bytes.start, resolved.bytes.end
    );
    Ok(())
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}
