//! Tera rendering engine: [`TemplateEngine`] and [`CommentRenderer`].
//!
//! Every [`CommentKind`] has one embedded template. A directory of `.tera`
//! files can override any of them by name (`welcome.md.tera`, ...).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tera::Tera;

use crate::context::CommentContext;
use crate::error::RenderError;
use crate::marker::{data_line, marker_line, CommentData, CommentKind};

// ---------------------------------------------------------------------------
// Embedded templates: baked into the binary at compile time via include_str!
// ---------------------------------------------------------------------------

const TPLS: &[(&str, &str)] = &[
    ("welcome.md.tera", include_str!("templates/welcome.md.tera")),
    (
        "welcome_closed.md.tera",
        include_str!("templates/welcome_closed.md.tera"),
    ),
    (
        "blended_welcome.md.tera",
        include_str!("templates/blended_welcome.md.tera"),
    ),
    (
        "no_contributions.md.tera",
        include_str!("templates/no_contributions.md.tera"),
    ),
    ("needs_cla.md.tera", include_str!("templates/needs_cla.md.tera")),
    ("draft_notice.md.tera", include_str!("templates/draft_notice.md.tera")),
    ("survey.md.tera", include_str!("templates/survey.md.tera")),
];

// ---------------------------------------------------------------------------
// Template loading helpers
// ---------------------------------------------------------------------------

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io {
        path: path.into(),
        source,
    }
}

fn normalize_template_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").to_lowercase()
}

fn collect_template_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), RenderError> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        let meta = entry.metadata().map_err(|e| io_err(&path, e))?;
        if meta.is_dir() {
            collect_template_files(&path, out)?;
        } else if meta.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

fn load_user_templates(dir: &Path) -> Result<Vec<(String, String)>, RenderError> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut files = Vec::new();
    collect_template_files(dir, &mut files)?;
    let mut templates = Vec::new();
    for path in files {
        if path.extension().and_then(|s| s.to_str()) != Some("tera") {
            continue;
        }
        let rel = path.strip_prefix(dir).unwrap_or(path.as_path());
        let name = normalize_template_name(rel);
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        templates.push((name, contents));
    }
    Ok(templates)
}

fn build_tera(user_template_dir: Option<&Path>) -> Result<Tera, RenderError> {
    let mut templates: HashMap<String, String> = HashMap::new();
    for (name, content) in TPLS {
        templates.insert(
            normalize_template_name(Path::new(name)),
            (*content).to_string(),
        );
    }
    if let Some(dir) = user_template_dir {
        for (name, content) in load_user_templates(dir)? {
            templates.insert(name, content);
        }
    }

    let mut tera = Tera::default();
    // Comment bodies are markdown; HTML escaping would mangle links.
    tera.autoescape_on(vec![]);
    let items: Vec<(String, String)> = templates.into_iter().collect();
    tera.add_raw_templates(items)?;
    Ok(tera)
}

// ---------------------------------------------------------------------------
// TemplateEngine
// ---------------------------------------------------------------------------

/// Tera-based engine for rendering templates with optional user overrides.
///
/// `user_template_dir` may contain `.tera` files that override embedded defaults.
/// Template names are normalised to lowercase and relative paths.
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    pub fn new(user_template_dir: Option<&Path>) -> Result<Self, RenderError> {
        let tera = build_tera(user_template_dir)?;
        Ok(TemplateEngine { tera })
    }

    /// Render one template by name.
    pub fn render(&self, name: &str, ctx: &CommentContext) -> Result<String, RenderError> {
        let tera_ctx = ctx.to_tera_context()?;
        Ok(self.tera.render(name, &tera_ctx)?)
    }
}

// ---------------------------------------------------------------------------
// CommentRenderer
// ---------------------------------------------------------------------------

/// Renders complete comment bodies: template text, marker, and for lead
/// comments the data block.
///
/// Create once per process and share; rendering is read-only.
pub struct CommentRenderer {
    engine: TemplateEngine,
}

impl CommentRenderer {
    /// A renderer with embedded templates only.
    pub fn new() -> Result<Self, RenderError> {
        Self::with_overrides(None)
    }

    pub fn with_overrides(template_dir: Option<&Path>) -> Result<Self, RenderError> {
        Ok(CommentRenderer {
            engine: TemplateEngine::new(template_dir)?,
        })
    }

    /// Render the full body for `kind`.
    ///
    /// `data` is written only for lead kinds. Line endings are normalised to
    /// `\n` so bodies compare stably across template sources.
    pub fn render(
        &self,
        kind: CommentKind,
        ctx: &CommentContext,
        data: &CommentData,
    ) -> Result<String, RenderError> {
        let text = self.engine.render(kind.template_name(), ctx)?;
        let mut body = text.replace("\r\n", "\n").trim_end().to_string();
        body.push_str("\n\n");
        body.push_str(&marker_line(kind));
        if kind.is_lead() {
            body.push('\n');
            body.push_str(&data_line(data)?);
        }
        body.push('\n');
        Ok(body)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
