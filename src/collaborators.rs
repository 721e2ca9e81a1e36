//! Seams for the external processing engines the pipeline drives.
//!
//! The heavy lifting (image codecs, style compilation, lint rule sets)
//! belongs to external engines behind these traits. Each seam ships a
//! degenerate default so the pipeline stays runnable without them: the
//! optimizer and minifier pass bytes through, the converter rewrites
//! extensions, the compiler resolves includes by concatenation, and the
//! lint engines flag whitespace issues.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::entry::FileEntry;
use crate::error::{Error, Finding, Result};
use crate::pipeline::{StepContext, TransformStep};

const MAX_IMPORT_DEPTH: usize = 16;

// ---------------------------------------------------------------------------
// Image compression

pub trait ImageOptimizer: Send + Sync {
    fn optimize(&self, contents: &[u8], extension: &str) -> Result<Vec<u8>>;
}

/// Identity optimizer standing in for an external codec.
pub struct PassthroughOptimizer;

impl ImageOptimizer for PassthroughOptimizer {
    fn optimize(&self, contents: &[u8], _extension: &str) -> Result<Vec<u8>> {
        Ok(contents.to_vec())
    }
}

pub struct OptimizeStep {
    optimizer: Box<dyn ImageOptimizer>,
}

impl OptimizeStep {
    pub fn new(optimizer: Box<dyn ImageOptimizer>) -> Box<dyn TransformStep> {
        Box::new(Self { optimizer })
    }
}

#[async_trait]
impl TransformStep for OptimizeStep {
    fn name(&self) -> &str {
        "optimize"
    }

    async fn apply(&self, mut entries: Vec<FileEntry>, _cx: &StepContext) -> Result<Vec<FileEntry>> {
        for entry in &mut entries {
            let extension = entry
                .rel_path
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();
            entry.contents = self.optimizer.optimize(&entry.contents, &extension)?;
        }
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Alternate-format conversion

/// Produces sibling output files in an alternate image format.
pub trait ImageConverter: Send + Sync {
    /// Extension of the converted siblings.
    fn extension(&self) -> &str;

    fn convert(&self, contents: &[u8], source_extension: &str) -> Result<Vec<u8>>;
}

/// Rewrites the extension and passes bytes through, standing in for an
/// external encoder.
pub struct ExtensionConverter {
    extension: String,
}

impl ExtensionConverter {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }
}

impl ImageConverter for ExtensionConverter {
    fn extension(&self) -> &str {
        &self.extension
    }

    fn convert(&self, contents: &[u8], _source_extension: &str) -> Result<Vec<u8>> {
        Ok(contents.to_vec())
    }
}

pub struct ConvertStep {
    converter: Box<dyn ImageConverter>,
}

impl ConvertStep {
    pub fn new(converter: Box<dyn ImageConverter>) -> Box<dyn TransformStep> {
        Box::new(Self { converter })
    }
}

#[async_trait]
impl TransformStep for ConvertStep {
    fn name(&self) -> &str {
        "convert"
    }

    async fn apply(&self, mut entries: Vec<FileEntry>, _cx: &StepContext) -> Result<Vec<FileEntry>> {
        for entry in &mut entries {
            let extension = entry
                .rel_path
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();
            entry.contents = self.converter.convert(&entry.contents, &extension)?;
            entry.set_extension(self.converter.extension());
        }
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Linting

/// A lint engine inspects entries and reports findings; it never mutates.
pub trait LintEngine: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, entry: &FileEntry) -> Vec<Finding>;
}

/// Flags tab indentation and trailing whitespace. Stands in for a real
/// rule engine; binary files are skipped.
pub struct WhitespaceLint {
    name: &'static str,
}

pub fn script_lint() -> Box<dyn LintEngine> {
    Box::new(WhitespaceLint { name: "scripts" })
}

pub fn style_lint() -> Box<dyn LintEngine> {
    Box::new(WhitespaceLint { name: "styles" })
}

impl LintEngine for WhitespaceLint {
    fn name(&self) -> &str {
        self.name
    }

    fn check(&self, entry: &FileEntry) -> Vec<Finding> {
        let Ok(text) = std::str::from_utf8(&entry.contents) else {
            return Vec::new();
        };

        let mut findings = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.len() != line.trim_end().len() {
                findings.push(Finding {
                    file: entry.rel_path.clone(),
                    line: index + 1,
                    message: "trailing whitespace".to_string(),
                });
            }
            if line.contains('\t') {
                findings.push(Finding {
                    file: entry.rel_path.clone(),
                    line: index + 1,
                    message: "tab indentation".to_string(),
                });
            }
        }
        findings
    }
}

/// Runs a lint engine over the entry stream. Findings become a report
/// error; a clean stream passes through unchanged.
pub struct LintStep {
    label: String,
    engine: Box<dyn LintEngine>,
}

impl LintStep {
    pub fn new(engine: Box<dyn LintEngine>) -> Box<dyn TransformStep> {
        Box::new(Self {
            label: format!("lint:{}", engine.name()),
            engine,
        })
    }
}

#[async_trait]
impl TransformStep for LintStep {
    fn name(&self) -> &str {
        &self.label
    }

    async fn apply(&self, entries: Vec<FileEntry>, cx: &StepContext) -> Result<Vec<FileEntry>> {
        let mut findings = Vec::new();
        for entry in &entries {
            findings.extend(self.engine.check(entry));
        }

        if findings.is_empty() {
            Ok(entries)
        } else {
            Err(Error::Report {
                task: cx.task.clone(),
                findings,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Style compilation

/// Compiles a stylesheet entry to CSS.
pub trait StyleCompiler: Send + Sync {
    fn compile(&self, entry: &FileEntry) -> Result<String>;
}

/// Inlines `@import "name";` directives against the include paths,
/// looking for `name.scss` or the `_name.scss` partial convention.
/// Stands in for a real stylesheet compiler.
pub struct IncludeResolvingCompiler {
    include_paths: Vec<PathBuf>,
}

impl IncludeResolvingCompiler {
    pub fn new(include_paths: Vec<PathBuf>) -> Self {
        Self { include_paths }
    }

    fn resolve_import(&self, name: &str) -> Option<PathBuf> {
        for dir in &self.include_paths {
            for candidate in [format!("{}.scss", name), format!("_{}.scss", name)] {
                let path = dir.join(&candidate);
                if path.is_file() {
                    return Some(path);
                }
            }
        }
        None
    }

    fn compile_source(&self, source: &str, depth: usize) -> Result<String> {
        if depth > MAX_IMPORT_DEPTH {
            return Err(Error::Engine("import depth exceeded".to_string()));
        }

        let mut output = String::with_capacity(source.len());
        for line in source.lines() {
            match parse_import(line) {
                Some(name) => {
                    let path = self.resolve_import(name).ok_or_else(|| {
                        Error::Engine(format!("unresolved import '{}'", name))
                    })?;
                    let imported =
                        std::fs::read_to_string(&path).map_err(|source| Error::Io {
                            path: path.clone(),
                            source,
                        })?;
                    output.push_str(&self.compile_source(&imported, depth + 1)?);
                }
                None => {
                    output.push_str(line);
                    output.push('\n');
                }
            }
        }
        Ok(output)
    }
}

impl StyleCompiler for IncludeResolvingCompiler {
    fn compile(&self, entry: &FileEntry) -> Result<String> {
        let source = std::str::from_utf8(&entry.contents)
            .map_err(|e| Error::Engine(format!("stylesheet is not valid utf-8: {}", e)))?;
        self.compile_source(source, 0)
    }
}

/// `@import "name";` -> `name`
fn parse_import(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix("@import")?.trim();
    let rest = rest.strip_suffix(';').unwrap_or(rest).trim();
    rest.strip_prefix('"')?.strip_suffix('"')
}

pub struct CompileStep {
    compiler: Box<dyn StyleCompiler>,
}

impl CompileStep {
    pub fn new(compiler: Box<dyn StyleCompiler>) -> Box<dyn TransformStep> {
        Box::new(Self { compiler })
    }
}

#[async_trait]
impl TransformStep for CompileStep {
    fn name(&self) -> &str {
        "compile"
    }

    async fn apply(&self, mut entries: Vec<FileEntry>, _cx: &StepContext) -> Result<Vec<FileEntry>> {
        for entry in &mut entries {
            let css = self.compiler.compile(entry)?;
            entry.contents = css.into_bytes();
            entry.set_extension("css");
        }
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Minification

pub trait CssMinifier: Send + Sync {
    fn minify(&self, css: &str) -> Result<String>;
}

/// Identity minifier standing in for an external minification engine.
pub struct PassthroughMinifier;

impl CssMinifier for PassthroughMinifier {
    fn minify(&self, css: &str) -> Result<String> {
        Ok(css.to_string())
    }
}

pub struct MinifyStep {
    minifier: Box<dyn CssMinifier>,
}

impl MinifyStep {
    pub fn new(minifier: Box<dyn CssMinifier>) -> Box<dyn TransformStep> {
        Box::new(Self { minifier })
    }
}

#[async_trait]
impl TransformStep for MinifyStep {
    fn name(&self) -> &str {
        "minify"
    }

    async fn apply(&self, mut entries: Vec<FileEntry>, _cx: &StepContext) -> Result<Vec<FileEntry>> {
        for entry in &mut entries {
            let css = std::str::from_utf8(&entry.contents)
                .map_err(|e| Error::Engine(format!("stylesheet is not valid utf-8: {}", e)))?;
            entry.contents = self.minifier.minify(css)?.into_bytes();
        }
        Ok(entries)
    }
}
