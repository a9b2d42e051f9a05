//! omp-transform: the directive-driven source-to-source transformer.
//!
//! Input is host source containing directive markers; output is host source
//! whose regions have been lifted into nested functions calling the `__omp`
//! runtime bindings. The transform is deterministic, so results are
//! cacheable by content hash (see `cache`).

pub mod cache;
pub mod context;
pub mod processors;
pub mod reduction;
pub mod rewriter;
pub mod symtab;

use std::path::{Path, PathBuf};

use omp_frontend::diag::{SourceFile, SyntaxError};
use omp_frontend::parser::parse_module;
use omp_frontend::unparse::unparse_module;
use tracing::info;

use crate::context::NodeContext;
use crate::rewriter::rewrite_module;

/// Transform options; the partially-applied decorator variants of the host
/// API become preset values here.
#[derive(Debug, Clone)]
pub struct Options {
    /// Name the directive function is imported under.
    pub alias: String,
    /// Keep internal frames in diagnostics and log at debug level.
    pub debug: bool,
    /// Reuse/store transformed artifacts by content hash.
    pub cache: bool,
    pub cache_dir: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            alias: "omp".to_string(),
            debug: false,
            cache: false,
            cache_dir: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("{0}")]
    Syntax(#[from] SyntaxError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transform host source text. `filename` only labels diagnostics.
pub fn transform_source(
    source: &str,
    filename: &str,
    options: &Options,
) -> Result<String, TransformError> {
    if options.cache {
        if let Some(hit) = cache::lookup(source, options) {
            return Ok(hit);
        }
    }
    let src = SourceFile::new(filename, source);
    let mut module = parse_module(&src)?;
    let mut ctx = NodeContext::new(&src, &options.alias);
    rewrite_module(&mut ctx, &mut module)?;
    let out = unparse_module(&module);
    if options.cache {
        cache::store(source, options, &out);
    }
    Ok(out)
}

/// Transform a source file, writing the result as a sibling under an
/// `__omp__` directory. Returns the path of the transformed file.
pub fn transform_file(path: &Path, options: &Options) -> Result<PathBuf, TransformError> {
    let source = std::fs::read_to_string(path)?;
    let filename = path.display().to_string();
    let transformed = transform_source(&source, &filename, options)?;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let out_dir = parent.join("__omp__");
    std::fs::create_dir_all(&out_dir)?;
    let out_path = out_dir.join(path.file_name().expect("input path names a file"));
    std::fs::write(&out_path, transformed)?;
    info!(target: "transform", from = %path.display(), to = %out_path.display(), "file transformed");
    Ok(out_path)
}
