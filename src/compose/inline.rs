// src/compose/inline.rs

//! Recursive inlining of shared-support modules into a driver text.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, trace};

use crate::errors::{Result, TaskhostError};
use crate::fs::FileSystem;

/// Expands every line matching `pattern` into the source of the module it
/// names.
///
/// - A dotted module path `a.b.c` resolves to `<root>/a/b/c.<extension>`.
/// - Leading header lines (starting with `comment_prefix`) of each inlined
///   module are dropped.
/// - Every module is inlined at most once per expansion, keyed by its
///   canonical path; later references to it are removed. This also stops
///   mutual references from recursing forever.
pub struct ModuleInliner<'a> {
    fs: &'a dyn FileSystem,
    root: &'a Path,
    pattern: &'a Regex,
    comment_prefix: &'a str,
    extension: &'a str,
}

impl<'a> ModuleInliner<'a> {
    pub fn new(
        fs: &'a dyn FileSystem,
        root: &'a Path,
        pattern: &'a Regex,
        comment_prefix: &'a str,
        extension: &'a str,
    ) -> Self {
        Self {
            fs,
            root,
            pattern,
            comment_prefix,
            extension,
        }
    }

    /// Expand `src`, starting with an empty visited set.
    pub fn expand(&self, src: &str) -> Result<String> {
        let mut visited = HashSet::new();
        self.expand_with(src, &mut visited)
    }

    /// Expand `src`, skipping modules already in `visited`.
    pub fn expand_with(&self, src: &str, visited: &mut HashSet<PathBuf>) -> Result<String> {
        let mut out: Vec<String> = Vec::new();

        for line in src.lines() {
            let Some(module) = self.referenced_module(line) else {
                out.push(line.to_string());
                continue;
            };

            let path = self.module_path(&module);
            let resolved = self.fs.canonicalize(&path).map_err(|e| {
                TaskhostError::TemplateUnreadable {
                    path: path.clone(),
                    reason: e.to_string(),
                }
            })?;

            if !visited.insert(resolved.clone()) {
                trace!(module = %module, "module already inlined; dropping reference");
                continue;
            }

            debug!(module = %module, path = ?resolved, "inlining support module");
            let source = self.fs.read_to_string(&resolved).map_err(|e| {
                TaskhostError::TemplateUnreadable {
                    path: resolved.clone(),
                    reason: e.to_string(),
                }
            })?;

            let body = strip_header(&source, self.comment_prefix);
            out.push(self.expand_with(&body, visited)?);
        }

        let mut text = out.join("\n");
        if src.ends_with('\n') {
            text.push('\n');
        }
        Ok(text)
    }

    fn referenced_module(&self, line: &str) -> Option<String> {
        self.pattern
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    fn module_path(&self, module: &str) -> PathBuf {
        let mut path = self.root.to_path_buf();
        for part in module.split('.') {
            path.push(part);
        }
        path.set_extension(self.extension);
        path
    }
}

/// Drop the leading lines that start with `comment_prefix`.
pub fn strip_header(source: &str, comment_prefix: &str) -> String {
    if comment_prefix.is_empty() {
        return source.trim_end_matches('\n').to_string();
    }
    source
        .lines()
        .skip_while(|line| line.starts_with(comment_prefix))
        .collect::<Vec<_>>()
        .join("\n")
}
