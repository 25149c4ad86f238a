// File: src/seeds.rs
// Purpose: Expands configured prerender entries into start paths

use std::path::Path;
use walkdir::WalkDir;

use crate::error::{PrerenderError, Result};

/// Expands `*` into every page without parameters
///
/// Other entries are kept as given, in order.
pub fn expand(entries: &[String], routes: &Path, extensions: &[String]) -> Result<Vec<String>> {
    let mut seeds = Vec::new();

    for entry in entries {
        if entry == "*" {
            seeds.extend(static_pages(routes, extensions)?);
        } else {
            seeds.push(entry.clone());
        }
    }

    Ok(seeds)
}

/// Paths of the page files under `routes` that need no parameters
///
/// Files inside or named with a `_` prefix, files with `[` in their path and
/// the `$layout`/`$error` components are left out.
pub fn static_pages(routes: &Path, extensions: &[String]) -> Result<Vec<String>> {
    if !routes.is_dir() {
        return Ok(Vec::new());
    }

    let mut pages = Vec::new();

    for entry in WalkDir::new(routes).sort_by_file_name() {
        let entry = entry.map_err(|source| PrerenderError::Routes {
            dir: routes.to_path_buf(),
            source,
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(routes) else {
            continue;
        };

        let mut parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        if parts.iter().any(|part| part.starts_with('_') || part.contains('[')) {
            continue;
        }

        let Some(last) = parts.pop() else {
            continue;
        };

        let Some(stem) = extensions
            .iter()
            .find_map(|ext| last.strip_suffix(ext.as_str()))
        else {
            continue;
        };

        if stem == "$layout" || stem == "$error" {
            continue;
        }

        if stem != "index" {
            parts.push(stem.to_string());
        }

        pages.push(format!("/{}", parts.join("/")));
    }

    Ok(pages)
}
