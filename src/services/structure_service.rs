use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use crate::error::AppError;
use crate::scope_path;
use crate::services::ignore_service::IgnoreMatcher;
use crate::services::index_service::IndexStore;

/// One line per entry below `root`: `rel/dir/` or `rel/file (N bytes)`.
/// Ignored directories are listed but not descended; ignored files are left
/// out. `max_depth == 0` lists the whole tree.
pub fn describe_tree(
    root: &Path,
    max_depth: usize,
    matcher: &IgnoreMatcher,
) -> Result<String, AppError> {
    let mut listing = String::new();
    let mut walker = walkdir::WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry?;
        let relative = scope_path::to_slash(entry.path().strip_prefix(root).unwrap_or(entry.path()));
        let is_dir = entry.file_type().is_dir();

        if matcher.should_ignore(&relative, is_dir) {
            if is_dir {
                let _ = writeln!(listing, "{relative}/");
                walker.skip_current_dir();
            }
            continue;
        }

        if max_depth > 0 && entry.depth() > max_depth {
            if is_dir {
                walker.skip_current_dir();
            }
            continue;
        }

        if is_dir {
            let _ = writeln!(listing, "{relative}/");
        } else {
            let size = entry.metadata()?.len();
            let _ = writeln!(listing, "{relative} ({size} bytes)");
        }
    }
    Ok(listing)
}

/// Inserts `[description]` before the size of every indexed file line.
pub fn enrich_with_descriptions(
    root: &Path,
    listing: &str,
    store: &dyn IndexStore,
) -> Result<String, AppError> {
    let descriptions: HashMap<String, String> = store
        .list_under(&root.to_string_lossy())?
        .into_iter()
        .filter(|f| !f.description.is_empty())
        .map(|f| (f.path, f.description))
        .collect();

    let mut enriched = String::with_capacity(listing.len());
    for line in listing.lines() {
        let trimmed = line.trim();
        let described = match trimmed.rsplit_once(" (") {
            Some((relative, size)) if !trimmed.ends_with('/') => {
                let full = scope_path::clean(&root.join(relative.trim()))
                    .to_string_lossy()
                    .to_string();
                descriptions
                    .get(&full)
                    .map(|desc| format!("{} [{desc}] ({size}", relative.trim()))
            }
            _ => None,
        };
        enriched.push_str(described.as_deref().unwrap_or(line));
        enriched.push('\n');
    }
    Ok(enriched)
}
