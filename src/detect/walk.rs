use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

use crate::services::IgnoreMatcher;

/// Every regular file under `root` that `matcher` does not ignore, sorted.
///
/// Only `.git` directories are pruned during the walk; all other filtering
/// is the matcher's call.
pub fn walk_files(root: &Path, matcher: &dyn IgnoreMatcher) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(false)
        .follow_links(false)
        .filter_entry(|entry| entry.file_name() != ".git")
        .build();

    let mut files = Vec::new();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!("walk error under {}: {e}", root.display());
                continue;
            }
        };

        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let path = entry.path();
        if matcher.should_ignore(path) {
            continue;
        }

        files.push(path.to_path_buf());
    }

    files.sort();
    files
}
