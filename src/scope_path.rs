use std::path::{Component, Path, PathBuf};

pub fn normalize(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    while normalized.ends_with('/') && normalized.len() > 1 {
        normalized.pop();
    }
    normalized
}

/// Forward-slash form of a relative path, without a leading `./`.
pub fn to_slash(path: &Path) -> String {
    let raw = normalize(&path.to_string_lossy());
    raw.strip_prefix("./").map(str::to_string).unwrap_or(raw)
}

pub fn is_within_scope(path: &str, root: &str) -> bool {
    let path = normalize(path);
    let root = normalize(root);

    if path == root {
        return true;
    }

    if root == "/" {
        return path.starts_with('/');
    }

    if cfg!(windows) {
        let path_lower = path.to_ascii_lowercase();
        let root_lower = root.to_ascii_lowercase();
        return path_lower.starts_with(&(root_lower + "/"));
    }

    path.starts_with(&(root + "/"))
}

/// Separator-terminated key prefix for everything stored beneath `directory`.
pub fn dir_prefix(directory: &str) -> String {
    let cleaned = clean(Path::new(directory)).to_string_lossy().to_string();
    if cleaned.ends_with(std::path::MAIN_SEPARATOR) {
        cleaned
    } else {
        format!("{cleaned}{}", std::path::MAIN_SEPARATOR)
    }
}

/// Lexical cleanup: drops `.` segments and resolves `..` against the preceding
/// segment. `..` above a root is discarded; above a relative start it is kept.
pub fn clean(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().map(|c| c.as_os_str()).collect()
}

/// Absolute, cleaned form of `path`, resolved against the working directory
/// when relative.
pub fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(clean(path))
    } else {
        Ok(clean(&std::env::current_dir()?.join(path)))
    }
}

/// Relative path leading from directory `base` to `target`. Both are cleaned
/// first; `None` when one is absolute and the other is not, or when they sit
/// on different prefixes (Windows drives).
pub fn relative_to(base: &Path, target: &Path) -> Option<PathBuf> {
    let base = clean(base);
    let target = clean(target);
    if base.is_absolute() != target.is_absolute() {
        return None;
    }

    let base_parts: Vec<Component> = base.components().filter(|c| *c != Component::CurDir).collect();
    let target_parts: Vec<Component> =
        target.components().filter(|c| *c != Component::CurDir).collect();

    if let (Some(Component::Prefix(a)), Some(Component::Prefix(b))) =
        (base_parts.first(), target_parts.first())
    {
        if a != b {
            return None;
        }
    }

    let shared = base_parts
        .iter()
        .zip(target_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    if base_parts[shared..].iter().any(|c| *c == Component::ParentDir) {
        return None;
    }

    let mut relative = PathBuf::new();
    for _ in shared..base_parts.len() {
        relative.push("..");
    }
    for part in &target_parts[shared..] {
        relative.push(part.as_os_str());
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    Some(relative)
}

/// Deepest directory containing every path in `paths`, compared component by
/// component. Falls back to the filesystem root when nothing is shared.
pub fn common_ancestor(paths: &[PathBuf]) -> Option<PathBuf> {
    let (first, rest) = paths.split_first()?;
    let mut common: Vec<Component> = first.components().collect();
    for path in rest {
        let shared = common
            .iter()
            .zip(path.components())
            .take_while(|(a, b)| **a == *b)
            .count();
        common.truncate(shared);
    }

    if common.is_empty() {
        return Some(PathBuf::from(std::path::MAIN_SEPARATOR_STR));
    }
    Some(common.iter().map(|c| c.as_os_str()).collect())
}
