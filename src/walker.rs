use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

const DESCRIPTOR_EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "json"];

/// Engine descriptor files directly inside `dir`, sorted by file name.
/// Hidden files and files starting with `_` are skipped.
pub fn descriptor_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkBuilder::new(dir)
        .hidden(true)
        .git_global(false)
        .git_ignore(false)
        .git_exclude(false)
        .ignore(false)
        .max_depth(Some(1))
        .build()
        .filter_map(Result::ok)
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file() && is_descriptor(path))
        .collect();
    files.sort();
    files
}

fn is_descriptor(path: &Path) -> bool {
    let skipped = path
        .file_name()
        .and_then(|n| n.to_str())
        .map_or(true, |name| name.starts_with('_') || name.starts_with('.'));
    if skipped {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |ext| {
            DESCRIPTOR_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn lists_only_top_level_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.toml"), "").unwrap();
        fs::write(dir.path().join("a.yaml"), "").unwrap();
        fs::write(dir.path().join("__init__.toml"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/c.toml"), "").unwrap();

        let names: Vec<_> = descriptor_files(dir.path())
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.yaml", "b.toml"]);
    }
}
