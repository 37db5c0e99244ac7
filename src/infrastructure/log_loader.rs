use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Collects debug log files from explicit paths and folders.
pub struct LogLoader;

impl LogLoader {
    /// Explicit files are kept as given; folders are searched recursively for
    /// `*.log`. The result is sorted and free of duplicates.
    pub fn collect(files: &[PathBuf], folders: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut out: Vec<PathBuf> = files.to_vec();
        for folder in folders {
            Self::collect_logs_recursive(folder, &mut out)
                .with_context(|| format!("Failed to scan folder {}", folder.display()))?;
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    /// Read every path as text. Invalid UTF-8 is replaced rather than rejected.
    pub fn load(paths: &[PathBuf]) -> Result<Vec<(String, String)>> {
        paths
            .iter()
            .map(|path| {
                let bytes = fs::read(path).map_err(|source| crate::error::Error::Io { path: path.clone(), source })?;
                Ok((path.display().to_string(), String::from_utf8_lossy(&bytes).into_owned()))
            })
            .collect()
    }

    /// One output file name per source, `<stem>.<extension>`. Sources that
    /// share a stem get `-2`, `-3`, ... in input order so no output is
    /// written twice.
    pub fn output_names(sources: &[String], extension: &str) -> Vec<String> {
        let mut taken: HashSet<String> = HashSet::with_capacity(sources.len());
        sources
            .iter()
            .map(|source| {
                let stem = Path::new(source)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "log".to_string());
                let mut name = format!("{stem}.{extension}");
                let mut n = 2;
                while !taken.insert(name.clone()) {
                    name = format!("{stem}-{n}.{extension}");
                    n += 1;
                }
                if n > 2 {
                    log::warn!("{source}: output renamed to {name}, another log has the same file name");
                }
                name
            })
            .collect()
    }

    fn collect_logs_recursive(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        if dir.ends_with("target") || dir.ends_with(".git") || dir.ends_with("node_modules") {
            return Ok(());
        }
        if dir.is_file() {
            out.push(dir.to_path_buf());
            return Ok(());
        }

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_dir() {
                Self::collect_logs_recursive(&path, out)?;
            } else if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("log")) {
                out.push(path);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_nested_logs_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b/deep")).unwrap();
        fs::write(dir.path().join("b/deep/two.log"), "x").unwrap();
        fs::write(dir.path().join("a.log"), "x").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let explicit = dir.path().join("a.log");
        let found = LogLoader::collect(&[explicit], &[dir.path().to_path_buf()]).unwrap();
        assert_eq!(found, vec![dir.path().join("a.log"), dir.path().join("b/deep/two.log")]);
    }

    #[test]
    fn test_load_replaces_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.log");
        fs::write(&path, b"ok\xffok").unwrap();
        let loaded = LogLoader::load(&[path]).unwrap();
        assert_eq!(loaded[0].1, "ok\u{fffd}ok");
    }

    #[test]
    fn test_output_names_are_unique() {
        let sources: Vec<String> = ["logs/one.log", "logs/nested/one.log", "logs/one-2.log", "logs/two.log", "logs/deep/one.log"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            LogLoader::output_names(&sources, "json"),
            vec!["one.json", "one-2.json", "one-2-2.json", "two.json", "one-3.json"]
        );
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = LogLoader::load(&[PathBuf::from("/nonexistent/x.log")]).unwrap_err();
        assert!(matches!(err.downcast_ref::<crate::error::Error>(), Some(crate::error::Error::Io { .. })));
    }
}
