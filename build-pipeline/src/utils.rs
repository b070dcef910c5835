// Utility Functions
// Filesystem helpers shared by the workspace and the built-in modules

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Replace characters that are not valid in file names on common platforms.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Ensure `dir` exists and is empty.
pub fn clean_directory(dir: &Path) -> io::Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)
}

/// Whether `dir` is missing or has no entries.
pub fn is_empty_dir(dir: &Path) -> bool {
    match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

/// Recursively copy the contents of `from` into `to`, creating `to` as needed.
///
/// Returns the number of files copied.
pub fn copy_dir_recursive(from: &Path, to: &Path) -> io::Result<usize> {
    fs::create_dir_all(to)?;
    let mut copied = 0;

    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = to.join(entry.file_name());

        if file_type.is_dir() {
            copied += copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Copy a file or directory to `destination_dir`, keeping its name.
pub fn copy_into(source: &Path, destination_dir: &Path) -> io::Result<PathBuf> {
    let name = source.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", source.display()),
        )
    })?;
    let target = destination_dir.join(name);

    if source.is_dir() {
        copy_dir_recursive(source, &target)?;
    } else {
        fs::create_dir_all(destination_dir)?;
        fs::copy(source, &target)?;
    }

    Ok(target)
}
