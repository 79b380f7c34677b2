// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Project initialization command.

use include_dir::{include_dir, Dir, DirEntry};
use std::fs;
use std::path::{Path, PathBuf};

static SCAFFOLD: Dir = include_dir!("$CARGO_MANIFEST_DIR/scaffold");

/// Creates a project in `name` (or the current directory).
///
/// Files that already exist are kept.
pub async fn run(name: Option<String>) -> anyhow::Result<()> {
    let is_current_dir = matches!(name.as_deref(), Some(".") | None);
    let (project_dir, project_name) = resolve_project_path(name)?;
    let created = scaffold(&project_dir, &project_name)?;

    println!("Created ea project: {}", project_name);
    for path in &created {
        println!("  {}", path.display());
    }
    println!();
    println!("Next steps:");
    if !is_current_dir {
        println!("  cd {}", project_name);
    }
    println!("  ea dev");
    Ok(())
}

/// Writes the scaffold into `target`. Returns the created files, relative
/// to `target`.
pub fn scaffold(target: &Path, project_name: &str) -> anyhow::Result<Vec<PathBuf>> {
    fs::create_dir_all(target)?;
    let mut created = Vec::new();
    for entry in SCAFFOLD.entries() {
        extract_entry(entry, target, project_name, &mut created)?;
    }
    Ok(created)
}

fn resolve_project_path(name: Option<String>) -> anyhow::Result<(PathBuf, String)> {
    match name.as_deref() {
        Some(".") | None => {
            let current_dir = std::env::current_dir()?;
            let dir_name = current_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "my-ea-app".to_string());
            Ok((current_dir, dir_name))
        }
        Some(name) => {
            let project_path = PathBuf::from(name);
            let dir_name = project_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.to_string());
            Ok((project_path, dir_name))
        }
    }
}

fn extract_entry(
    entry: &DirEntry,
    target: &Path,
    project_name: &str,
    created: &mut Vec<PathBuf>,
) -> anyhow::Result<()> {
    match entry {
        DirEntry::Dir(dir) => {
            fs::create_dir_all(target.join(dir.path()))?;
            for child in dir.entries() {
                extract_entry(child, target, project_name, created)?;
            }
        }
        DirEntry::File(file) => {
            let relative = file.path();
            let file_name = relative
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow::anyhow!("Invalid file name: {:?}", relative))?;

            let target_name = match file_name {
                "gitignore" => ".gitignore",
                name => name.strip_suffix(".tmpl").unwrap_or(name),
            };
            let relative = relative.with_file_name(target_name);
            let target_path = target.join(&relative);
            if target_path.exists() {
                tracing::info!("Keeping existing {}", relative.display());
                return Ok(());
            }
            if let Some(parent) = target_path.parent() {
                fs::create_dir_all(parent)?;
            }

            let content = file
                .contents_utf8()
                .ok_or_else(|| anyhow::anyhow!("Non-UTF8 file: {:?}", relative))?;
            let content = if file_name.ends_with(".tmpl") {
                content.replace("{{project_name}}", project_name)
            } else {
                content.to_string()
            };
            fs::write(&target_path, content)?;
            created.push(relative);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scaffolds_a_loadable_project() {
        let dir = TempDir::new().unwrap();
        let created = scaffold(dir.path(), "demo").unwrap();
        assert!(created.contains(&PathBuf::from("ea.toml")));
        assert!(dir.path().join("templates/index.html").is_file());
        assert!(dir.path().join("static/scss/styles.scss").is_file());

        let config = ea::Config::from_path(dir.path().join("ea.toml")).unwrap();
        assert_eq!(config.app.name, "demo");
    }

    #[test]
    fn keeps_existing_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("templates")).unwrap();
        fs::write(dir.path().join("templates/index.html"), "mine").unwrap();

        let created = scaffold(dir.path(), "demo").unwrap();
        assert!(!created.contains(&PathBuf::from("templates/index.html")));
        assert_eq!(
            fs::read_to_string(dir.path().join("templates/index.html")).unwrap(),
            "mine"
        );
    }
}
