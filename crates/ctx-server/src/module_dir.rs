// module_dir.rs — Modules laid out as directories on disk.
//
// A module is a directory under the modules root; its name is the module id.
// Documents live under one subdirectory per namespace:
//
//   <modules_dir>/<module>/tags/*.json
//   <modules_dir>/<module>/conditions/**/*.json
//   <modules_dir>/<module>/goals/*.json
//   ...
//
// The document name is the file stem. Missing namespace directories simply
// contribute nothing; files that cannot be read are logged and skipped.

use std::path::{Path, PathBuf};

use ctx_definitions::{DefinitionDocument, DefinitionError, ModuleId, ModuleSource, Namespace};

use crate::error::ServerError;

/// A module backed by a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryModule {
    module_id: ModuleId,
    root: PathBuf,
}

impl DirectoryModule {
    /// Open the module at `root`; its id is the directory name.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, ServerError> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(ServerError::Module {
                path: root,
                reason: "not a directory".to_string(),
            });
        }
        let Some(name) = root.file_name().and_then(|n| n.to_str()) else {
            return Err(ServerError::Module {
                path: root,
                reason: "directory name is not valid UTF-8".to_string(),
            });
        };
        Ok(Self {
            module_id: ModuleId::new(name),
            root,
        })
    }

    /// Every module under `modules_dir`, ordered by id. A missing directory
    /// has no modules.
    pub fn discover(modules_dir: impl AsRef<Path>) -> Result<Vec<Self>, ServerError> {
        let modules_dir = modules_dir.as_ref();
        if !modules_dir.exists() {
            tracing::debug!("modules directory {} does not exist", modules_dir.display());
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(modules_dir).map_err(|source| ServerError::Io {
            path: modules_dir.to_path_buf(),
            source,
        })?;

        let mut modules = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ServerError::Io {
                path: modules_dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if path.is_dir() {
                modules.push(Self::open(path)?);
            }
        }
        modules.sort_by(|a, b| a.module_id.cmp(&b.module_id));
        Ok(modules)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn source_error(&self, namespace: Namespace, reason: impl ToString) -> DefinitionError {
        DefinitionError::Source {
            module_id: self.module_id.clone(),
            namespace,
            reason: reason.to_string(),
        }
    }
}

impl ModuleSource for DirectoryModule {
    fn module_id(&self) -> ModuleId {
        self.module_id.clone()
    }

    fn documents(&self, namespace: Namespace) -> Result<Vec<DefinitionDocument>, DefinitionError> {
        let dir = self.root.join(namespace.as_str());
        let pattern = format!("{}/**/*.json", glob::Pattern::escape(&dir.to_string_lossy()));
        let paths = glob::glob(&pattern).map_err(|e| self.source_error(namespace, e))?;

        let mut files = Vec::new();
        for entry in paths {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(e) => tracing::error!("skipping unreadable entry in module '{}': {}", self.module_id, e),
            }
        }
        files.sort();

        let mut documents = Vec::with_capacity(files.len());
        for path in files {
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::error!(
                        "skipping unreadable {} document {} in module '{}': {}",
                        namespace,
                        path.display(),
                        self.module_id,
                        e
                    );
                    continue;
                }
            };
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            tracing::debug!("found {} document {}", namespace, path.display());
            documents.push(DefinitionDocument::new(name, content).with_origin(path.display().to_string()));
        }
        Ok(documents)
    }
}
