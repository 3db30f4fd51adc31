//! On-disk shader store: one wrapped JSON document per shader under a root
//! directory, named `<id>.json`.
//!
//! `ShaderStore::get` is the lookup the renderer host consumes; `import`,
//! `list` and `remove` give the CLI enough CRUD to feed it.
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::description::ShaderDescription;
use crate::document::{normalize, ShaderDocument};
use crate::error::{DocumentError, StoreError};

const CLONED_AT_FIELD: &str = "_clonedAt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShaderSummary {
    pub id: String,
    pub name: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub multipass: bool,
    pub channel_kinds: Vec<String>,
    pub cloned_at: Option<String>,
}

impl ShaderSummary {
    fn from_document(document: &ShaderDocument) -> Result<Self, DocumentError> {
        let description = document.description()?;
        let cloned_at = document
            .shader()
            .get(CLONED_AT_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self::from_description(&description, cloned_at))
    }

    fn from_description(description: &ShaderDescription, cloned_at: Option<String>) -> Self {
        let channel_kinds: BTreeSet<&str> = description
            .passes
            .iter()
            .flat_map(|pass| pass.inputs.iter())
            .map(|binding| binding.input.kind_label())
            .collect();
        Self {
            id: description.info.id.clone(),
            name: description.info.name.clone(),
            author: description.info.author.clone(),
            description: description.info.description.clone(),
            multipass: description.is_multipass(),
            channel_kinds: channel_kinds.into_iter().map(str::to_string).collect(),
            cloned_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShaderStore {
    root: PathBuf,
}

impl ShaderStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn document_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        validate_id(id)?;
        Ok(self.root.join(format!("{id}.json")))
    }

    pub fn get_document(&self, id: &str) -> Result<ShaderDocument, StoreError> {
        let path = self.document_path(id)?;
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()))
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        debug!(id, path = %path.display(), "loading stored shader");
        serde_json::from_str(&contents)
            .map_err(DocumentError::from)
            .and_then(normalize)
            .map_err(|source| StoreError::Document { path, source })
    }

    pub fn get(&self, id: &str) -> Result<ShaderDescription, StoreError> {
        let document = self.get_document(id)?;
        let path = self.document_path(id)?;
        document
            .description()
            .map_err(|source| StoreError::Document { path, source })
    }

    /// Summaries of every readable document, newest import first.
    pub fn list(&self) -> Result<Vec<ShaderSummary>, StoreError> {
        let entries = fs::read_dir(&self.root).map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })?;
        let mut summaries = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: self.root.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match self
                .get_document(id)
                .and_then(|doc| ShaderSummary::from_document(&doc).map_err(StoreError::from))
            {
                Ok(summary) => summaries.push(summary),
                Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable shader"),
            }
        }
        summaries.sort_by(|a, b| {
            b.cloned_at
                .cmp(&a.cloned_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(summaries)
    }

    /// Normalizes `raw`, stamps the import time and writes the wrapped form.
    pub fn import(&self, raw: Value) -> Result<ShaderSummary, StoreError> {
        let mut document = normalize(raw)?;
        let id = document
            .id()
            .ok_or(DocumentError::MissingId)?
            .to_string();
        let path = self.document_path(&id)?;
        // Fail on documents the renderer could not lower before touching disk.
        let description = document.description()?;

        let cloned_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        if let Some(object) = document.shader_mut().as_object_mut() {
            object.insert(CLONED_AT_FIELD.to_string(), Value::String(cloned_at.clone()));
        }
        let serialized = serde_json::to_string_pretty(&document.into_wrapped())
            .map_err(DocumentError::from)?;
        fs::write(&path, serialized).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(id, path = %path.display(), "imported shader");
        Ok(ShaderSummary::from_description(&description, Some(cloned_at)))
    }

    /// Returns `false` when no document existed for `id`.
    pub fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let path = self.document_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

fn validate_id(id: &str) -> Result<(), StoreError> {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample(id: &str, buffer: bool) -> Value {
        let mut passes = vec![json!({
            "name": "Image",
            "type": "image",
            "code": "void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }",
            "inputs": [ { "id": 1, "src": "/media/a/tex.png", "ctype": "texture", "channel": 0 } ],
            "outputs": []
        })];
        if buffer {
            passes.insert(
                0,
                json!({ "name": "Buffer A", "type": "buffer", "code": "", "inputs": [],
                        "outputs": [ { "id": 257, "channel": 0 } ] }),
            );
        }
        json!({ "ver": "0.1", "info": { "id": id, "name": format!("shader {id}"), "username": "me" },
                "renderpass": passes })
    }

    #[test]
    fn import_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = ShaderStore::open(dir.path().join("shaders")).unwrap();

        let summary = store.import(sample("abc123", true)).unwrap();
        assert_eq!(summary.id, "abc123");
        assert!(summary.multipass);
        assert_eq!(summary.channel_kinds, vec!["texture".to_string()]);

        let stored = fs::read_to_string(store.root().join("abc123.json")).unwrap();
        let value: Value = serde_json::from_str(&stored).unwrap();
        assert!(value["Shader"][CLONED_AT_FIELD].is_string());

        let description = store.get("abc123").unwrap();
        assert_eq!(description.info.author.as_deref(), Some("me"));
        assert_eq!(description.passes.len(), 2);
    }

    #[test]
    fn missing_and_invalid_ids_are_reported() {
        let dir = TempDir::new().unwrap();
        let store = ShaderStore::open(dir.path()).unwrap();
        assert!(matches!(store.get("nope"), Err(StoreError::NotFound(id)) if id == "nope"));
        assert!(matches!(
            store.get("../etc/passwd"),
            Err(StoreError::InvalidId(_))
        ));
        let err = store
            .import(json!({ "info": { "name": "x" }, "renderpass": [] }))
            .unwrap_err();
        assert!(matches!(err, StoreError::Import(DocumentError::MissingId)));
    }

    #[test]
    fn list_skips_garbage_and_remove_deletes() {
        let dir = TempDir::new().unwrap();
        let store = ShaderStore::open(dir.path()).unwrap();
        store.import(sample("first", false)).unwrap();
        store.import(sample("second", true)).unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let listed = store.list().unwrap();
        let ids: BTreeSet<_> = listed.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, BTreeSet::from(["first", "second"]));

        assert!(store.remove("first").unwrap());
        assert!(!store.remove("first").unwrap());
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
