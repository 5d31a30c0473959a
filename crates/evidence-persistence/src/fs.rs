//! Backend de filesystem: cada clave es una ruta relativa bajo `root`.
//!
//! Las escrituras van a un fichero temporal oculto en el mismo directorio y
//! se renombran sobre el destino, así un lector concurrente ve el objeto
//! anterior o el nuevo, nunca uno a medias. El content type no se guarda.

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use evidence_core::{ObjectStore, StoreError};
use log::debug;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let valid = !key.is_empty() && relative.components().all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StoreError::Backend(format!("invalid object key: {key:?}")));
        }
        Ok(self.root.join(relative))
    }
}

fn io_err(key: &str) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io { key: key.to_string(),
                                   source }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, key: &str, body: &[u8], _content_type: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir).map_err(io_err(key))?;

        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("object");
        let tmp = dir.join(format!(".{file_name}.{}.{}.tmp",
                                   std::process::id(),
                                   TMP_COUNTER.fetch_add(1, Ordering::Relaxed)));
        let written = fs::File::create(&tmp).and_then(|mut f| {
                                                 f.write_all(body)?;
                                                 f.sync_all()
                                             })
                                             .and_then(|_| fs::rename(&tmp, &path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(key)(e));
        }
        debug!("put:done path={} bytes={}", path.display(), body.len());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(key)(e)),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        // sólo se recorre el directorio más profundo que fija el prefijo
        let dir_part = prefix.rfind('/').map(|i| &prefix[..i]).unwrap_or("");
        let start = if dir_part.is_empty() { self.root.clone() } else { self.path_for(dir_part)? };
        let mut keys = Vec::new();
        walk(&start, dir_part, &mut keys).map_err(io_err(prefix))?;
        keys.retain(|k| k.starts_with(prefix));
        Ok(keys)
    }
}

fn walk(dir: &Path, key_prefix: &str, out: &mut Vec<String>) -> std::io::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let key = if key_prefix.is_empty() { name } else { format!("{key_prefix}/{name}") };
        if entry.file_type()?.is_dir() {
            walk(&entry.path(), &key, out)?;
        } else {
            out.push(key);
        }
    }
    Ok(())
}
