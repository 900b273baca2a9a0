use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::{fs, io::AsyncWriteExt};

/// Keyed blob store rooted at a directory, with keys mapped to public URLs.
#[derive(Clone, Debug)]
pub struct LocalFileStorage {
    base_dir: PathBuf,
    base_url: String,
}

impl LocalFileStorage {
    pub fn new(base_dir: PathBuf, base_url: String) -> Self {
        Self { base_dir, base_url }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve_path(key);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, data).await?;
        Ok(())
    }

    /// Like [`put`](Self::put) but fails if the key already exists.
    pub async fn put_new(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.resolve_path(key);
        match fs::metadata(path).await {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Keys of the files directly under `prefix`, sorted descending.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir_path = self.resolve_path(prefix);
        let mut dir = match fs::read_dir(&dir_path).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let prefix = prefix.trim_matches('/');
        let mut keys = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                keys.push(format!("{prefix}/{name}"));
            }
        }
        keys.sort_by(|a, b| b.cmp(a));
        Ok(keys)
    }

    pub fn get_public_url(&self, key: &str) -> String {
        let base = normalize_base_url(&self.base_url);
        let key = key.trim_start_matches('/');
        format!("{base}/{key}")
    }

    pub fn resolve_path(&self, key: &str) -> PathBuf {
        let normalized = key.trim_start_matches('/');
        self.base_dir.join(Path::new(normalized))
    }
}

/// Collapses doubled scheme prefixes (`http://https://host`) and trailing slashes.
pub fn normalize_base_url(raw: &str) -> String {
    let mut trimmed = raw.trim().trim_end_matches('/').to_string();
    loop {
        let collapsed = trimmed
            .replacen("http://http://", "http://", 1)
            .replacen("https://https://", "https://", 1)
            .replacen("http://https://", "https://", 1)
            .replacen("https://http://", "http://", 1);
        if collapsed == trimmed {
            return trimmed;
        }
        trimmed = collapsed;
    }
}
