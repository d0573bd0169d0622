use anyhow::Result;
use async_trait::async_trait;
use bincode::{deserialize, serialize};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use watch_sync_models::{IdMap, IdType};
use watch_sync_sources::IdMapStore;

/// Id maps persisted as gzip-compressed bincode.
///
/// Everything is held in memory and the whole file is rewritten on each
/// update.
pub struct FileIdMapStore {
    path: PathBuf,
    maps: RwLock<HashMap<String, IdMap>>,
}

impl FileIdMapStore {
    pub fn open(cache_id_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_id_dir)?;
        let path = cache_id_dir.join("id_maps.bin");
        let maps = load(&path)?;
        Ok(Self {
            path,
            maps: RwLock::new(maps),
        })
    }

    pub async fn len(&self) -> usize {
        self.maps.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.maps.read().await.is_empty()
    }
}

fn load(path: &Path) -> Result<HashMap<String, IdMap>> {
    if !path.exists() {
        debug!("Id map file does not exist, starting empty");
        return Ok(HashMap::new());
    }

    let start = std::time::Instant::now();
    let data = std::fs::read(path)?;
    let entries: Vec<IdMap> = match decode(&data) {
        Ok(entries) => entries,
        Err(e) => {
            let backup_path = path.with_extension("bin.bak");
            if let Err(backup_err) = std::fs::copy(path, &backup_path) {
                warn!(error = %backup_err, "Failed to back up unreadable id map file, starting empty");
            } else {
                info!(
                    error = %e,
                    backup = %backup_path.display(),
                    "Id map file unreadable, backed it up and starting empty"
                );
            }
            return Ok(HashMap::new());
        }
    };

    info!(entries = entries.len(), elapsed = ?start.elapsed(), "Loaded id maps");
    Ok(entries.into_iter().map(|m| (m.content_id.clone(), m)).collect())
}

fn decode(data: &[u8]) -> Result<Vec<IdMap>> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(deserialize(&decompressed)?)
}

fn encode(maps: &HashMap<String, IdMap>) -> Result<Vec<u8>> {
    let entries: Vec<&IdMap> = maps.values().collect();
    let serialized = serialize(&entries)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&serialized)?;
    Ok(encoder.finish()?)
}

async fn save(path: &Path, encoded: Vec<u8>) -> Result<()> {
    // Atomic write: temp file, then rename
    let temp_path = path.with_extension("tmp");
    tokio::fs::write(&temp_path, encoded).await?;
    tokio::fs::rename(&temp_path, path).await?;
    Ok(())
}

#[async_trait]
impl IdMapStore for FileIdMapStore {
    async fn get_id_maps(&self, content_ids: &[String]) -> Result<HashMap<String, IdMap>> {
        let maps = self.maps.read().await;
        Ok(content_ids
            .iter()
            .filter_map(|id| maps.get(id).map(|m| (id.clone(), m.clone())))
            .collect())
    }

    async fn set_id_maps(&self, new_maps: &[IdMap], anchor: IdType) -> Result<()> {
        if new_maps.is_empty() {
            return Ok(());
        }
        let mut maps = self.maps.write().await;
        for map in new_maps {
            maps.insert(map.content_id.clone(), map.clone());
        }
        // The write lock is held until the file is replaced
        save(&self.path, encode(&maps)?).await?;
        debug!(added = new_maps.len(), total = maps.len(), anchor = %anchor, "Saved id maps");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use watch_sync_models::ItemKind;

    #[tokio::test]
    async fn test_maps_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let store = FileIdMapStore::open(dir.path()).unwrap();
        assert!(store.is_empty().await);

        store
            .set_id_maps(
                &[IdMap::new("tt0111161", 234, ItemKind::Movie), IdMap::new("tt0944947", 1390, ItemKind::Show)],
                IdType::Imdb,
            )
            .await
            .unwrap();

        let reopened = FileIdMapStore::open(dir.path()).unwrap();
        assert_eq!(reopened.len().await, 2);
        let found = reopened
            .get_id_maps(&["tt0944947".to_string(), "tt9999999".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["tt0944947"].external_id, 1390);
        assert_eq!(found["tt0944947"].kind, ItemKind::Show);
    }

    #[tokio::test]
    async fn test_concurrent_saves_keep_every_map() {
        let dir = TempDir::new().unwrap();
        let store = FileIdMapStore::open(dir.path()).unwrap();

        let first = [IdMap::new("tt0111161", 234, ItemKind::Movie)];
        let second = [IdMap::new("tt0068646", 238, ItemKind::Movie)];
        let (a, b) = futures::join!(
            store.set_id_maps(&first, IdType::Imdb),
            store.set_id_maps(&second, IdType::Imdb)
        );
        a.unwrap();
        b.unwrap();

        assert!(!dir.path().join("id_maps.tmp").exists());
        let reopened = FileIdMapStore::open(dir.path()).unwrap();
        assert_eq!(reopened.len().await, 2);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_backed_up() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("id_maps.bin"), b"not gzip").unwrap();

        let store = FileIdMapStore::open(dir.path()).unwrap();
        assert!(store.is_empty().await);
        assert!(dir.path().join("id_maps.bin.bak").exists());
    }
}
