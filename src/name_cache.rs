use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{info, warn};

/// File-backed username → display-name map. Keyword results key on the
/// author name recorded at index time; this maps those to current display
/// names for output.
pub struct NameCache {
    path: PathBuf,
    names: Mutex<HashMap<String, String>>,
}

impl NameCache {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let names = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<HashMap<String, String>>(&contents) {
                Ok(map) => {
                    info!("NameCache: loaded {} name mappings", map.len());
                    map
                }
                Err(e) => {
                    warn!("NameCache: ignoring unreadable cache file: {}", e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            names: Mutex::new(names),
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let names = self.names.lock().unwrap();
        let json = serde_json::to_string_pretty(&*names)?;
        std::fs::write(&self.path, json)?;
        info!("NameCache: saved {} name mappings", names.len());
        Ok(())
    }

    pub fn update(&self, username: &str, display_name: &str) {
        self.names
            .lock()
            .unwrap()
            .insert(username.to_string(), display_name.to_string());
    }

    /// Returns the username itself when no mapping exists.
    pub fn display_name(&self, username: &str) -> String {
        self.names
            .lock()
            .unwrap()
            .get(username)
            .cloned()
            .unwrap_or_else(|| username.to_string())
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        self.names.lock().unwrap().clear();
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
