use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::{scene::SceneDescriptor, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Texture,
    Hdr,
    Font,
    Model,
}

impl AssetKind {
    /// Guesses the kind from a URL's extension.
    pub fn from_url(url: &str) -> Option<Self> {
        let extension = Path::new(url).extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "png" | "jpg" | "jpeg" | "webp" | "ktx2" => Some(Self::Texture),
            "hdr" | "exr" => Some(Self::Hdr),
            "ttf" | "otf" | "woff" | "woff2" => Some(Self::Font),
            "stl" | "glb" | "gltf" | "obj" => Some(Self::Model),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Ready(AssetKind),
    Missing,
}

impl AssetStatus {
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Lookup results for everything a scene references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneAssets {
    pub texture: Option<AssetStatus>,
    pub environment: Option<AssetStatus>,
    pub model: Option<AssetStatus>,
}

impl SceneAssets {
    /// Whether the mesh can be drawn with its texture.
    pub fn textured(&self) -> bool {
        self.texture.is_some_and(AssetStatus::is_ready)
    }
}

/// Registry of static assets, keyed by URL.
///
/// Lookups never fail: a missing asset resolves to [`AssetStatus::Missing`]
/// and renderers fall back to untextured output.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AssetStore {
    assets: HashMap<String, AssetKind>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, url: impl Into<String>, kind: AssetKind) {
        self.assets.insert(url.into(), kind);
    }

    /// Registers every file under `root` whose extension names a known kind,
    /// keyed by its path relative to `root` with `/` separators.
    pub fn scan_dir(&mut self, root: &Path) -> Result<usize> {
        let mut found = 0;
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(root) else {
                    continue;
                };
                let url = relative
                    .components()
                    .map(|part| part.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if let Some(kind) = AssetKind::from_url(&url) {
                    self.register(url, kind);
                    found += 1;
                }
            }
        }
        tracing::debug!(root = %root.display(), found, "asset directory scanned");
        Ok(found)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn resolve(&self, url: &str) -> AssetStatus {
        match self.assets.get(url) {
            Some(kind) => AssetStatus::Ready(*kind),
            None => {
                tracing::warn!(url, "asset missing, rendering without it");
                AssetStatus::Missing
            }
        }
    }

    pub fn resolve_scene_assets(&self, scene: &SceneDescriptor) -> SceneAssets {
        let model = match &scene.mesh {
            crate::scene::MeshKind::Stl { asset } => Some(self.resolve(asset)),
            _ => None,
        };
        SceneAssets {
            texture: scene.texture.as_deref().map(|url| self.resolve(url)),
            environment: scene.environment.as_deref().map(|url| self.resolve(url)),
            model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{MeshKind, SceneDescriptor};

    #[test]
    fn resolves_registered_assets() {
        let mut store = AssetStore::new();
        store.register("textures/relic-albedo.png", AssetKind::Texture);
        store.register("hdr/vault.hdr", AssetKind::Hdr);

        let assets = store.resolve_scene_assets(&SceneDescriptor::reveal_viewer());
        assert!(assets.textured());
        assert_eq!(assets.environment, Some(AssetStatus::Ready(AssetKind::Hdr)));
        assert_eq!(assets.model, None);
    }

    #[test]
    fn missing_assets_fall_back_instead_of_failing() {
        let store = AssetStore::new();
        let scene = SceneDescriptor {
            mesh: MeshKind::Stl {
                asset: "models/missing.stl".to_string(),
            },
            ..SceneDescriptor::reveal_viewer()
        };

        let assets = store.resolve_scene_assets(&scene);
        assert!(!assets.textured());
        assert_eq!(assets.model, Some(AssetStatus::Missing));
    }

    #[test]
    fn kinds_follow_extensions() {
        assert_eq!(AssetKind::from_url("a/b/C.PNG"), Some(AssetKind::Texture));
        assert_eq!(AssetKind::from_url("fonts/title.woff2"), Some(AssetKind::Font));
        assert_eq!(AssetKind::from_url("readme"), None);
    }

    #[test]
    fn scans_a_directory_tree() {
        let root = std::env::temp_dir().join(format!("reveal-assets-{}", std::process::id()));
        std::fs::create_dir_all(root.join("textures")).unwrap();
        std::fs::write(root.join("textures/gem.png"), b"").unwrap();
        std::fs::write(root.join("notes.txt"), b"").unwrap();

        let mut store = AssetStore::new();
        assert_eq!(store.scan_dir(&root).unwrap(), 1);
        assert!(store.resolve("textures/gem.png").is_ready());

        std::fs::remove_dir_all(&root).unwrap();
    }
}
