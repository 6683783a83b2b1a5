//! Loading of models and textures from external files.
//!
//! Bytes come from an [`AssetSource`]: files under an asset root on native
//! targets, HTTP relative to the page origin on the web. Tests inject their
//! own sources. A model load reports its outcome as a [`LoadEvent`].

use std::{fmt, sync::Arc};

use anyhow::{Context, Result};
use futures::future;

use crate::{
    config::Variant,
    data_structures::{scene_graph::Node, texture::TextureSlot},
};

pub mod gltf;
pub mod obj;
pub mod texture;

#[cfg(not(target_arch = "wasm32"))]
mod maybe {
    pub trait MaybeSend: Send {}
    impl<T: Send + ?Sized> MaybeSend for T {}

    pub trait MaybeSendSync: Send + Sync {}
    impl<T: Send + Sync + ?Sized> MaybeSendSync for T {}

    pub type LoadFuture<'a, T> = futures::future::BoxFuture<'a, T>;
    pub type ProgressFn<'a> = &'a mut (dyn FnMut(super::Progress) + Send);
}

// Browser futures are tied to the JS thread and never cross threads.
#[cfg(target_arch = "wasm32")]
mod maybe {
    pub trait MaybeSend {}
    impl<T: ?Sized> MaybeSend for T {}

    pub trait MaybeSendSync {}
    impl<T: ?Sized> MaybeSendSync for T {}

    pub type LoadFuture<'a, T> = futures::future::LocalBoxFuture<'a, T>;
    pub type ProgressFn<'a> = &'a mut dyn FnMut(super::Progress);
}

pub use maybe::{LoadFuture, MaybeSend, MaybeSendSync, ProgressFn};

/// How far a fetch has come. `total` is unknown for some transports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    pub loaded: u64,
    pub total: Option<u64>,
}

impl Progress {
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => Some(self.loaded as f64 / total as f64 * 100.0),
            _ => None,
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percent() {
            Some(percent) => write!(f, "{percent:.0}% loaded"),
            None => write!(f, "{} bytes loaded", self.loaded),
        }
    }
}

/// Outcome of a model load, delivered back to the viewer.
#[derive(Debug)]
pub enum LoadEvent {
    Progress(Progress),
    Success(Node),
    Failure(anyhow::Error),
}

/// Where asset bytes come from.
pub trait AssetSource: MaybeSendSync {
    /// Reads the whole asset at `path`, reporting progress along the way.
    fn fetch<'a>(&'a self, path: &'a str, progress: ProgressFn<'a>)
    -> LoadFuture<'a, Result<Vec<u8>>>;
}

pub type SharedSource = Arc<dyn AssetSource>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelFormat {
    Glb,
    Obj,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelRequest {
    pub path: String,
    pub format: ModelFormat,
}

impl From<&Variant> for ModelRequest {
    fn from(variant: &Variant) -> Self {
        let format = match variant {
            Variant::Glb { .. } => ModelFormat::Glb,
            Variant::ObjTextured { .. } => ModelFormat::Obj,
        };
        Self {
            path: variant.model_path().to_string(),
            format,
        }
    }
}

/// A texture to fetch into an already handed-out slot.
#[derive(Clone, Debug)]
pub struct TextureRequest {
    pub path: String,
    pub slot: Arc<TextureSlot>,
}

/// Resolves `uri` relative to the directory of `path`.
pub(crate) fn sibling(path: &str, uri: &str) -> String {
    match path.rfind('/') {
        Some(idx) => format!("{}/{}", &path[..idx], uri),
        None => uri.to_string(),
    }
}

/// Fetches and parses one model.
pub async fn load_model<S>(
    source: &S,
    request: &ModelRequest,
    progress: ProgressFn<'_>,
) -> Result<Node>
where
    S: AssetSource + ?Sized,
{
    let bytes = source
        .fetch(&request.path, progress)
        .await
        .with_context(|| format!("failed to fetch model {}", request.path))?;
    let node = match request.format {
        ModelFormat::Glb => gltf::load_gltf(source, &request.path, &bytes).await,
        ModelFormat::Obj => obj::parse_obj(&request.path, &bytes),
    };
    node.with_context(|| format!("failed to parse model {}", request.path))
}

/// Runs a model load to completion and reports every step through `emit`.
///
/// Always ends with exactly one `Success` or `Failure`.
pub async fn run_model_load<S, F>(source: &S, request: &ModelRequest, mut emit: F)
where
    S: AssetSource + ?Sized,
    F: FnMut(LoadEvent) + MaybeSend,
{
    let result = load_model(source, request, &mut |progress| {
        emit(LoadEvent::Progress(progress))
    })
    .await;
    emit(match result {
        Ok(node) => LoadEvent::Success(node),
        Err(e) => LoadEvent::Failure(e),
    });
}

/// Fetches and decodes one texture into its slot.
pub async fn load_texture<S>(source: &S, request: &TextureRequest) -> Result<()>
where
    S: AssetSource + ?Sized,
{
    let bytes = source
        .fetch(&request.path, &mut |_| {})
        .await
        .with_context(|| format!("failed to fetch texture {}", request.path))?;
    let image = texture::decode(&bytes, None)
        .with_context(|| format!("failed to decode texture {}", request.path))?;
    request.slot.fill(image)
}

/// Reads files below a root directory.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Clone, Debug)]
pub struct FileSource {
    root: std::path::PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl FileSource {
    const CHUNK_SIZE: usize = 64 * 1024;

    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl AssetSource for FileSource {
    fn fetch<'a>(
        &'a self,
        path: &'a str,
        progress: ProgressFn<'a>,
    ) -> LoadFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            use tokio::io::AsyncReadExt;

            let path = self.root.join(path);
            let mut file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("cannot open {}", path.display()))?;
            let total = file.metadata().await.ok().map(|meta| meta.len());
            let mut data = Vec::with_capacity(total.unwrap_or(0) as usize);
            let mut chunk = vec![0u8; Self::CHUNK_SIZE];
            loop {
                let read = file.read(&mut chunk).await?;
                if read == 0 {
                    break;
                }
                data.extend_from_slice(&chunk[..read]);
                progress(Progress {
                    loaded: data.len() as u64,
                    total,
                });
            }
            Ok(data)
        })
    }
}

/// Fetches over HTTP relative to `<origin>/<root>/`.
#[cfg(target_arch = "wasm32")]
#[derive(Clone, Debug)]
pub struct HttpSource {
    base: reqwest::Url,
}

#[cfg(target_arch = "wasm32")]
impl HttpSource {
    pub fn from_location(root: &str) -> Result<Self> {
        let window = web_sys::window().context("no browser window")?;
        let origin = window
            .location()
            .origin()
            .map_err(|e| anyhow::anyhow!("cannot read page origin: {e:?}"))?;
        let root = root.trim_matches('/');
        let base = if root.is_empty() {
            format!("{origin}/")
        } else {
            format!("{origin}/{root}/")
        };
        Ok(Self {
            base: reqwest::Url::parse(&base)?,
        })
    }
}

#[cfg(target_arch = "wasm32")]
impl AssetSource for HttpSource {
    fn fetch<'a>(
        &'a self,
        path: &'a str,
        progress: ProgressFn<'a>,
    ) -> LoadFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            let url = self.base.join(path)?;
            let response = reqwest::get(url).await?.error_for_status()?;
            let total = response.content_length();
            let data = response.bytes().await?.to_vec();
            progress(Progress {
                loaded: data.len() as u64,
                total,
            });
            Ok(data)
        })
    }
}

/// The platform's default source for `root`.
pub fn default_source(root: &str) -> Result<SharedSource> {
    #[cfg(not(target_arch = "wasm32"))]
    let source: SharedSource = Arc::new(FileSource::new(root));
    #[cfg(target_arch = "wasm32")]
    let source: SharedSource = Arc::new(HttpSource::from_location(root)?);
    Ok(source)
}

/// Fetches several textures concurrently. Failures are logged per texture.
pub async fn load_textures<S>(source: &S, requests: &[TextureRequest])
where
    S: AssetSource + ?Sized,
{
    let loads = requests.iter().map(|request| async move {
        if let Err(e) = load_texture(source, request).await {
            log::error!("{e:?}");
        }
    });
    future::join_all(loads).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_reports_percent_when_total_known() {
        let progress = Progress {
            loaded: 50,
            total: Some(200),
        };
        assert_eq!(progress.percent(), Some(25.0));
        assert_eq!(progress.to_string(), "25% loaded");
    }

    #[test]
    fn progress_without_total_reports_bytes() {
        let unknown = Progress {
            loaded: 1024,
            total: None,
        };
        let empty = Progress {
            loaded: 0,
            total: Some(0),
        };
        assert_eq!(unknown.percent(), None);
        assert_eq!(unknown.to_string(), "1024 bytes loaded");
        assert_eq!(empty.percent(), None);
    }

    #[test]
    fn siblings_resolve_next_to_the_model() {
        assert_eq!(sibling("models/ship.gltf", "ship.bin"), "models/ship.bin");
        assert_eq!(sibling("ship.gltf", "ship.bin"), "ship.bin");
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn file_source_reads_with_progress() {
        let dir = std::env::temp_dir().join(format!("view-ngin-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("blob.bin"), vec![7u8; 100_000]).unwrap();

        let source = FileSource::new(&dir);
        let mut reports = Vec::new();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let data = runtime
            .block_on(source.fetch("blob.bin", &mut |p| reports.push(p)))
            .unwrap();

        assert_eq!(data.len(), 100_000);
        assert!(reports.len() >= 2);
        assert_eq!(
            reports.last(),
            Some(&Progress {
                loaded: 100_000,
                total: Some(100_000)
            })
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn missing_file_is_an_error() {
        let source = FileSource::new("/definitely/not/here");
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let result = runtime.block_on(source.fetch("model.glb", &mut |_| {}));
        assert!(result.is_err());
    }
}
