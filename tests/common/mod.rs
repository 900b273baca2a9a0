#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use axum::{Router, http::header, routing::get};
use image::{DynamicImage, ImageFormat, RgbaImage};
use tempfile::TempDir;

use tryon_server::{
    error::PipelineError,
    faceswap::FaceSwapper,
    models::{CategorySelection, FaceSwapJob, FaceSwapStatus, GenerationItem},
    openai::ImageGenerator,
    pipeline::GenerationPipeline,
    storage::{
        ArtifactStore, Artifacts, Bucket, FileRecordStore, JsonCatalog, LocalFileStorage,
        RecordStore, StoredArtifact,
    },
};

pub fn png_bytes() -> Vec<u8> {
    let mut output = Vec::new();
    DynamicImage::ImageRgba8(RgbaImage::new(4, 4))
        .write_to(&mut std::io::Cursor::new(&mut output), ImageFormat::Png)
        .unwrap();
    output
}

/// Serves `/images/*` as PNG and `/broken` as HTML on an ephemeral port.
pub async fn spawn_image_host() -> String {
    let png = png_bytes();
    let app = Router::new()
        .route(
            "/images/{name}",
            get(move || {
                let png = png.clone();
                async move { ([(header::CONTENT_TYPE, "image/png")], png) }
            }),
        )
        .route(
            "/broken",
            get(|| async { ([(header::CONTENT_TYPE, "text/html")], "<html></html>") }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn selection(category: &str, item: &str, color: &str) -> CategorySelection {
    CategorySelection {
        category_id: category.into(),
        clothing_item_id: item.into(),
        color_name: color.into(),
    }
}

pub struct FakeGenerator {
    pub url: String,
    pub fail: bool,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn returning(url: String) -> Self {
        Self {
            url,
            fail: false,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageGenerator for FakeGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            return Err(PipelineError::upstream("image generator", "rate limited"));
        }
        Ok(self.url.clone())
    }
}

pub struct FakeSwapper {
    pub result_url: String,
    pub fail_await: bool,
    pub submits: AtomicUsize,
    pub awaits: AtomicUsize,
}

impl FakeSwapper {
    pub fn returning(result_url: String) -> Self {
        Self {
            result_url,
            fail_await: false,
            submits: AtomicUsize::new(0),
            awaits: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.submits.load(Ordering::SeqCst) + self.awaits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FaceSwapper for FakeSwapper {
    async fn submit(
        &self,
        target_image: &[u8],
        face_image: &[u8],
    ) -> Result<FaceSwapJob, PipelineError> {
        assert!(!target_image.is_empty());
        assert!(!face_image.is_empty());
        let n = self.submits.fetch_add(1, Ordering::SeqCst);
        Ok(FaceSwapJob::submitted(format!("job-{n}")))
    }

    async fn await_result(&self, job: &mut FaceSwapJob) -> Result<String, PipelineError> {
        self.awaits.fetch_add(1, Ordering::SeqCst);
        if self.fail_await {
            job.status = FaceSwapStatus::Failed;
            return Err(PipelineError::upstream("face swap", "job not complete"));
        }
        job.status = FaceSwapStatus::Completed;
        Ok(self.result_url.clone())
    }
}

/// Real artifact store that refuses to persist into one bucket.
pub struct FailingBucket {
    pub inner: ArtifactStore,
    pub bucket: Bucket,
}

#[async_trait]
impl Artifacts for FailingBucket {
    async fn persist_bytes(
        &self,
        bucket: Bucket,
        bytes: &[u8],
        declared_type: Option<&str>,
    ) -> Result<StoredArtifact, PipelineError> {
        if bucket == self.bucket {
            return Err(PipelineError::persistence("disk full"));
        }
        self.inner.persist_bytes(bucket, bytes, declared_type).await
    }

    async fn persist_remote(
        &self,
        bucket: Bucket,
        url: &str,
    ) -> Result<StoredArtifact, PipelineError> {
        if bucket == self.bucket {
            return Err(PipelineError::persistence("disk full"));
        }
        self.inner.persist_remote(bucket, url).await
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, PipelineError> {
        self.inner.read(key).await
    }
}

/// Record store whose writes always fail; reads go to the real store.
pub struct FailingRecords {
    pub inner: Arc<FileRecordStore>,
    pub inserts: AtomicUsize,
}

#[async_trait]
impl RecordStore for FailingRecords {
    async fn insert(&self, _item: &GenerationItem) -> Result<(), PipelineError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Err(PipelineError::persistence("record store unavailable"))
    }

    async fn list(
        &self,
        author_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<GenerationItem>, PipelineError> {
        self.inner.list(author_id, limit).await
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub storage: LocalFileStorage,
    pub artifacts: ArtifactStore,
    pub catalog: Arc<JsonCatalog>,
    pub records: Arc<FileRecordStore>,
    pub host: String,
}

impl Fixture {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path().to_path_buf(), "http://tryon.test/public".into());
        storage
            .put(
                "catalog/categories.json",
                br#"[{"id":"c1","name":"top"},{"id":"c2","name":"Bottom Layer"}]"#,
            )
            .await
            .unwrap();
        storage
            .put(
                "catalog/top_items.json",
                br#"[{"id":"i1","name":"V-Neck Sweater"},{"id":"i2","name":"Henley"}]"#,
            )
            .await
            .unwrap();
        storage
            .put(
                "catalog/bottom_layer_items.json",
                br#"[{"id":"b1","name":"Chinos","colors":["Khaki"]}]"#,
            )
            .await
            .unwrap();
        let artifacts = ArtifactStore::new(storage.clone(), reqwest::Client::new());
        Self {
            catalog: Arc::new(JsonCatalog::new(storage.clone())),
            records: Arc::new(FileRecordStore::new(storage.clone())),
            artifacts,
            storage,
            dir,
            host: spawn_image_host().await,
        }
    }

    pub async fn upload_face(&self) -> StoredArtifact {
        self.artifacts
            .persist_bytes(Bucket::Faces, &png_bytes(), Some("image/png"))
            .await
            .unwrap()
    }

    pub fn generator(&self) -> Arc<FakeGenerator> {
        Arc::new(FakeGenerator::returning(format!("{}/images/target.png", self.host)))
    }

    pub fn swapper(&self) -> Arc<FakeSwapper> {
        Arc::new(FakeSwapper::returning(format!("{}/images/result.png", self.host)))
    }

    pub fn pipeline(
        &self,
        generator: Arc<FakeGenerator>,
        swapper: Arc<FakeSwapper>,
        artifacts: Arc<dyn Artifacts>,
    ) -> GenerationPipeline {
        self.pipeline_with_records(generator, swapper, artifacts, self.records.clone())
    }

    pub fn pipeline_with_records(
        &self,
        generator: Arc<FakeGenerator>,
        swapper: Arc<FakeSwapper>,
        artifacts: Arc<dyn Artifacts>,
        records: Arc<dyn RecordStore>,
    ) -> GenerationPipeline {
        GenerationPipeline::new(self.catalog.clone(), generator, swapper, artifacts, records)
    }
}
