#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use butler_core::domain::file::{FileRecord, NewFile};
use butler_core::domain::run::Owner;
use butler_engine::config::StorageLayout;
use butler_engine::executor::{ExecutionOutput, RemoteChannel, TransportError};
use butler_engine::ingest::{FormatDatabase, FormatSniffer, Ingestor, SniffedFormat};
use butler_engine::queue::{SqliteTaskQueue, TaskQueue};
use butler_engine::repository::file_repository;
use butler_engine::service::{CompletionHandler, DefinitionStore, Dispatcher, RunService};
use butler_engine::{EngineError, Result, db};
use sqlx::SqlitePool;
use tempfile::TempDir;

pub struct Harness {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub layout: StorageLayout,
    pub definitions: DefinitionStore,
    pub queue: Arc<dyn TaskQueue>,
    pub runs: RunService,
    pub completion: CompletionHandler,
}

pub async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::rooted_at(dir.path());
    std::fs::create_dir_all(&layout.local_data_root).unwrap();
    std::fs::create_dir_all(&layout.pipelines_folder).unwrap();
    std::fs::create_dir_all(&layout.plots_folder).unwrap();

    let url = format!("sqlite://{}", dir.path().join("catalog.db").display());
    let pool = db::create_pool(&url).await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let definitions = DefinitionStore::new(pool.clone(), layout.clone());
    let queue: Arc<dyn TaskQueue> = Arc::new(SqliteTaskQueue::new(pool.clone()));
    let runs = RunService::new(
        pool.clone(),
        layout.clone(),
        definitions.clone(),
        Dispatcher::new(Arc::clone(&queue)),
    );
    let ingestor = Ingestor::new(
        Arc::new(StubSniffer),
        Arc::new(FormatDatabase::from_json(r#"{"ASCII text": "txt"}"#).unwrap()),
    );
    let completion = CompletionHandler::new(pool.clone(), layout.clone(), ingestor);

    Harness {
        dir,
        pool,
        layout,
        definitions,
        queue,
        runs,
        completion,
    }
}

impl Harness {
    pub fn write_pipeline(&self, uid: &str, definition: serde_json::Value) {
        let folder = self.layout.pipelines_folder.join(uid);
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(
            folder.join(format!("{uid}.json")),
            serde_json::to_vec_pretty(&definition).unwrap(),
        )
        .unwrap();
    }

    pub fn write_plot(&self, uid: &str, definition: serde_json::Value) {
        std::fs::write(
            self.layout.plots_folder.join(format!("{uid}.json")),
            serde_json::to_vec_pretty(&definition).unwrap(),
        )
        .unwrap();
    }

    /// Catalogues an uploaded file at `path` (relative to the data root)
    pub async fn upload(&self, owner: &Owner, path: &str) -> FileRecord {
        let local = self.layout.local_data_root.join(path);
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();
        std::fs::write(&local, "ACGT").unwrap();

        let mut conn = self.pool.acquire().await.unwrap();
        file_repository::insert(
            &mut conn,
            &NewFile {
                owner: owner.clone(),
                name: path.rsplit('/').next().unwrap().to_string(),
                path: path.to_string(),
                size_in_bytes: 4,
                mime_type: "text/plain".to_string(),
                file_format: "txt".to_string(),
                file_format_full: "ASCII text".to_string(),
                is_upload: true,
            },
        )
        .await
        .unwrap()
    }

    pub async fn count(&self, table: &str) -> i64 {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .unwrap();
        count
    }
}

/// The `align` pipeline: one file input, one output named `result.txt`
pub fn align_pipeline() -> serde_json::Value {
    serde_json::json!({
        "uid": "align",
        "filename": "align.sh",
        "name": "Align reads",
        "description": "Aligns reads against a reference",
        "executor": "sh",
        "command": "$input $output",
        "inputs": [
            {"name": "input", "label": "Reads", "type": "file", "required": true}
        ],
        "outputs": [
            {"name": "output", "label": "Result", "type": "file", "value": "result.txt"}
        ]
    })
}

pub struct StubSniffer;

impl FormatSniffer for StubSniffer {
    fn sniff(&self, _path: &Path) -> Result<SniffedFormat> {
        Ok(SniffedFormat {
            mime_type: "text/plain".to_string(),
            description: "ASCII text".to_string(),
        })
    }
}

/// Sniffer for a host where format detection is broken
pub struct FailingSniffer;

impl FormatSniffer for FailingSniffer {
    fn sniff(&self, path: &Path) -> Result<SniffedFormat> {
        Err(EngineError::Sniff {
            path: path.display().to_string(),
            reason: "file: command not found".to_string(),
        })
    }
}

/// Completion handler over the harness catalog using `sniffer`
pub fn completion_with(h: &Harness, sniffer: Arc<dyn FormatSniffer>) -> CompletionHandler {
    let ingestor = Ingestor::new(sniffer, Arc::new(FormatDatabase::default()));
    CompletionHandler::new(h.pool.clone(), h.layout.clone(), ingestor)
}

/// The `pca` plot: one file input, output declared with `output_file_name`
pub fn pca_plot() -> serde_json::Value {
    serde_json::json!({
        "uid": "pca",
        "filename": "pca.R",
        "name": "PCA plot",
        "executor": "Rscript",
        "command": "$counts $output_file",
        "inputs": [
            {"name": "counts", "label": "Count table", "type": "file", "required": true}
        ],
        "output_file_name": "pca.png"
    })
}

/// Channel that plays a compute host: it enters the folder the command
/// `cd`s into, writes the configured files there and exits with `exit_code`
pub struct FakeChannel {
    pub exit_code: i32,
    pub files: Vec<(&'static str, &'static str)>,
    pub stdout: &'static str,
    pub stderr: &'static str,
    pub unreachable: bool,
    pub commands: Mutex<Vec<String>>,
}

impl FakeChannel {
    pub fn succeeding(files: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            exit_code: 0,
            files,
            stdout: "aligned\n",
            stderr: "",
            unreachable: false,
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(exit_code: i32, stdout: &'static str, stderr: &'static str) -> Self {
        Self {
            exit_code,
            files: vec![("partial.txt", "half")],
            stdout,
            stderr,
            unreachable: false,
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::succeeding(Vec::new())
        }
    }
}

impl RemoteChannel for FakeChannel {
    fn execute(&self, command: &str) -> std::result::Result<ExecutionOutput, TransportError> {
        self.commands.lock().unwrap().push(command.to_string());

        if self.unreachable {
            return Err(TransportError::Connect {
                host: "compute-01".to_string(),
                message: "Connection refused".to_string(),
            });
        }

        let dir = command
            .strip_prefix("cd ")
            .and_then(|rest| rest.split(';').next())
            .expect("command starts with cd <dir>;");
        for (name, content) in &self.files {
            let path = Path::new(dir).join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }

        Ok(ExecutionOutput {
            exit_code: self.exit_code,
            stdout: self.stdout.to_string(),
            stderr: self.stderr.to_string(),
        })
    }
}
