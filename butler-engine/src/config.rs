//! Engine configuration
//!
//! Defines the storage layout shared by the orchestrator and the runner, the
//! catalog database location and the remote execution channel settings.
//!
//! Two roots describe the same data tree: `data_storage` is the path as seen
//! by the compute host (used inside commands) and `local_data_root` is where
//! this process reaches it (used to create run folders and walk outputs).

use std::path::{Path, PathBuf};

use butler_core::domain::definition::{Definition, DefinitionKind};
use butler_core::domain::run::{Owner, RunKind};

use crate::error::{EngineError, Result};

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Catalog database URL (e.g., "sqlite://butler.db")
    pub database_url: String,

    /// Filesystem layout of definitions, scripts and run folders
    pub layout: StorageLayout,

    /// JSON file mapping format description regexes to short format names
    pub file_formats: Option<PathBuf>,

    /// Extra magic database handed to `file` when describing outputs
    pub magic_file: Option<PathBuf>,

    /// How commands reach the compute host
    pub channel: ChannelConfig,
}

/// Filesystem layout
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Local folder holding `<uid>/<uid>.json` pipeline definitions
    pub pipelines_folder: PathBuf,
    /// Local folder holding `<uid>.json` plot definitions
    pub plots_folder: PathBuf,
    /// Pipeline scripts root on the compute host
    pub pipelines_storage: String,
    /// Plot scripts root on the compute host
    pub plots_storage: String,
    /// Data root on the compute host
    pub data_storage: String,
    /// Data root as mounted locally
    pub local_data_root: PathBuf,
    /// Per-owner subfolder holding analysis run folders
    pub analyses_folder: String,
    /// Per-owner subfolder holding visualization run folders
    pub visualizations_folder: String,
}

/// Remote execution channel settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelConfig {
    /// Commands are sent over the system ssh client
    Ssh(SshConfig),
    /// Commands run through `sh -c` on this host
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Private key used as the credential; the ssh agent is used when absent
    pub identity_file: Option<PathBuf>,
}

impl EngineConfig {
    /// Creates configuration from environment variables
    ///
    /// Every variable is optional and falls back to the defaults:
    /// - DATABASE_URL (default: sqlite://butler.db)
    /// - PIPELINES_FOLDER, PLOTS_FOLDER (local definition catalogs)
    /// - PIPELINES_STORAGE, PLOTS_STORAGE (script roots on the compute host)
    /// - DATA_STORAGE (data root on the compute host)
    /// - SYMLINK_TO_DATA_STORAGE (data root as mounted locally)
    /// - ANALYSES_FOLDER, VISUALIZATIONS_FOLDER
    /// - FILE_FORMATS (format database JSON)
    /// - BIOINFO_MAGIC_FILE (extra magic database for format detection)
    /// - EXECUTION_CHANNEL (`ssh` or `local`; `ssh` when COMPUTING_SERVER_IP is set)
    /// - COMPUTING_SERVER_IP, COMPUTING_SERVER_PORT (default: 22),
    ///   COMPUTING_SERVER_USER, COMPUTING_SERVER_IDENTITY_FILE
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let layout = StorageLayout {
            pipelines_folder: env_path("PIPELINES_FOLDER")
                .unwrap_or(defaults.layout.pipelines_folder),
            plots_folder: env_path("PLOTS_FOLDER").unwrap_or(defaults.layout.plots_folder),
            pipelines_storage: env_string("PIPELINES_STORAGE")
                .unwrap_or(defaults.layout.pipelines_storage),
            plots_storage: env_string("PLOTS_STORAGE").unwrap_or(defaults.layout.plots_storage),
            data_storage: env_string("DATA_STORAGE").unwrap_or(defaults.layout.data_storage),
            local_data_root: env_path("SYMLINK_TO_DATA_STORAGE")
                .unwrap_or(defaults.layout.local_data_root),
            analyses_folder: env_string("ANALYSES_FOLDER")
                .unwrap_or(defaults.layout.analyses_folder),
            visualizations_folder: env_string("VISUALIZATIONS_FOLDER")
                .unwrap_or(defaults.layout.visualizations_folder),
        };

        let host = env_string("COMPUTING_SERVER_IP");
        let channel_name = env_string("EXECUTION_CHANNEL").unwrap_or_else(|| {
            if host.is_some() { "ssh" } else { "local" }.to_string()
        });

        let channel = match channel_name.as_str() {
            "local" => ChannelConfig::Local,
            "ssh" => {
                let port = match env_string("COMPUTING_SERVER_PORT") {
                    Some(raw) => raw.parse::<u16>().map_err(|_| {
                        EngineError::Config(format!("COMPUTING_SERVER_PORT is not a port: {raw}"))
                    })?,
                    None => 22,
                };
                ChannelConfig::Ssh(SshConfig {
                    host: host.ok_or_else(|| {
                        EngineError::Config("COMPUTING_SERVER_IP is not set".to_string())
                    })?,
                    port,
                    username: env_string("COMPUTING_SERVER_USER").ok_or_else(|| {
                        EngineError::Config("COMPUTING_SERVER_USER is not set".to_string())
                    })?,
                    identity_file: env_path("COMPUTING_SERVER_IDENTITY_FILE"),
                })
            }
            other => {
                return Err(EngineError::Config(format!(
                    "EXECUTION_CHANNEL must be 'ssh' or 'local', got '{other}'"
                )));
            }
        };

        Ok(Self {
            database_url: env_string("DATABASE_URL").unwrap_or(defaults.database_url),
            layout,
            file_formats: env_path("FILE_FORMATS"),
            magic_file: env_path("BIOINFO_MAGIC_FILE"),
            channel,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.database_url.is_empty() {
            return Err(EngineError::Config("database_url cannot be empty".to_string()));
        }

        if !self.database_url.starts_with("sqlite:") {
            return Err(EngineError::Config(
                "database_url must be a sqlite: URL".to_string(),
            ));
        }

        self.layout.validate()?;

        if let ChannelConfig::Ssh(ssh) = &self.channel {
            if ssh.host.is_empty() {
                return Err(EngineError::Config("ssh host cannot be empty".to_string()));
            }
            if ssh.username.is_empty() {
                return Err(EngineError::Config(
                    "ssh username cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://butler.db".to_string(),
            layout: StorageLayout::default(),
            file_formats: None,
            magic_file: None,
            channel: ChannelConfig::Local,
        }
    }
}

impl StorageLayout {
    /// Lays everything out under a single local directory, with the compute
    /// host seeing the same paths. Used for single-host setups and tests.
    pub fn rooted_at(root: &Path) -> Self {
        let data = root.join("data");
        Self {
            pipelines_folder: root.join("pipelines"),
            plots_folder: root.join("plots"),
            pipelines_storage: root.join("pipelines").display().to_string(),
            plots_storage: root.join("plots").display().to_string(),
            data_storage: data.display().to_string(),
            local_data_root: data,
            analyses_folder: "analyses".to_string(),
            visualizations_folder: "visualizations".to_string(),
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("analyses_folder", &self.analyses_folder),
            ("visualizations_folder", &self.visualizations_folder),
        ] {
            if value.is_empty() || value.contains('/') || value == ".." {
                return Err(EngineError::Config(format!(
                    "{name} must be a single folder name"
                )));
            }
        }

        if self.data_storage.is_empty() {
            return Err(EngineError::Config("data_storage cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Local path of a definition file
    pub fn definition_path(&self, kind: DefinitionKind, uid: &str) -> Result<PathBuf> {
        check_segment(uid)?;
        let file_name = format!("{uid}.json");
        Ok(match kind {
            DefinitionKind::Pipeline => self.pipelines_folder.join(uid).join(file_name),
            DefinitionKind::Plot => self.plots_folder.join(file_name),
        })
    }

    /// Script path of a definition on the compute host
    pub fn script_path(&self, definition: &Definition) -> String {
        match definition.kind {
            DefinitionKind::Pipeline => join_remote(
                &join_remote(&self.pipelines_storage, &definition.uid),
                &definition.filename,
            ),
            DefinitionKind::Plot => join_remote(&self.plots_storage, &definition.filename),
        }
    }

    /// Run folder relative to the data root
    pub fn run_relative_dir(&self, owner: &Owner, kind: RunKind, run_id: i64) -> Result<String> {
        check_segment(&owner.storage_key)?;
        let folder = match kind {
            RunKind::Analysis => &self.analyses_folder,
            RunKind::Visualization => &self.visualizations_folder,
        };
        Ok(format!("{}/{}/{}", owner.storage_key, folder, run_id))
    }

    /// Run folder as seen by the compute host
    pub fn remote_run_dir(&self, owner: &Owner, kind: RunKind, run_id: i64) -> Result<String> {
        Ok(join_remote(
            &self.data_storage,
            &self.run_relative_dir(owner, kind, run_id)?,
        ))
    }

    /// Run folder as reached from this process
    pub fn local_run_dir(&self, owner: &Owner, kind: RunKind, run_id: i64) -> Result<PathBuf> {
        Ok(self
            .local_data_root
            .join(self.run_relative_dir(owner, kind, run_id)?))
    }

    /// Catalog file path as seen by the compute host
    pub fn remote_file_path(&self, catalog_path: &str) -> String {
        join_remote(&self.data_storage, catalog_path)
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            pipelines_folder: PathBuf::from("./pipelines"),
            plots_folder: PathBuf::from("./plots"),
            pipelines_storage: "/opt/butler/pipelines".to_string(),
            plots_storage: "/opt/butler/plots".to_string(),
            data_storage: "/data".to_string(),
            local_data_root: PathBuf::from("./data"),
            analyses_folder: "analyses".to_string(),
            visualizations_folder: "visualizations".to_string(),
        }
    }
}

/// Joins POSIX paths for the compute host; absolute `rel` paths win
pub fn join_remote(root: &str, rel: &str) -> String {
    if rel.starts_with('/') {
        return rel.to_string();
    }
    format!("{}/{}", root.trim_end_matches('/'), rel)
}

/// Rejects identifiers that are not a single, plain path segment
pub fn check_segment(segment: &str) -> Result<()> {
    if segment.is_empty()
        || segment.starts_with('.')
        || segment.contains('/')
        || segment.contains('\\')
        || segment.contains('\0')
    {
        return Err(EngineError::InvalidIdentifier(segment.to_string()));
    }
    Ok(())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env_string(key).map(PathBuf::from)
}
