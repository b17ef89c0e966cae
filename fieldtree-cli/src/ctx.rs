//! Invocation context: which files to work on and with which settings.

use std::path::{Path, PathBuf};

use fieldtree::FilePersistence;

use crate::{
    cli::Cli,
    config::{DEFAULT_CONFIG_PATH, EditorConfig},
};

/// Paths and settings for one invocation.
#[derive(Debug, Clone)]
pub struct AppContext {
    /// Document file.
    pub doc: PathBuf,
    /// Schema file.
    pub schema: PathBuf,
    /// Editor settings.
    pub config: EditorConfig,
}

/// Derive a default schema path from a document path: `post.json` becomes
/// `post-schema.json` in the same directory.
pub fn default_schema_by_doc(doc: &Path) -> PathBuf {
    let stem = doc
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = format!("{stem}-schema.json");
    match doc.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

impl AppContext {
    /// Resolve paths from the command line and load settings.
    pub async fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let Some(doc) = cli.doc.clone() else {
            bail!("--doc is required for this command");
        };
        let schema = cli
            .schema
            .clone()
            .unwrap_or_else(|| default_schema_by_doc(&doc));

        let config = match &cli.config {
            Some(path) => match EditorConfig::load(path).await? {
                Some(c) => c,
                None => bail!("Config file does not exist: {}", path.display()),
            },
            None => EditorConfig::load(Path::new(DEFAULT_CONFIG_PATH))
                .await?
                .unwrap_or_default(),
        };
        debug!("doc {}, schema {}", doc.display(), schema.display());

        Ok(AppContext {
            doc,
            schema,
            config,
        })
    }

    /// File persistence honoring the `backup` setting.
    pub fn persistence(&self) -> FilePersistence {
        FilePersistence::new().with_backup(self.config.backup)
    }

    pub fn doc_id(&self) -> String {
        self.doc.to_string_lossy().into_owned()
    }

    pub fn schema_id(&self) -> String {
        self.schema.to_string_lossy().into_owned()
    }
}
