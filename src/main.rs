use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use contentport::archive::reader::StagedArchive;
use contentport::config::Settings;
use contentport::db::job_repository::MongoJobService;
use contentport::db::repository::MongoContentStore;
use contentport::db::session_repository::MongoSessionRepository;
use contentport::import::orchestrator::{ImportRequest, ImportResult, ImportService};
use contentport::notify::{MongoNotifier, Notifier, TracingNotifier};
use contentport::registry::ContentTypeRegistry;
use contentport::storage::client::S3BinaryStore;

#[derive(Parser)]
#[command(name = "contentport")]
#[command(about = "Import content archives into the content store")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "contentport.toml")]
    config: PathBuf,

    /// Write user notifications to the log instead of MongoDB
    #[arg(long)]
    log_notifications: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import an extracted archive
    Import {
        /// Staging directory holding documents.json and attachments.json
        archive: PathBuf,

        /// Raw upload to remove once the archive has been read
        #[arg(long)]
        upload: Option<PathBuf>,

        /// Content type the import is started from
        #[arg(short, long)]
        module: String,

        /// Requesting user (defaults to the configured recipient)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Overwrite confirmed duplicates of a pending import session
    Override {
        /// Session id reported by the import
        session: String,

        /// Logical ids of the documents to overwrite
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Close a pending import session and release its staging directory
    Close {
        /// Session id reported by the import
        session: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contentport=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(Some(&cli.config)).context("Failed to load settings")?;

    let mongo_client = mongodb::Client::with_uri_str(&settings.mongodb.uri)
        .await
        .context("Failed to connect to MongoDB")?;
    let db = mongo_client.database(&settings.mongodb.database);
    tracing::info!("Connected to MongoDB at {}", settings.mongodb.uri);

    let binaries = S3BinaryStore::connect(
        settings.storage.bucket.clone(),
        settings.storage.endpoint.as_deref(),
        settings.storage.prefix.clone(),
    )
    .await;
    tracing::info!("S3 binary store initialized");

    let content = MongoContentStore::new(&db).with_singleton_types(
        settings
            .types
            .iter()
            .filter(|(_, type_settings)| type_settings.singleton)
            .map(|(name, _)| name.clone()),
    );
    content
        .ensure_indexes()
        .await
        .context("Failed to create content indexes")?;
    let registry = ContentTypeRegistry::from_settings(&settings, Arc::new(content));

    let notifier: Arc<dyn Notifier> = if cli.log_notifications {
        Arc::new(TracingNotifier)
    } else {
        Arc::new(MongoNotifier::new(&db))
    };

    let service = ImportService {
        registry: Arc::new(registry),
        archives: Arc::new(StagedArchive),
        binaries: Arc::new(binaries),
        jobs: Arc::new(MongoJobService::new(&db)),
        notifier,
        sessions: Arc::new(MongoSessionRepository::new(&db)),
    };

    match cli.command {
        Commands::Import {
            archive,
            upload,
            module,
            user,
        } => {
            let request = ImportRequest {
                requester: user.or_else(|| Some(settings.notifications.recipient.clone())),
                archive_path: archive,
                upload_path: upload,
                module_name: module,
            };

            match service.import(request).await? {
                ImportResult::Completed(outcome) => {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                }
                ImportResult::PendingReview { session, .. } => {
                    println!("{}", serde_json::to_string_pretty(&session)?);
                }
            }
        }
        Commands::Override { session, ids } => {
            let report = service.resume_session(&session, ids).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Close { session } => {
            service.close_session(&session).await?;
            tracing::info!(%session, "Session closed");
        }
    }

    Ok(())
}
