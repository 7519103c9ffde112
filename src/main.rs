//! Misinfo CLI - post store, dataset imports and report reconciliation

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use chrono::Utc;
use misinfo::config::{self, MisinfoConfig};
use misinfo::import::csv_records;
use misinfo::queue::redis::StreamsConfig;
use misinfo::queue::{QueueBridge, RedisBroker};
use misinfo::ui::{self, Icons};
use misinfo::{BulkImporter, Post, ReportReconciler, SqliteStore};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

/// Upper bound on `posts --size`
const MAX_PAGE_SIZE: u64 = 50;

#[derive(Parser)]
#[command(name = "misinfo")]
#[command(version = "0.1.0")]
#[command(about = "Post store with asynchronous misinformation classification")]
#[command(long_about = r#"
Misinfo stores short text posts and keeps them in sync with an external
misinformation classifier:
  • New posts are published to the classifier's input topic
  • Classification results are applied back onto stored posts
  • Historical datasets are bulk-imported from CSV

Example usage:
  misinfo import-posts --file data/posts.csv
  misinfo posts --page 1 --size 10
  misinfo submit --message "The moon landing was staged" --username skeptic
  misinfo consume
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file (defaults to misinfo.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (`:memory:` for a throwaway store)
    #[arg(short, long, global = true)]
    database: Option<String>,

    /// Broker URL
    #[arg(long, global = true)]
    broker_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import posts from a prediction dataset
    ImportPosts {
        /// CSV file: id,text,date,pred_label,pred_prob,label,correct
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Replace all t-SNE embedding points
    ImportEmbeddings {
        /// CSV file: record_id,label,pred_label,correct,tnse_x,tnse_y
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Replace all topic activity rows
    ImportTopics {
        /// CSV file: date,contents,topic_id,topic_name
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List one page of posts
    Posts {
        /// Page number, starting at 1
        #[arg(short, long, default_value = "1", value_parser = clap::value_parser!(u64).range(1..))]
        page: u64,

        /// Posts per page
        #[arg(short, long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..=MAX_PAGE_SIZE))]
        size: u64,
    },

    /// Show one post with its report
    Show {
        /// Post id
        #[arg(short, long)]
        id: Uuid,
    },

    /// Store a new post and send it for classification
    Submit {
        #[arg(short, long)]
        message: String,

        #[arg(short, long)]
        username: String,

        /// Store the post without publishing it
        #[arg(long)]
        no_publish: bool,
    },

    /// Store a randomly generated post and send it for classification
    SubmitRandom {
        /// Store the post without publishing it
        #[arg(long)]
        no_publish: bool,
    },

    /// List t-SNE embedding points
    Embeddings,

    /// List topic activity rows
    Topics,

    /// Show row counts
    Stats,

    /// Apply classification results until interrupted
    Consume,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let mut config = config::load_config(cli.config.as_deref())?;
    config.apply_env();
    if let Some(database) = cli.database {
        config.database = database;
    }
    if let Some(broker_url) = cli.broker_url {
        config.broker_url = broker_url;
    }

    let store = open_store(&config)?;

    match cli.command {
        Commands::ImportPosts { file } => {
            ui::header(&format!("Importing posts from {}", file.display()));
            let spinner = ui::Spinner::new("Importing posts");
            let reader = csv_records(std::fs::File::open(&file)?);
            let summary = BulkImporter::new(store.clone())
                .import_posts(reader, Utc::now())
                .await?;
            ui::timing(&spinner.finish());
            ui::import_summary("posts", &summary);
        }

        Commands::ImportEmbeddings { file } => {
            ui::header(&format!("Importing t-SNE embeddings from {}", file.display()));
            let spinner = ui::Spinner::new("Replacing embedding points");
            let reader = csv_records(std::fs::File::open(&file)?);
            let summary = BulkImporter::new(store.clone())
                .import_tnse_embeddings(reader)
                .await?;
            ui::timing(&spinner.finish());
            ui::import_summary("t-SNE embeddings", &summary);
        }

        Commands::ImportTopics { file } => {
            ui::header(&format!("Importing topic activity from {}", file.display()));
            let spinner = ui::Spinner::new("Replacing topic activity");
            let reader = csv_records(std::fs::File::open(&file)?);
            let summary = BulkImporter::new(store.clone())
                .import_topic_activities(reader)
                .await?;
            ui::timing(&spinner.finish());
            ui::import_summary("topic activities", &summary);
        }

        Commands::Posts { page, size } => {
            let count = store.count_posts()?;
            let pages = count.div_ceil(size);
            let posts = store.get_posts(page, size)?;

            ui::section(&format!(" page {} of {} ", page, pages));
            if posts.is_empty() {
                ui::warn("No posts on this page.");
            } else {
                println!("{}", ui::posts_table(&posts));
            }
            ui::info("Total posts", &count.to_string());
        }

        Commands::Show { id } => match store.find_post(&id)? {
            Some(post) => ui::post_detail(&post),
            None => return Err(misinfo::Error::NotFound(format!("post {}", id)).into()),
        },

        Commands::Submit { message, username, no_publish } => {
            let post = Post::new(message, username, Utc::now());
            submit(&store, &config, post, no_publish).await?;
        }

        Commands::SubmitRandom { no_publish } => {
            submit(&store, &config, Post::random(), no_publish).await?;
        }

        Commands::Embeddings => {
            let records = store.get_all_tnse_embeddings()?;
            if records.is_empty() {
                ui::warn("No t-SNE embedding points stored.");
            } else {
                println!("{}", ui::embeddings_table(&records));
            }
        }

        Commands::Topics => {
            let records = store.get_all_topic_activities()?;
            if records.is_empty() {
                ui::warn("No topic activity stored.");
            } else {
                println!("{}", ui::topics_table(&records));
            }
        }

        Commands::Stats => {
            let stats = store.stats()?;
            ui::status(Icons::STATS, "Misinfo statistics", &config.database);
            println!("{}", ui::stats_table(&stats));
        }

        Commands::Consume => {
            let broker = connect_broker(&config).await?;
            let bridge = QueueBridge::from_config(broker, &config);
            let reconciler = Arc::new(ReportReconciler::new(store.clone()));

            ui::status(Icons::EAR, "Listening on", bridge.output_topic());
            tokio::select! {
                result = bridge.subscribe_to_reports(reconciler) => result?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupted, shutting down");
                }
            }
            ui::success("Consumer stopped");
        }
    }

    Ok(())
}

fn open_store(config: &MisinfoConfig) -> anyhow::Result<SqliteStore> {
    if config.is_in_memory() {
        return Ok(SqliteStore::open_in_memory()?);
    }
    let path = Path::new(&config.database);
    config::ensure_db_dir(path)?;
    Ok(SqliteStore::open(path)?)
}

async fn connect_broker(config: &MisinfoConfig) -> anyhow::Result<Arc<RedisBroker>> {
    let streams = StreamsConfig {
        group_name: config.consumer_group.clone(),
        ..StreamsConfig::default()
    };
    Ok(Arc::new(RedisBroker::connect(&config.broker_url, streams).await?))
}

/// Validate, persist, then publish. A publish failure leaves the stored post in place.
async fn submit(
    store: &SqliteStore,
    config: &MisinfoConfig,
    post: Post,
    no_publish: bool,
) -> anyhow::Result<()> {
    post.validate()?;
    let stored = store.insert_post(&post)?;
    ui::success(&format!("Stored post {}", stored.id));
    ui::post_detail(&stored);

    if no_publish {
        return Ok(());
    }

    let broker = connect_broker(config).await?;
    let bridge = QueueBridge::from_config(broker, config);
    match bridge.publish_new_post(&stored).await {
        Ok(()) => ui::status(Icons::OUTBOX, "Published to", bridge.input_topic()),
        Err(e) => {
            tracing::error!("post {} stored but not published: {}", stored.id, e);
            ui::error(&format!("Publish failed: {}", e));
        }
    }
    Ok(())
}
