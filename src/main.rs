//! # Stockroom CLI (`stock`)
//!
//! The `stock` binary is the thin collaborating tier over the stockroom
//! library: it validates input, drives the coordinator, and renders typed
//! outcomes as messages.
//!
//! ## Usage
//!
//! ```bash
//! stock --config ./stockroom.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `stock init` | Create the SQLite database and run schema migrations |
//! | `stock add <code> <name> <price>` | Create a product, optionally with `--image` |
//! | `stock edit <id> <code> <name> <price>` | Rewrite a product's fields |
//! | `stock rm <id>` | Delete a product and its image |
//! | `stock set-image <id> <file>` | Upload and attach an image |
//! | `stock rm-image <id>` | Detach and delete a product's image |
//! | `stock import <file>` | Bulk-load a tabular export |
//! | `stock list` | Paginated listing, `--filter` for substring search |
//! | `stock show <id-or-code>` | Look up a single product |
//!
//! Asset store credentials are read from `AWS_ACCESS_KEY_ID` /
//! `AWS_SECRET_ACCESS_KEY` (and optionally `AWS_SESSION_TOKEN`) at
//! startup; they are only required by commands that touch images.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use stockroom::assets::{AwsCredentials, S3AssetStore};
use stockroom::catalog::{self, CatalogStore};
use stockroom::config::{load_config, Config};
use stockroom::coordinator::Coordinator;
use stockroom::models::{ImageUpload, Product, ProductDraft, RemoveImageOutcome};
use stockroom::{db, import, migrate};

/// Stockroom — product catalog with saga-coordinated image assets and
/// bulk tabular ingestion.
#[derive(Parser)]
#[command(
    name = "stock",
    about = "Stockroom — product catalog with saga-coordinated image assets and bulk ingestion",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./stockroom.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the products table. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Add a product to the catalog.
    ///
    /// With `--image`, the file is uploaded to the asset store before the
    /// catalog write; if the code turns out to be a duplicate the upload
    /// is cleaned up again.
    Add {
        /// Unique product code.
        code: String,
        /// Product name.
        name: String,
        /// Non-negative price.
        price: f64,
        /// Optional description.
        #[arg(long)]
        description: Option<String>,
        /// Path to an image file to attach.
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// Rewrite a product's fields.
    ///
    /// All fields are replaced. Without `--image` the current image is
    /// kept; with it, the new image is uploaded first and the old one
    /// deleted after the catalog write commits.
    Edit {
        /// Product id.
        id: i64,
        /// Unique product code.
        code: String,
        /// Product name.
        name: String,
        /// Non-negative price.
        price: f64,
        /// Optional description.
        #[arg(long)]
        description: Option<String>,
        /// Path to a replacement image file.
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// Delete a product.
    ///
    /// The catalog row is removed first; the image, if any, is deleted
    /// from the asset store afterward.
    Rm {
        /// Product id.
        id: i64,
    },

    /// Upload an image and attach it to an existing product.
    SetImage {
        /// Product id.
        id: i64,
        /// Path to the image file.
        image: PathBuf,
    },

    /// Detach and delete a product's image.
    RmImage {
        /// Product id.
        id: i64,
    },

    /// Bulk-load a tabular export file.
    ///
    /// Expects a header row followed by positional columns: code, name,
    /// description, price. Malformed rows are reported and skipped; rows
    /// whose code already exists are counted as duplicates.
    Import {
        /// Path to the export file.
        file: PathBuf,
        /// Emit the summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List products, paginated.
    ///
    /// Newest first by default; with `--filter`, matches name or code
    /// case-insensitively and sorts by name.
    List {
        /// Substring filter on name or code.
        #[arg(long)]
        filter: Option<String>,
        /// 1-based page number.
        #[arg(long, default_value_t = 1)]
        page: i64,
        /// Emit the page as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Look up a single product by id or code.
    Show {
        /// Numeric id, or a product code.
        target: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config.db).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("ok");
        }

        Commands::Add {
            code,
            name,
            price,
            description,
            image,
        } => {
            let coordinator = open_coordinator(&config).await?;
            let draft = ProductDraft::new(&code, &name, description.as_deref(), price)?;
            let image = image.map(|p| read_image(&p)).transpose()?;
            let product = coordinator.create_product(draft, image).await?;
            print_product(&product);
        }

        Commands::Edit {
            id,
            code,
            name,
            price,
            description,
            image,
        } => {
            let coordinator = open_coordinator(&config).await?;
            let draft = ProductDraft::new(&code, &name, description.as_deref(), price)?;
            let image = image.map(|p| read_image(&p)).transpose()?;
            let product = coordinator.update_product(id, draft, image).await?;
            print_product(&product);
        }

        Commands::Rm { id } => {
            let coordinator = open_coordinator(&config).await?;
            coordinator.delete_product(id).await?;
            println!("deleted product {}", id);
        }

        Commands::SetImage { id, image } => {
            let coordinator = open_coordinator(&config).await?;
            let image = read_image(&image)?;
            let product = coordinator.replace_image(id, image).await?;
            print_product(&product);
        }

        Commands::RmImage { id } => {
            let coordinator = open_coordinator(&config).await?;
            match coordinator.remove_image(id).await? {
                RemoveImageOutcome::Removed => println!("image removed from product {}", id),
                RemoveImageOutcome::NothingToRemove => {
                    println!("product {} has no image to remove", id)
                }
            }
        }

        Commands::Import { file, json } => {
            let catalog = open_catalog(&config).await?;
            let raw = std::fs::read(&file)
                .with_context(|| format!("Failed to read import file: {}", file.display()))?;
            let summary = import::ingest(&catalog, &raw).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("import {}", file.display());
                println!("  committed:  {}", summary.committed);
                println!("  duplicates: {}", summary.duplicates);
                println!("  rejected:   {}", summary.rejected.len());
                for rejected in &summary.rejected {
                    println!("    row {}: {}", rejected.row, rejected.reason);
                }
                println!("ok");
            }
        }

        Commands::List { filter, page, json } => {
            let catalog = open_catalog(&config).await?;
            let page = catalog::list_products(
                &catalog,
                filter.as_deref(),
                page,
                config.listing.page_size,
            )
            .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&page)?);
            } else {
                for product in &page.items {
                    println!(
                        "{:>6}  {:<16} {:<32} {:>10.2}  {}",
                        product.id,
                        product.code,
                        product.name,
                        product.price,
                        if product.image_ref.is_some() { "img" } else { "-" }
                    );
                }
                println!(
                    "page {} of {} ({} products)",
                    page.page, page.page_count, page.total_count
                );
            }
        }

        Commands::Show { target } => {
            let catalog = open_catalog(&config).await?;
            let product = match target.parse::<i64>() {
                Ok(id) => catalog.get_by_id(id).await?,
                Err(_) => catalog.get_by_code(&target).await?,
            };
            match product {
                Some(product) => print_product(&product),
                None => anyhow::bail!("no product with id or code '{}'", target),
            }
        }
    }

    Ok(())
}

/// Open the catalog store, bootstrapping the schema if needed.
async fn open_catalog(config: &Config) -> Result<CatalogStore> {
    let pool = db::connect(&config.db).await?;
    migrate::run_migrations(&pool).await?;
    Ok(CatalogStore::new(pool))
}

/// Open the full coordinator: catalog plus S3-backed asset store.
/// Credentials come from the environment and are passed in explicitly.
async fn open_coordinator(config: &Config) -> Result<Coordinator> {
    let catalog = open_catalog(config).await?;
    let creds = AwsCredentials::from_env()?;
    let assets = S3AssetStore::new(config.assets.clone(), creds)?;
    Ok(Coordinator::new(catalog, Arc::new(assets)))
}

fn read_image(path: &Path) -> Result<ImageUpload> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read image file: {}", path.display()))?;
    Ok(ImageUpload {
        bytes,
        content_type: content_type_for(path),
    })
}

/// Map a file extension to the content type sent to the asset store.
fn content_type_for(path: &Path) -> String {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
    .to_string()
}

fn print_product(product: &Product) {
    println!("id:          {}", product.id);
    println!("code:        {}", product.code);
    println!("name:        {}", product.name);
    if let Some(ref description) = product.description {
        println!("description: {}", description);
    }
    println!("price:       {}", product.price);
    match product.image_ref {
        Some(ref reference) => println!("image:       {}", reference),
        None => println!("image:       (none)"),
    }
}
