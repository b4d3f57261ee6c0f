// ============================================================================
// gotochi - command-line front end for the Gotochi collection tracker
// ============================================================================
// Usage:
//   gotochi items [--region R] [--category C] [--status S]   List visible items
//   gotochi markers [filters]                                 Map marker groups
//   gotochi toggle KEY...                                     Flip ownership
//   gotochi login --access-token T --expires-in 3599          Sign in
//   gotochi select-folder ID NAME                             Pick the sync folder
//   gotochi export-overlay / import-overlay FILE --yes        Ownership backups
//   gotochi refresh | fix-regions --yes | clear-catalog --confirm DELETE
// ============================================================================

use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use gotochi_core::catalog::{
    read_catalog_file, read_overlay_file, CATALOG_EXPORT_FILENAME, OVERLAY_EXPORT_FILENAME,
};
use gotochi_core::{
    AppConfig, CategoryFilter, DetailView, FilterCriteria, LoginOutcome, MarkerContent, Region,
    SaveTarget, StatusFilter, TokenResponse, Tracker,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Gotochi collection tracker
#[derive(Parser)]
#[command(name = "gotochi", version, about = "Track which regional collectibles you own")]
struct Cli {
    /// Path to the database file (default: ~/.gotochi/state.redb)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct FilterArgs {
    /// Region label, e.g. 關東 (全部 for every region)
    #[arg(long, default_value = "全部")]
    region: String,

    /// Category: tag, plush, socks, other or all
    #[arg(long, default_value = "all")]
    category: String,

    /// Ownership: all, owned, not-owned
    #[arg(long, default_value = "all")]
    status: String,
}

impl FilterArgs {
    fn criteria(&self) -> FilterCriteria {
        FilterCriteria {
            region: Region::parse(&self.region),
            category: CategoryFilter::parse(&self.category),
            status: StatusFilter::parse(&self.status),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List items passing the filters
    Items {
        #[command(flatten)]
        filters: FilterArgs,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show map marker groups for the filtered items
    Markers {
        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Show one item's detail view by its position in the filtered list
    Detail {
        position: usize,

        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Flip ownership of items, by item key or exact name
    Toggle {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Flip ownership of one member of a marker group
    ToggleMarker {
        group: usize,
        member: usize,

        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Collection progress and local storage state
    Stats,

    /// Sign in with an access token issued by the Google token client
    Login {
        #[arg(long)]
        access_token: String,

        /// Token lifetime in seconds
        #[arg(long, default_value = "3599")]
        expires_in: i64,
    },

    /// Sign out and fall back to this device's ownership data
    Logout,

    /// Use a Drive folder for ownership sync
    SelectFolder { id: String, name: String },

    /// Write ownership to a JSON file
    ExportOverlay {
        #[arg(long, default_value = OVERLAY_EXPORT_FILENAME)]
        out: PathBuf,
    },

    /// Replace ownership with a JSON file's contents
    ImportOverlay {
        file: PathBuf,

        #[arg(long)]
        yes: bool,
    },

    /// Write the catalog to a JSON file
    ExportCatalog {
        #[arg(long, default_value = CATALOG_EXPORT_FILENAME)]
        out: PathBuf,
    },

    /// Replace the catalog with a JSON file's contents
    ImportCatalog {
        file: PathBuf,

        #[arg(long)]
        yes: bool,
    },

    /// Ask the catalog service to rebuild the catalog
    Refresh,

    /// Ask the catalog service to re-derive item regions
    FixRegions {
        #[arg(long)]
        yes: bool,
    },

    /// Delete every catalog item (pass --confirm DELETE)
    ClearCatalog {
        #[arg(long, default_value = "")]
        confirm: String,
    },

    /// Clear every ownership flag
    Reset {
        #[arg(long)]
        yes: bool,
    },
}

fn format_timestamp_ms(ts: i64) -> String {
    Utc.timestamp_millis_opt(ts)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ts))
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("gotochi_core=info".parse()?)
                .add_directive("gotochi=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();
    let mut config = AppConfig::from_env();
    if cli.db_path.is_some() {
        config.db_path = cli.db_path;
    }

    let mut tracker = Tracker::new(config)?;
    tracker.startup().await;

    let result = run(&mut tracker, cli.command).await;

    // Pending toggles are written before exit
    if let Err(e) = tracker.shutdown().await {
        tracing::error!("Failed to save ownership changes: {}", e);
    }
    result
}

async fn run(tracker: &mut Tracker, command: Commands) -> Result<()> {
    match command {
        Commands::Items { filters, json } => cmd_items(tracker, &filters, json),
        Commands::Markers { filters } => cmd_markers(tracker, &filters),
        Commands::Detail { position, filters } => cmd_detail(tracker, position, &filters),
        Commands::Toggle { keys } => cmd_toggle(tracker, &keys),
        Commands::ToggleMarker {
            group,
            member,
            filters,
        } => cmd_toggle_marker(tracker, group, member, &filters),
        Commands::Stats => cmd_stats(tracker).await,
        Commands::Login {
            access_token,
            expires_in,
        } => cmd_login(tracker, access_token, expires_in).await,
        Commands::Logout => {
            tracker.logout().await?;
            println!("Signed out. Ownership is now stored on this device.");
            Ok(())
        }
        Commands::SelectFolder { id, name } => {
            let entries = tracker.select_folder(&id, &name).await?;
            println!("Syncing with folder '{}': {} ownership entries loaded", name, entries);
            Ok(())
        }
        Commands::ExportOverlay { out } => {
            tracker.export_overlay(&out)?;
            println!("Ownership written to {}", out.display());
            Ok(())
        }
        Commands::ImportOverlay { file, yes } => cmd_import_overlay(tracker, file, yes).await,
        Commands::ExportCatalog { out } => {
            tracker.export_catalog(&out)?;
            println!("Catalog written to {}", out.display());
            Ok(())
        }
        Commands::ImportCatalog { file, yes } => cmd_import_catalog(tracker, file, yes).await,
        Commands::Refresh => {
            admin_hint(tracker);
            let total = tracker.refresh_catalog().await?;
            println!("Catalog refreshed: {} items", total);
            Ok(())
        }
        Commands::FixRegions { yes } => {
            admin_hint(tracker);
            match tracker.fix_regions(yes).await? {
                Some(updated) => println!("Regions fixed: {} items updated", updated),
                None => println!("Not confirmed; pass --yes to re-derive regions."),
            }
            Ok(())
        }
        Commands::ClearCatalog { confirm } => {
            admin_hint(tracker);
            if tracker.clear_catalog(&confirm).await? {
                println!("Catalog cleared.");
            } else {
                println!("Not confirmed; pass --confirm DELETE to clear the catalog.");
            }
            Ok(())
        }
        Commands::Reset { yes } => {
            match tracker.reset_selections(yes).await? {
                Some(target) => println!("All ownership cleared ({})", describe_target(&target)),
                None => println!("Not confirmed; pass --yes to clear every ownership flag."),
            }
            Ok(())
        }
    }
}

fn admin_hint(tracker: &Tracker) {
    if !tracker.is_admin() {
        eprintln!("Note: catalog maintenance is intended for the catalog administrator.");
    }
}

fn describe_target(target: &SaveTarget) -> String {
    match target {
        SaveTarget::Local => "saved on this device".to_string(),
        SaveTarget::Remote { file_id, created } => {
            if *created {
                format!("new Drive file {}", file_id)
            } else {
                format!("Drive file {}", file_id)
            }
        }
    }
}

fn print_detail(view: &DetailView) {
    println!("[{}/{}] {}", view.position + 1, view.total, view.title);
    println!("  {}", view.subtitle);
    match &view.image {
        Some(url) => println!("  image: {}", url),
        None => println!("  {}", view.glyph),
    }
    println!("  {}", if view.owned { "✔ owned" } else { "not owned" });
}

fn cmd_items(tracker: &mut Tracker, filters: &FilterArgs, json: bool) -> Result<()> {
    let state = tracker.state_mut();
    state.set_criteria(filters.criteria());
    let items = state.visible_items();

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No items found.");
        return Ok(());
    }

    println!("{:<5}  {:<3}  {:<10}  {:<8}  {}", "#", "OWN", "REGION", "CATEGORY", "NAME");
    println!("{}", "-".repeat(70));
    for (position, item) in items.iter().enumerate() {
        println!(
            "{:<5}  {:<3}  {:<10}  {:<8}  {}",
            position,
            if item.owned { "✔" } else { "" },
            item.region.as_str(),
            item.category.label(),
            item.name
        );
    }

    println!("\nShowing {} of {} items", items.len(), state.items().len());
    Ok(())
}

fn cmd_markers(tracker: &mut Tracker, filters: &FilterArgs) -> Result<()> {
    let state = tracker.state_mut();
    state.set_criteria(filters.criteria());
    state.enter_map_view();

    let visible = state.visible_items();
    let markers = state.markers();
    if markers.is_empty() {
        println!("No located items to show.");
        return Ok(());
    }

    for (group, marker) in markers.iter().enumerate() {
        let content = match &marker.content {
            MarkerContent::Image(url) => url.clone(),
            MarkerContent::Emoji(glyph) => glyph.clone(),
            MarkerContent::Count(n) => format!("{} items", n),
        };
        println!(
            "{:<4} {} ({:.5}, {:.5})  {}  [{}]",
            group,
            marker.label,
            marker.lat,
            marker.lng,
            content,
            marker.state.color()
        );
        for (member, (_, item)) in marker.member_items(&visible).enumerate() {
            println!(
                "       {}. {} {}",
                member,
                if item.owned { "✔" } else { " " },
                item.name
            );
        }
    }

    println!("\n{} markers", markers.len());
    Ok(())
}

fn cmd_detail(tracker: &mut Tracker, position: usize, filters: &FilterArgs) -> Result<()> {
    let state = tracker.state_mut();
    state.set_criteria(filters.criteria());
    let view = state
        .open_detail(position)
        .ok_or_else(|| anyhow!("No item at position {}", position))?;
    print_detail(&view);
    Ok(())
}

fn cmd_toggle(tracker: &mut Tracker, keys: &[String]) -> Result<()> {
    tracker.state_mut().set_criteria(FilterCriteria::default());

    for key in keys {
        let position = tracker
            .state()
            .visible_items()
            .iter()
            .position(|item| item.key() == *key || item.name == *key)
            .ok_or_else(|| anyhow!("No item with key or name '{}'", key))?;
        let name = tracker.state().items()[position].name.clone();
        if let Some(owned) = tracker.toggle(position) {
            println!("{} {}", if owned { "✔ owned:" } else { "✘ not owned:" }, name);
        }
    }
    Ok(())
}

fn cmd_toggle_marker(tracker: &mut Tracker, group: usize, member: usize, filters: &FilterArgs) -> Result<()> {
    let state = tracker.state_mut();
    state.set_criteria(filters.criteria());
    state.enter_map_view();

    let owned = tracker
        .toggle_marker_member(group, member)
        .ok_or_else(|| anyhow!("No member {} in marker {}", member, group))?;
    println!("Marker {} member {} is now {}", group, member, if owned { "owned" } else { "not owned" });
    Ok(())
}

async fn cmd_stats(tracker: &Tracker) -> Result<()> {
    let progress = tracker.state().progress();
    let db_stats = tracker.db().stats()?;

    println!("=== Gotochi Collection ===");
    println!("Database: {}", tracker.db().path().display());
    println!("Catalog:  {}", tracker.config().catalog_url);
    println!();
    println!(
        "Owned:    {} / {} ({:.1}%)",
        progress.owned, progress.total, progress.percentage
    );

    let mut owned_by_region: Vec<(Region, usize, usize)> = Vec::new();
    for item in tracker.state().items() {
        match owned_by_region.iter_mut().find(|(r, _, _)| *r == item.region) {
            Some(entry) => {
                entry.1 += usize::from(item.owned);
                entry.2 += 1;
            }
            None => owned_by_region.push((item.region.clone(), usize::from(item.owned), 1)),
        }
    }
    for (region, owned, total) in &owned_by_region {
        println!("  {:10} {}/{}", region.as_str(), owned, total);
    }

    println!();
    match tracker.profile() {
        Some(profile) => println!(
            "Account:  {}{}",
            profile.email.as_deref().or(profile.name.as_deref()).unwrap_or("(unknown)"),
            if tracker.is_admin() { " (admin)" } else { "" }
        ),
        None if tracker.is_signed_in() => println!("Account:  signed in"),
        None => println!("Account:  signed out"),
    }
    match &db_stats.folder {
        Some(folder) => println!("Folder:   {} ({})", folder.name, folder.id),
        None => println!("Folder:   none"),
    }
    println!(
        "Storage:  {}",
        if tracker.uses_remote().await { "Drive" } else { "this device" }
    );
    println!("Local overlay entries: {}", db_stats.local_overlay_entries);
    if let Some(session) = tracker.session() {
        println!("Session expires: {}", format_timestamp_ms(session.expiry));
    }

    Ok(())
}

async fn cmd_login(tracker: &mut Tracker, access_token: String, expires_in: i64) -> Result<()> {
    let token = TokenResponse {
        access_token,
        expires_in,
        token_type: Some("Bearer".to_string()),
        scope: Some(gotochi_core::auth::SCOPES.to_string()),
    };

    match tracker.login(&token).await? {
        LoginOutcome::FolderRequired => {
            println!("Signed in. Run `gotochi select-folder ID NAME` to sync ownership with Drive.")
        }
        LoginOutcome::Synced { folder, entries } => {
            println!("Signed in. Loaded {} ownership entries from '{}'", entries, folder.name)
        }
        LoginOutcome::RemoteUnavailable { folder } => {
            println!(
                "Signed in, but '{}' could not be read; keeping current ownership.",
                folder.name
            )
        }
    }
    Ok(())
}

async fn cmd_import_overlay(tracker: &mut Tracker, file: PathBuf, yes: bool) -> Result<()> {
    let overlay = read_overlay_file(&file)?;
    match tracker.import_overlay(overlay, yes).await? {
        Some(target) => println!("Ownership imported ({})", describe_target(&target)),
        None => println!("Not confirmed; pass --yes to replace current ownership."),
    }
    Ok(())
}

async fn cmd_import_catalog(tracker: &mut Tracker, file: PathBuf, yes: bool) -> Result<()> {
    admin_hint(tracker);
    let items = read_catalog_file(&file)?;
    match tracker.import_catalog(&items, yes).await? {
        Some(total) => println!("Catalog imported: {} items", total),
        None => println!("Not confirmed; pass --yes to replace the catalog with {} items.", items.len()),
    }
    Ok(())
}
