use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use wikiflow_core::config::{
    ClientConfig, DEFAULT_CONFIG_FILENAME, credentials_from_env, load_config,
};
use wikiflow_core::listing::{
    NS_MAIN, all_pages, backlinks, category_members, category_members_full, image_usage,
    recent_changes,
};
use wikiflow_core::{PageSource, Query, WikiClient};

#[derive(Debug, Parser)]
#[command(
    name = "wikiflow",
    version,
    about = "Client for versioned, paginated MediaWiki APIs"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override WIKI_API_URL")]
    api_url: Option<String>,
    #[arg(short, long, global = true, help = "Log requests and negotiation")]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    config: Option<PathBuf>,
    api_url: Option<String>,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            config: cli.config.clone(),
            api_url: cli.api_url.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Version,
    Userinfo(OutputArgs),
    Category(CategoryArgs),
    Backlinks(TitleArgs),
    #[command(name = "image-usage")]
    ImageUsage(TitleArgs),
    #[command(name = "recent-changes")]
    RecentChanges(ListingArgs),
    #[command(name = "all-pages")]
    AllPages(ListingArgs),
    Delete(DeleteArgs),
}

#[derive(Debug, Args)]
struct OutputArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct ListingArgs {
    #[arg(long, default_value_t = 0, help = "Stop after N results (0 = all)")]
    limit: usize,
    #[arg(long = "namespace", value_name = "NS")]
    namespaces: Vec<i32>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct TitleArgs {
    title: String,
    #[command(flatten)]
    listing: ListingArgs,
}

#[derive(Debug, Args)]
struct CategoryArgs {
    name: String,
    #[arg(long, help = "Include namespace and page id")]
    full: bool,
    #[command(flatten)]
    listing: ListingArgs,
}

#[derive(Debug, Args)]
struct DeleteArgs {
    title: String,
    #[arg(long)]
    reason: Option<String>,
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Version) => run_version(&runtime),
        Some(Commands::Userinfo(args)) => run_userinfo(&runtime, args),
        Some(Commands::Category(args)) => run_category(&runtime, args),
        Some(Commands::Backlinks(TitleArgs { title, listing })) => {
            let client = connect(&runtime)?;
            let query = backlinks(&client, &title, &listing.namespaces)?;
            print_listing(query, &listing)
        }
        Some(Commands::ImageUsage(TitleArgs { title, listing })) => {
            let client = connect(&runtime)?;
            let query = image_usage(&client, &title, &listing.namespaces)?;
            print_listing(query, &listing)
        }
        Some(Commands::RecentChanges(listing)) => {
            let client = connect(&runtime)?;
            let query = recent_changes(&client, &listing.namespaces)?;
            print_listing(query, &listing)
        }
        Some(Commands::AllPages(listing)) => run_all_pages(&runtime, listing),
        Some(Commands::Delete(args)) => run_delete(&runtime, args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_client_config(runtime: &RuntimeOptions) -> Result<ClientConfig> {
    let path = runtime
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME));
    let mut file_config = load_config(&path)?;
    if runtime.api_url.is_some() {
        file_config.wiki.api_url = runtime.api_url.clone();
    }
    let config = ClientConfig::from_file_config(&file_config)
        .with_context(|| format!("failed to resolve client config from {}", normalize_path(&path)))?;
    // an explicit flag beats WIKI_API_URL
    match &runtime.api_url {
        Some(api_url) => {
            let mut config = config;
            config.api_url = api_url.trim().to_string();
            config.validate()?;
            Ok(config)
        }
        None => Ok(config),
    }
}

fn connect(runtime: &RuntimeOptions) -> Result<WikiClient> {
    let config = resolve_client_config(runtime)?;
    tracing::debug!(api_url = %config.api_url, "connecting");
    Ok(WikiClient::from_config(&config)?)
}

fn run_version(runtime: &RuntimeOptions) -> Result<()> {
    let client = connect(runtime)?;
    let version = client.version()?;
    println!("{version}");
    Ok(())
}

fn run_userinfo(runtime: &RuntimeOptions, args: OutputArgs) -> Result<()> {
    let client = connect(runtime)?;
    if let Some((username, password)) = credentials_from_env() {
        client.login(&username, &password)?;
    }
    let userinfo = client.userinfo()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&userinfo)?);
        return Ok(());
    }
    println!("username: {}", userinfo.username);
    println!("groups: {}", join_or_empty(userinfo.groups.iter()));
    println!("rights: {}", join_or_empty(userinfo.rights.iter()));
    Ok(())
}

fn run_category(runtime: &RuntimeOptions, args: CategoryArgs) -> Result<()> {
    let client = connect(runtime)?;
    if args.full {
        let query = category_members_full(&client, &args.name, &args.listing.namespaces)?;
        let items = collect(query, args.listing.limit)?;
        if args.listing.json {
            println!("{}", serde_json::to_string_pretty(&items)?);
        } else {
            for item in &items {
                println!("{}\t{}\t{}", item.page_id, item.namespace, item.title);
            }
        }
        return Ok(());
    }
    let query = category_members(&client, &args.name, &args.listing.namespaces)?;
    print_listing(query, &args.listing)
}

fn run_all_pages(runtime: &RuntimeOptions, args: ListingArgs) -> Result<()> {
    if args.namespaces.len() > 1 {
        bail!("all-pages lists a single namespace; pass --namespace at most once");
    }
    let namespace = args.namespaces.first().copied().unwrap_or(NS_MAIN);
    let client = connect(runtime)?;
    let query = all_pages(&client, namespace)?;
    print_listing(query, &args)
}

fn run_delete(runtime: &RuntimeOptions, args: DeleteArgs) -> Result<()> {
    let Some((username, password)) = credentials_from_env() else {
        bail!("delete requires WIKI_USERNAME and WIKI_PASSWORD");
    };
    let client = connect(runtime)?;
    client.login(&username, &password)?;
    let outcome = client.delete(&args.title, args.reason.as_deref())?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }
    println!("deleted: {}", outcome.title);
    if let Some(reason) = &outcome.reason {
        println!("reason: {reason}");
    }
    Ok(())
}

fn collect<S: PageSource>(mut query: Query<'_, S>, limit: usize) -> Result<Vec<S::Item>> {
    let items = if limit == 0 {
        query.materialize_all()?
    } else {
        query.materialize(limit)?
    };
    tracing::debug!(
        items = items.len(),
        pages = query.pages_fetched(),
        "listing complete"
    );
    Ok(items)
}

fn print_listing<S>(query: Query<'_, S>, args: &ListingArgs) -> Result<()>
where
    S: PageSource,
    S::Item: Serialize + std::fmt::Display,
{
    let items = collect(query, args.limit)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    for item in &items {
        println!("{item}");
    }
    Ok(())
}

fn join_or_empty<'a>(values: impl Iterator<Item = &'a String>) -> String {
    let joined = values.map(String::as_str).collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "<empty>".to_string()
    } else {
        joined
    }
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
