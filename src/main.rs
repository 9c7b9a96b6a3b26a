use std::path::{Path, PathBuf};

use clap::Parser;
use color_eyre::{eyre::Context, Result};
use fedimerge::{
    api::mastodon::{InstanceDestination, InstanceSource, MastodonClient},
    config::Config,
    export::{check_export_format, write_blocklist},
    merge_blocklists,
    parse::{load_files, FileSource, SourceFormat},
    Blocklist, DomainBlock, MergePlan,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Merge Mastodon domain blocklists from files and instances into one list.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How conflicting blocks are resolved: "max" or "min".
    #[arg(short, long)]
    mergeplan: Option<MergePlan>,

    /// Write the merged list here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format: csv or json. The mastodon format is input only.
    #[arg(long)]
    format: Option<SourceFormat>,

    /// Extra blocklist file; the format follows the extension.
    #[arg(short, long = "file")]
    files: Vec<PathBuf>,

    /// Extra instance to read the public blocklist from.
    #[arg(short, long = "instance")]
    instances: Vec<String>,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logger(cli.verbose);

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(real_main(cli))
}

fn init_logger(verbose: bool) {
    let default = if verbose {
        "fedimerge=debug,info"
    } else {
        "fedimerge=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}

async fn real_main(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    let mut sources = load_files(&config.blocklist_files, &config.import_fields)
        .context("load blocklist files")?;

    let client = MastodonClient::new();
    for instance in &config.blocklist_instances {
        if let Some(blocks) = try_load_blocklist(&client, instance, &config).await {
            sources.push(blocks);
        }
    }

    let mut merged = merge_blocklists(sources, config.mergeplan).context("merge blocklists")?;
    let allowed = merged.apply_allowlist(config.allowlist.iter().map(String::as_str));
    tracing::info!(
        domains = merged.len(),
        allowed,
        mergeplan = %config.mergeplan,
        "merged blocklists"
    );

    match &config.save_path {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("create output file {}", path.display()))?;
            write_blocklist(file, &merged, config.save_format, &config.export_fields)
                .context("write merged blocklist")?;
            tracing::info!(path = %path.display(), "saved merged blocklist");
        }
        None => {
            write_blocklist(
                std::io::stdout().lock(),
                &merged,
                config.save_format,
                &config.export_fields,
            )
            .context("write merged blocklist")?;
        }
    }

    for destination in &config.blocklist_instance_destinations {
        try_push_blocklist(&client, destination, &merged, &config).await;
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("load config file {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(mergeplan) = cli.mergeplan {
        config.mergeplan = mergeplan;
    }
    if let Some(path) = &cli.output {
        config.save_path = Some(path.clone());
    }
    if let Some(format) = cli.format {
        config.save_format = format;
    }
    config.blocklist_files.extend(
        cli.files
            .iter()
            .map(|path| FileSource::new(path, format_for_path(path))),
    );
    config
        .blocklist_instances
        .extend(cli.instances.iter().map(InstanceSource::new));

    check_export_format(config.save_format)?;
    Ok(config)
}

fn format_for_path(path: &Path) -> SourceFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => SourceFormat::Json,
        _ => SourceFormat::Csv,
    }
}

async fn try_load_blocklist(
    client: &MastodonClient,
    instance: &InstanceSource,
    config: &Config,
) -> Option<Vec<DomainBlock>> {
    match client.fetch(instance, &config.import_fields).await {
        Ok(blocks) => {
            tracing::info!(host = %instance.host, count = blocks.len(), "loaded blocklist");
            Some(blocks)
        }
        Err(e) => {
            tracing::error!(host = %instance.host, "error while trying to load blocklist: {e}");
            None
        }
    }
}

async fn try_push_blocklist(
    client: &MastodonClient,
    destination: &InstanceDestination,
    merged: &Blocklist,
    config: &Config,
) {
    if let Err(e) = client.push(destination, merged, &config.export_fields).await {
        tracing::error!(host = %destination.host, "error while trying to push blocklist: {e}");
    }
}
