mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, IngestArgs, SpinnerObserver, SummaryArgs};
use lichess_elite::links::discover_links;
use lichess_elite::logging;
use lichess_elite::pipeline::Ingest;
use lichess_elite::reader::{AnySource, HttpSource, expand_inputs};
use lichess_elite::store::DuckDbStore;
use log::{info, warn};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Command::Links(args) => {
            let http = HttpSource::new(&args.http_config()).context("building HTTP client")?;
            for link in discover_links(http.client(), &args.base_url, &args.years)? {
                println!("{}", link);
            }
        }
        Command::Ingest(args) => ingest(args)?,
        Command::Summary(args) => summary(args)?,
    }
    Ok(())
}

fn ingest(args: IngestArgs) -> Result<()> {
    let source = AnySource::new(&args.index.http_config()).context("building HTTP client")?;

    let mut locations = if args.inputs.is_empty() {
        discover_links(
            source.http().client(),
            &args.index.base_url,
            &args.index.years,
        )?
    } else {
        expand_inputs(&args.inputs).context("expanding --input patterns")?
    };
    if let Some(max) = args.max_archives {
        locations.truncate(max);
    }
    if locations.is_empty() {
        warn!("nothing to ingest");
        return Ok(());
    }

    let store = DuckDbStore::open(&args.db.db, &args.db.table)
        .with_context(|| format!("opening {}", args.db.db.display()))?;
    let mut ingest = Ingest::new(&source, store, args.filter_config())
        .with_progress_interval(args.progress_every);
    if let Some(compression) = args.compression {
        ingest = ingest.with_compression(compression);
    }

    let report = ingest.run(&locations, &mut SpinnerObserver::new())?;
    info!(
        "stored {} game(s) in {}:{}",
        report.records(),
        args.db.db.display(),
        args.db.table
    );
    for failed in report.failures() {
        warn!(
            "{} failed: {}",
            failed.location,
            failed.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn summary(args: SummaryArgs) -> Result<()> {
    let store = DuckDbStore::open_existing(&args.db.db, &args.db.table)
        .with_context(|| format!("opening {}", args.db.db.display()))?;
    let summary = store.summary()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!();
    println!("\tLoaded chess game data from '{}'.", summary.table);
    println!("\t- Rows: {}", summary.rows);
    println!("\t- Cols: {}", summary.columns);
    println!(
        "\t- Results: {} white, {} black, {} draw, {} unknown",
        summary.winners.white, summary.winners.black, summary.winners.draw, summary.winners.unknown
    );
    if let Some(mean) = summary.mean_plies {
        println!("\t- Mean plies: {:.1}", mean);
    }
    if summary.unreplayable > 0 {
        println!("\t- Unreplayable games: {}", summary.unreplayable);
    }

    if !summary.head.is_empty() {
        println!();
    }
    for game in &summary.head {
        println!(
            "\t#{} {}-{} {} [{}] {}",
            game.game_id,
            game.white_elo,
            game.black_elo,
            game.result.as_deref().unwrap_or("?"),
            game.final_fen.as_deref().unwrap_or("does not replay"),
            game.moves
        );
    }
    Ok(())
}
