//! poi-arbiter CLI: list, show and resolve disputes; compare, query and scan POIs.

use clap::{Args, Parser, Subcommand};
use poi_arbiter::chain::normalize::{parse_epoch_range, parse_grt};
use poi_arbiter::dispute::list_disputes;
use poi_arbiter::poi::grouper::deployment_submissions;
use poi_arbiter::poi::{group, ScanControl};
use poi_arbiter::{
    verify_payload, ArbiterConfig, Bytes32, Confirm, Deployment, DisputeResolver, DisputeStatus,
    Environment, Error, ReferencePolicy, ResolutionAction, ResolutionOutcome, ResolutionPlan,
};
use poi_arbiter_report::{self as report, ScanRow, Style};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use time::OffsetDateTime;
use tracing::info;

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() -> CliResult {
    let cli = Cli::parse();
    let filter = cli
        .global
        .log_level
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    let config = cli.global.config()?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli.command, config))
}

#[derive(Parser)]
#[command(name = "poi-arbiter")]
#[command(author = "gorusys <goru.connector@outlook.com>")]
#[command(about = "Proof-of-indexing verification and dispute resolution for arbitrators")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Overrides on top of the config file.
#[derive(Args)]
struct GlobalArgs {
    /// Config file (JSON); default lookup when omitted.
    #[arg(long, global = true, env = "POI_ARBITER_CONFIG_PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, env = "POI_ARBITER_ETHEREUM")]
    ethereum: Option<String>,
    #[arg(long, global = true, env = "POI_ARBITER_NETWORK_SUBGRAPH")]
    network_subgraph: Option<String>,
    #[arg(long, global = true, env = "POI_ARBITER_TRUSTED_SUBGRAPH")]
    trusted_subgraph: Option<String>,
    #[arg(long, global = true, env = "POI_ARBITER_EBO_SUBGRAPH")]
    ebo_subgraph: Option<String>,
    #[arg(long, global = true, env = "POI_ARBITER_DISPUTE_MANAGER")]
    dispute_manager: Option<String>,
    /// Sender for `--execute`; the ledger endpoint signs for it.
    #[arg(long, global = true, env = "POI_ARBITER_ACCOUNT")]
    account: Option<String>,
    #[arg(long, global = true, env = "POI_ARBITER_CONCURRENCY")]
    concurrency: Option<usize>,
    #[arg(long, global = true, env = "POI_ARBITER_POI_CACHE")]
    poi_cache: Option<PathBuf>,
    /// Tracing filter, e.g. `debug` or `poi_arbiter=trace`; overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,
}

impl GlobalArgs {
    fn config(&self) -> Result<ArbiterConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => ArbiterConfig::load_from_path(path)?,
            None => ArbiterConfig::load()?,
        };
        if let Some(v) = &self.ethereum {
            config.ethereum = v.clone();
        }
        if let Some(v) = &self.network_subgraph {
            config.network_subgraph_endpoint = v.clone();
        }
        if let Some(v) = &self.trusted_subgraph {
            config.trusted_subgraph_endpoint = v.clone();
        }
        if let Some(v) = &self.ebo_subgraph {
            config.ebo_subgraph_endpoint = Some(v.clone());
        }
        if let Some(v) = &self.dispute_manager {
            config.dispute_manager = v.clone();
        }
        if let Some(v) = &self.account {
            config.account = Some(v.clone());
        }
        if let Some(v) = self.concurrency {
            config.scan_concurrency = v;
        }
        if let Some(v) = &self.poi_cache {
            config.poi_cache_path = Some(v.clone());
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Command {
    /// List disputes, oldest first.
    List {
        /// undecided, accepted, rejected, draw or cancelled.
        #[arg(long)]
        status: Option<DisputeStatus>,
        #[arg(long)]
        json: bool,
    },
    /// Show disputes with their reference POI check.
    Show {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long)]
        rainbow: bool,
        /// Two-point check (closing epoch and the one before).
        #[arg(long)]
        legacy: bool,
        #[arg(long)]
        json: bool,
    },
    /// Resolve a dispute, or decode an unsigned resolution payload.
    #[command(subcommand)]
    Resolve(ResolveCommand),
    /// POI submissions, live public POIs and trusted POI scans.
    #[command(subcommand)]
    Poi(PoiCommand),
    /// Print an allocation as JSON.
    Inspect { allocation_id: String },
}

#[derive(Subcommand)]
enum ResolveCommand {
    /// Accept the dispute and slash the indexer.
    Accept {
        dispute_id: String,
        /// Amount to slash in GRT.
        #[arg(long, value_parser = grt)]
        tokens_slash: u128,
        #[command(flatten)]
        opts: ResolveOpts,
    },
    /// Accept the dispute and resolve its related dispute in the same call.
    AcceptConflict {
        dispute_id: String,
        #[arg(long, value_parser = grt)]
        tokens_slash: u128,
        /// Also accept the related dispute (otherwise it is drawn).
        #[arg(long)]
        accept_related: bool,
        #[arg(long, value_parser = grt, default_value = "0")]
        tokens_slash_related: u128,
        #[command(flatten)]
        opts: ResolveOpts,
    },
    Reject {
        dispute_id: String,
        #[command(flatten)]
        opts: ResolveOpts,
    },
    Draw {
        dispute_id: String,
        #[command(flatten)]
        opts: ResolveOpts,
    },
    /// Decode calldata hex or the JSON envelope printed by a dry run.
    Verify { payload: String },
}

#[derive(Args)]
struct ResolveOpts {
    /// Submit the transaction; without it the unsigned request is printed.
    #[arg(long)]
    execute: bool,
    /// Skip the confirmation prompt.
    #[arg(long)]
    yes: bool,
    #[arg(long)]
    legacy: bool,
    #[arg(long)]
    rainbow: bool,
}

#[derive(Subcommand)]
enum PoiCommand {
    /// Submitted POIs for a deployment grouped by epoch and public POI.
    List {
        deployment: String,
        #[arg(long = "indexer")]
        indexers: Vec<String>,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        rainbow: bool,
    },
    /// Ask indexers for their live public POIs at each epoch's start block on a chain.
    Query {
        deployment: String,
        /// `1132` or `1130-1135`.
        #[arg(long)]
        epoch: String,
        /// Chain id, e.g. `eip155:1` or `1`.
        #[arg(long)]
        chain: String,
        #[arg(long = "indexer", required = true)]
        indexers: Vec<String>,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        rainbow: bool,
    },
    /// Trusted POIs for every block in `[from, to)`.
    Scan {
        deployment: String,
        #[arg(long)]
        from: u64,
        #[arg(long)]
        to: u64,
        #[arg(long)]
        indexer: String,
        /// Stop at the first block whose POI equals this one.
        #[arg(long = "match")]
        target: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

fn grt(s: &str) -> Result<u128, String> {
    parse_grt(s).map_err(|e| e.to_string())
}

fn parse_id(s: &str) -> Result<Bytes32, Error> {
    s.parse::<Bytes32>().map_err(Error::from)
}

fn policy(legacy: bool) -> ReferencePolicy {
    if legacy {
        ReferencePolicy::Legacy
    } else {
        ReferencePolicy::Extended
    }
}

async fn run(command: Command, config: ArbiterConfig) -> CliResult {
    // decoding a payload is offline; it must not require configured endpoints
    if let Command::Resolve(ResolveCommand::Verify { payload }) = &command {
        return run_verify(payload, &config);
    }
    let env = Environment::connect(config)?;
    match command {
        Command::List { status, json } => run_list(&env, status, json).await,
        Command::Show {
            ids,
            rainbow,
            legacy,
            json,
        } => run_show(&env, &ids, Style::rainbow(rainbow), policy(legacy), json).await,
        Command::Resolve(cmd) => run_resolve(&env, cmd).await,
        Command::Poi(cmd) => run_poi(&env, cmd).await,
        Command::Inspect { allocation_id } => {
            let allocation = env
                .network
                .allocation(&allocation_id.to_lowercase())
                .await?
                .ok_or_else(|| Error::NotFound(format!("allocation {}", allocation_id)))?;
            println!("{}", report::to_json(&allocation)?);
            Ok(())
        }
    }
}

async fn run_list(env: &Environment, status: Option<DisputeStatus>, json: bool) -> CliResult {
    let disputes = list_disputes(env.network.as_ref(), status).await?;
    info!(count = disputes.len(), "disputes");
    if json {
        println!("{}", report::to_json(&disputes)?);
    } else {
        print!("{}", report::dispute_table(&disputes));
    }
    Ok(())
}

async fn run_show(
    env: &Environment,
    ids: &[String],
    style: Style,
    policy: ReferencePolicy,
    json: bool,
) -> CliResult {
    let builder = env.references(policy);
    let now = OffsetDateTime::now_utc();
    for id in ids {
        let id = parse_id(id)?;
        let dispute = env
            .network
            .dispute(&id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("dispute {}", id)))?;
        let references = builder.build(&dispute).await?;
        if json {
            println!("{}", report::to_json(&references)?);
        } else {
            println!("{}", report::dispute_tree(&dispute, &references, now, style));
        }
    }
    Ok(())
}

/// Renders the plan on stdout and asks on stdin; `--yes` accepts without asking.
struct TerminalConfirm {
    assume_yes: bool,
    style: Style,
}

impl Confirm for TerminalConfirm {
    fn confirm(&self, plan: &ResolutionPlan) -> bool {
        print!(
            "{}",
            report::resolution_plan(plan, OffsetDateTime::now_utc(), self.style)
        );
        if self.assume_yes {
            return true;
        }
        print!("{} [y/N] ", plan.prompt());
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

fn run_verify(payload: &str, config: &ArbiterConfig) -> CliResult {
    let decoded = verify_payload(payload, config)?;
    print!("{}", report::decoded_call(&decoded));
    Ok(())
}

async fn run_resolve(env: &Environment, cmd: ResolveCommand) -> CliResult {
    let (action, id, opts) = match cmd {
        ResolveCommand::Verify { payload } => return run_verify(&payload, &env.config),
        ResolveCommand::Accept {
            dispute_id,
            tokens_slash,
            opts,
        } => (ResolutionAction::Accept { tokens_slash }, dispute_id, opts),
        ResolveCommand::AcceptConflict {
            dispute_id,
            tokens_slash,
            accept_related,
            tokens_slash_related,
            opts,
        } => (
            ResolutionAction::AcceptConflict {
                tokens_slash,
                accept_related,
                tokens_slash_related,
            },
            dispute_id,
            opts,
        ),
        ResolveCommand::Reject { dispute_id, opts } => (ResolutionAction::Reject, dispute_id, opts),
        ResolveCommand::Draw { dispute_id, opts } => (ResolutionAction::Draw, dispute_id, opts),
    };
    let id = parse_id(&id)?;
    let confirm = TerminalConfirm {
        assume_yes: opts.yes,
        style: Style::rainbow(opts.rainbow),
    };
    let outcome = DisputeResolver::new(env)
        .with_policy(policy(opts.legacy))
        .resolve(action, &id, &confirm, opts.execute)
        .await?;
    println!("{}", report::resolution_outcome(&outcome)?);
    if let ResolutionOutcome::Submitted { receipt } = &outcome {
        if !receipt.success {
            return Err(format!("transaction {} reverted", receipt.tx_hash).into());
        }
    }
    Ok(())
}

async fn run_poi(env: &Environment, cmd: PoiCommand) -> CliResult {
    match cmd {
        PoiCommand::List {
            deployment,
            indexers,
            json,
            rainbow,
        } => {
            let deployment = Deployment::parse(&deployment).map_err(Error::from)?;
            let submissions =
                deployment_submissions(env.network.as_ref(), &deployment, &indexers).await?;
            let groups = group(&submissions);
            if json {
                println!("{}", report::to_json(&groups)?);
            } else {
                print!("{}", report::poi_groups(&groups, Style::rainbow(rainbow)));
            }
        }
        PoiCommand::Query {
            deployment,
            epoch,
            chain,
            indexers,
            json,
            rainbow,
        } => {
            let deployment = Deployment::parse(&deployment).map_err(Error::from)?;
            let epochs = parse_epoch_range(&epoch).map_err(Error::from)?;
            let resolver = env.epochs();
            let rows = env
                .public_query(&resolver)
                .run(&deployment, &epochs, &chain, &indexers)
                .await?;
            if json {
                println!("{}", report::to_json(&rows)?);
            } else {
                print!("{}", report::public_poi_rows(&rows, Style::rainbow(rainbow)));
            }
        }
        PoiCommand::Scan {
            deployment,
            from,
            to,
            indexer,
            target,
            json,
        } => {
            let deployment = Deployment::parse(&deployment).map_err(Error::from)?;
            let scanner = env.scanner();
            if let Some(target) = target {
                let digest = parse_id(&target)?;
                match scanner.find_match(deployment, from, to, &indexer, digest).await {
                    Some(poi) if json => println!("{}", report::to_json(&poi)?),
                    Some(poi) => {
                        println!("match at block {} ({})", poi.block.number, poi.block.hash)
                    }
                    None => println!("no block in [{}, {}) has POI {}", from, to, digest),
                }
                return Ok(());
            }
            let mut rows = Vec::new();
            let summary = scanner
                .scan(deployment, from, to, &indexer, |item| {
                    if json {
                        rows.push(ScanRow::from(&item));
                    } else {
                        println!("{}", report::scan_line(&item));
                    }
                    ScanControl::Continue
                })
                .await;
            if json {
                rows.sort_by_key(|r| r.block_number);
                println!("{}", report::to_json(&rows)?);
            }
            info!(delivered = summary.delivered, "scan complete");
        }
    }
    Ok(())
}
