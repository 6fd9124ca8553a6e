use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use claim_ledger::{ClaimStore, MemoryClaimStore};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use lucky_carousel::assets::{AssetCache, FsAssetSource};
use lucky_carousel::auth::{AuthState, UserProfile};
use lucky_carousel::catalog::Catalog;
use lucky_carousel::claims::ClaimBoard;
use lucky_carousel::config::{ClaimBackend, Configuration, WinnerTrigger};
use lucky_carousel::events::ClaimCommand;
use lucky_carousel::sheets::SheetsClaimStore;
use lucky_carousel::show::{ShowView, simulate};
use lucky_carousel::tasks::orchestrator::{self, ShowSettings};
use lucky_carousel::tasks::presenter::{self, LogPresenter};
use lucky_carousel::tasks::transition::TransitionEngine;
use lucky_carousel::tasks::{claims, console};

#[derive(Debug, Parser)]
#[command(
    name = "lucky-carousel",
    version,
    about = "Event slideshow that ends in a lucky-number winner reveal"
)]
struct Cli {
    /// Path to YAML config
    #[arg(value_name = "CONFIG", default_value = "config.yaml")]
    config: PathBuf,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
    /// Deterministic RNG seed for transitions, recap pacing and flash picks
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,
    /// Print the show's event sequence without timers and exit
    #[arg(long = "plan", value_name = "STEPS")]
    plan: Option<usize>,
    /// Signed-in display name used for claims
    #[arg(long, value_name = "NAME", requires = "email")]
    user: Option<String>,
    /// E-mail of the signed-in user, checked against the allowed domain
    #[arg(long, value_name = "EMAIL", requires = "user")]
    email: Option<String>,
    /// Skip the recap and reveal the winner this long after the show starts
    #[arg(long = "stop-after", value_name = "DURATION", value_parser = humantime::parse_duration)]
    stop_after: Option<Duration>,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,lucky_carousel={level},claim_ledger={level}"
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let result = runtime.block_on(run(cli));
    // The console reads stdin on a blocking thread that only returns on input.
    runtime.shutdown_timeout(Duration::from_millis(250));
    result
}

async fn run(cli: Cli) -> Result<()> {
    let mut cfg = Configuration::from_yaml_file(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    if let Some(after) = cli.stop_after {
        cfg.winner_trigger = WinnerTrigger::AfterDuration { after };
    }
    cfg.claims.apply_env();
    let cfg = cfg.validated().context("invalid configuration values")?;
    info!(
        config = %cli.config.display(),
        trigger = ?cfg.winner_trigger,
        assets = %cfg.assets.root.display(),
        "configuration loaded"
    );

    let catalog = Arc::new(Catalog::load(&cfg).context("failed to build catalog")?);
    let seed = cli.seed.unwrap_or_else(rand::random);

    if let Some(steps) = cli.plan {
        println!(
            "# show plan\n# slides: {}\n# winner: {}\n# seed: {}\n",
            catalog.len(),
            catalog
                .winner_index()
                .and_then(|idx| catalog.get(idx))
                .map_or("(none)", |item| item.display_name.as_str()),
            seed
        );
        for step in simulate(catalog.clone(), cfg.winner_trigger, seed, steps) {
            println!("{step}");
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let source = Arc::new(FsAssetSource::new(&cfg.assets.root));
    let cache = Arc::new(AssetCache::new(source, cfg.assets.load_timeout));
    let engine = TransitionEngine::new(cache, cfg.transition.frame_interval);
    let (view_tx, view_rx) = watch::channel(ShowView::default());

    let mut tasks = JoinSet::new();

    // Presenter
    tasks.spawn({
        let catalog = catalog.clone();
        let surfaces_rx = engine.subscribe();
        let cancel = cancel.clone();
        async move {
            presenter::run(catalog, LogPresenter::default(), view_rx, surfaces_rx, cancel)
                .await
                .context("presenter task failed")
        }
    });

    // Show
    tasks.spawn({
        let catalog = catalog.clone();
        let settings = ShowSettings::from_config(&cfg);
        let cancel = cancel.clone();
        async move {
            orchestrator::run(catalog, settings, engine, view_tx, cancel, seed)
                .await
                .context("show task failed")
        }
    });

    // Number board
    let auth = sign_in(&cli, &cfg);
    let board_tx = match cfg.claims.backend() {
        ClaimBackend::Sheet(settings) => match SheetsClaimStore::new(settings, cfg.claims.number_range()) {
            Ok(store) => Some(spawn_board(&mut tasks, store, auth, &cfg, &cancel)),
            Err(err) => {
                warn!("claim sheet unavailable, number board disabled: {err}");
                None
            }
        },
        ClaimBackend::Local => {
            info!("claims kept in memory for this session");
            let store = Arc::new(MemoryClaimStore::new());
            Some(spawn_board(&mut tasks, store, auth, &cfg, &cancel))
        }
        ClaimBackend::Disabled { missing } => {
            warn!(?missing, "claim sheet not configured; number board disabled");
            None
        }
    };

    if let Some(board_tx) = board_tx {
        if std::io::stdin().is_terminal() {
            let cancel = cancel.clone();
            tasks.spawn(async move {
                console::run(tokio::io::stdin(), board_tx, cancel)
                    .await
                    .context("console task failed")
            });
        } else {
            debug!("stdin is not a terminal; console disabled");
        }
    }

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!("{err:#}");
                cancel.cancel();
            }
            Err(err) => {
                error!("task panicked: {err}");
                cancel.cancel();
            }
        }
    }
    info!("shut down cleanly");
    Ok(())
}

fn sign_in(cli: &Cli, cfg: &Configuration) -> AuthState {
    if cfg.claims.client_id.is_none() {
        debug!("no sign-in client id configured; relying on command-line identity");
    }
    match (&cli.user, &cli.email) {
        (Some(name), Some(email)) => {
            let profile = UserProfile {
                sub: email.clone(),
                name: name.clone(),
                email: email.clone(),
                picture: None,
            };
            let auth = AuthState::from_profile(&profile, cfg.claims.allowed_domain.as_deref());
            match &auth.auth_error {
                Some(message) => warn!("{message}"),
                None => info!(user = %name, "signed in"),
            }
            auth
        }
        _ => {
            info!("not signed in; number selection disabled");
            AuthState::signed_out()
        }
    }
}

fn spawn_board<S>(
    tasks: &mut JoinSet<Result<()>>,
    store: S,
    auth: AuthState,
    cfg: &Configuration,
    cancel: &CancellationToken,
) -> mpsc::Sender<ClaimCommand>
where
    S: ClaimStore + 'static,
{
    let (tx, rx) = mpsc::channel::<ClaimCommand>(16);
    let mut board = ClaimBoard::new(store, cfg.claims.number_range());
    board.set_auth(auth);
    let poll = cfg.claims.poll_interval;
    let cancel = cancel.clone();
    tasks.spawn(async move {
        claims::run(board, rx, poll, cancel)
            .await
            .context("claims task failed")
    });
    tx
}
