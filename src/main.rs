use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gcp_reconciler::config::{app_dir, Config};
use gcp_reconciler::gcp::client::{GcpClient, Transport};
use gcp_reconciler::gcp::operation::{GcpOperationPoller, OperationPoller};
use gcp_reconciler::resource::{get_kind, kinds_table, Instance, ReadOutcome, Reconciler, ResourceDef};
use gcp_reconciler::resources::{
    gateway_security_policy::GATEWAY_SECURITY_POLICY,
    global_network_endpoint_group::GLOBAL_NETWORK_ENDPOINT_GROUP,
    network_edge_security_service::NETWORK_EDGE_SECURITY_SERVICE,
    org_security_policy_association::ORG_SECURITY_POLICY_ASSOCIATION,
    region_security_policy::REGION_SECURITY_POLICY, url_list::URL_LIST,
};
use gcp_reconciler::state::{ResourceEntry, StateStore};
use gcp_reconciler::ReconcileError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Version injected at compile time via GCPR_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("GCPR_VERSION") {
    Some(v) => v,
    None => "dev",
};

/// Declarative reconciler for GCP resources
#[derive(Parser, Debug)]
#[command(name = "gcpr", version = VERSION, about, long_about = None)]
struct Args {
    /// GCP project for resources that leave it out
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// GCP region for resources that leave it out
    #[arg(short, long, global = true)]
    region: Option<String>,

    /// Project billed for API quota
    #[arg(long, global = true)]
    billing_project: Option<String>,

    /// Directory holding state.json
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List supported resource kinds
    Kinds,
    /// Create a resource from a YAML spec
    Create {
        kind: String,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Read a resource and print its attributes
    Read { kind: String, id: String },
    /// Update a tracked resource to match a YAML spec
    Update {
        kind: String,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Delete a resource
    Delete { kind: String, id: String },
    /// Adopt an existing resource by its external identifier
    Import { kind: String, id: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Cannot open log file {:?}: {}", log_path, e);
            return None;
        },
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(format!(
            "gcp_reconciler={0},gcpr={0}",
            tracing_level
        )))
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("gcpr {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    app_dir().join("gcpr.log")
}

/// Collaborators shared by every command
struct Session {
    transport: Arc<dyn Transport>,
    poller: Arc<dyn OperationPoller>,
    config: Config,
    store: StateStore,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = setup_logging(args.log_level);

    let config = Config::load().with_overrides(
        args.project,
        args.region,
        args.billing_project,
        args.state_dir,
    );

    let (kind, action) = match args.command {
        Command::Kinds => {
            print!("{}", kinds_table());
            return Ok(());
        },
        Command::Create { kind, file } => (kind, Action::Create(file)),
        Command::Read { kind, id } => (kind, Action::Read(id)),
        Command::Update { kind, file } => (kind, Action::Update(file)),
        Command::Delete { kind, id } => (kind, Action::Delete(id)),
        Command::Import { kind, id } => (kind, Action::Import(id)),
    };

    if get_kind(&kind).is_none() {
        bail!("unknown kind {:?}; run 'gcpr kinds' for the list", kind);
    }

    let client = GcpClient::from_environment().await?;
    let transport: Arc<dyn Transport> = Arc::new(client);
    let poller: Arc<dyn OperationPoller> = Arc::new(GcpOperationPoller::new(
        transport.clone(),
        config.base_paths(),
        config.billing_project.clone(),
        config.poll_settings(),
    ));
    let store = StateStore::new(config.effective_state_dir());
    let ctx = Session {
        transport,
        poller,
        config,
        store,
    };

    let lock = ctx.store.lock().await?;
    let result = match kind.as_str() {
        k if k == NETWORK_EDGE_SECURITY_SERVICE.kind => {
            run(&NETWORK_EDGE_SECURITY_SERVICE, &ctx, action).await
        },
        k if k == REGION_SECURITY_POLICY.kind => run(&REGION_SECURITY_POLICY, &ctx, action).await,
        k if k == GLOBAL_NETWORK_ENDPOINT_GROUP.kind => {
            run(&GLOBAL_NETWORK_ENDPOINT_GROUP, &ctx, action).await
        },
        k if k == ORG_SECURITY_POLICY_ASSOCIATION.kind => {
            run(&ORG_SECURITY_POLICY_ASSOCIATION, &ctx, action).await
        },
        k if k == URL_LIST.kind => run(&URL_LIST, &ctx, action).await,
        k if k == GATEWAY_SECURITY_POLICY.kind => run(&GATEWAY_SECURITY_POLICY, &ctx, action).await,
        other => Err(anyhow::anyhow!("kind {:?} has no command handler", other)),
    };
    lock.release().await?;

    result.map_err(with_hint)
}

enum Action {
    Create(PathBuf),
    Read(String),
    Update(PathBuf),
    Delete(String),
    Import(String),
}

async fn run<S>(def: &'static ResourceDef<S>, ctx: &Session, action: Action) -> Result<()>
where
    S: Clone + Default + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    let reconciler = Reconciler::new(
        def,
        ctx.transport.clone(),
        ctx.poller.clone(),
        ctx.config.provider_defaults(),
        ctx.config.base_paths(),
    );
    let mut state = ctx.store.load().await?;

    match action {
        Action::Create(file) => {
            let mut instance = Instance::new(load_spec::<S>(&file)?);
            reconciler.create(&mut instance).await?;
            let id = tracked_id(&instance)?;
            state.set(id.clone(), ResourceEntry::new(def.kind, &instance.spec)?);
            println!("Created {}", id);
        },
        Action::Read(id) => {
            let spec = stored_spec::<S>(&state, &id)?.unwrap_or_default();
            let mut instance = Instance::existing(id.clone(), spec);
            match reconciler.read(&mut instance).await? {
                ReadOutcome::Found => {
                    print!("{}", serde_yaml::to_string(&instance.spec)?);
                    state.set(id, ResourceEntry::new(def.kind, &instance.spec)?);
                },
                ReadOutcome::NotFound => {
                    state.remove(&id);
                    println!("{} not found", id);
                },
            }
        },
        Action::Update(file) => {
            let desired = load_spec::<S>(&file)?;
            let id = reconciler.id_for(&desired)?;
            let Some(current) = stored_spec::<S>(&state, &id)? else {
                bail!("{} is not tracked; import it first", id);
            };
            let mut instance = Instance::existing(id.clone(), current);
            let updated = reconciler.update(&mut instance, desired).await;
            if let Err(ReconcileError::Conflict { .. }) = &updated {
                // Refresh so the next attempt carries the current fingerprint
                if let Ok(ReadOutcome::Found) = reconciler.read(&mut instance).await {
                    state.set(id.clone(), ResourceEntry::new(def.kind, &instance.spec)?);
                    ctx.store.save(&state).await?;
                }
            }
            updated?;
            state.set(id.clone(), ResourceEntry::new(def.kind, &instance.spec)?);
            println!("Updated {}", id);
        },
        Action::Delete(id) => {
            let spec = stored_spec::<S>(&state, &id)?.unwrap_or_default();
            let mut instance = Instance::existing(id.clone(), spec);
            let deleted = reconciler.delete(&mut instance).await;
            if instance.id.is_none() {
                state.remove(&id);
            }
            ctx.store.save(&state).await?;
            deleted?;
            println!("Deleted {}", id);
            return Ok(());
        },
        Action::Import(external_id) => {
            let mut instance = reconciler.import(&external_id)?;
            let id = tracked_id(&instance)?;
            if reconciler.read(&mut instance).await? == ReadOutcome::NotFound {
                bail!("{} does not exist", id);
            }
            state.set(id.clone(), ResourceEntry::new(def.kind, &instance.spec)?);
            println!("Imported {}", id);
        },
    }

    ctx.store.save(&state).await
}

fn load_spec<S: DeserializeOwned>(path: &Path) -> Result<S> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn stored_spec<S: DeserializeOwned>(
    state: &gcp_reconciler::state::State,
    id: &str,
) -> Result<Option<S>> {
    state.get(id).map(|entry| entry.spec::<S>()).transpose()
}

fn tracked_id<S>(instance: &Instance<S>) -> Result<String> {
    instance
        .id
        .clone()
        .context("resource has no id after a successful call")
}

fn with_hint(err: anyhow::Error) -> anyhow::Error {
    let hint = err
        .downcast_ref::<ReconcileError>()
        .and_then(|e| e.transport_error())
        .map(|t| t.hint());
    match hint {
        Some(hint) => err.context(hint),
        None => err,
    }
}
