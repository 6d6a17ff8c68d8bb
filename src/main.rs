use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use senex::api::{self, ApiClient};
use senex::config::{load_daemon_config, ProxyEngine, Settings};
use senex::host::Hooks;
use senex::instance::InstanceView;
use senex::jobs::{JobRecord, JobStatus};
use senex::paths::{config_path, ensure_data_dir, get_data_dir, state_path};
use senex::proxy;
use senex::registry::{GuardClass, Registry};
use senex::{AppError, ControlPlane, Result};

const WAIT_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "senex", version, about = "Tenant instance control plane")]
struct Cli {
    /// Data directory holding state.json and senex.toml.
    #[arg(long, global = true, env = "SENEX_HOME")]
    home: Option<PathBuf>,

    /// Daemon config file.
    #[arg(long, global = true, env = "SENEX_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the daemon API.
    #[arg(long, global = true, env = "SENEX_API", default_value = "http://127.0.0.1:7080")]
    api: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon.
    Serve {
        /// Override the bind address from the config file.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Show guards, errors, dependencies and instances.
    Status,
    /// List instances.
    List,
    /// Show one instance.
    Show { name: String },
    /// Build a new instance.
    Create {
        name: String,
        #[arg(long)]
        human_name: Option<String>,
        #[command(flatten)]
        wait: WaitArgs,
    },
    /// Change an instance's display name.
    Edit {
        name: String,
        /// Omit to clear the display name.
        #[arg(long)]
        human_name: Option<String>,
    },
    Start {
        name: String,
        #[command(flatten)]
        wait: WaitArgs,
    },
    Stop {
        name: String,
        #[command(flatten)]
        wait: WaitArgs,
    },
    /// Retry the build of an instance whose build failed.
    Rebuild {
        name: String,
        #[command(flatten)]
        wait: WaitArgs,
    },
    /// Remove leftover storage of an unbuilt instance.
    Cleanup {
        name: String,
        #[command(flatten)]
        wait: WaitArgs,
    },
    /// Show a job.
    Job {
        id: Uuid,
        #[command(flatten)]
        wait: WaitArgs,
    },
    /// Show or change host settings.
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Show probed dependencies.
    Deps {
        /// Re-probe even if the cached result is fresh.
        #[arg(long)]
        refresh: bool,
    },
    /// Run the dependency installer.
    InstallDeps {
        #[command(flatten)]
        wait: WaitArgs,
    },
    /// Release a guard left held by a crashed job.
    GuardClear { class: GuardClass },
    /// Print the proxy config for the current state without contacting the daemon.
    Render,
}

#[derive(Args)]
struct WaitArgs {
    /// Poll the job until it finishes.
    #[arg(long)]
    wait: bool,
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Show the current snapshot.
    Show,
    /// Commit changed settings as a new snapshot.
    Set(SettingsArgs),
    /// List the snapshot chain.
    History,
}

#[derive(Args)]
struct SettingsArgs {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    scheme: Option<String>,
    #[arg(long)]
    listen_port: Option<u16>,
    #[arg(long)]
    port_base: Option<u16>,
    #[arg(long)]
    proxy_engine: Option<ProxyEngine>,
    #[arg(long)]
    proxy_config_path: Option<PathBuf>,
    #[arg(long)]
    storage_root: Option<PathBuf>,
    #[arg(long)]
    db_user: Option<String>,
    #[arg(long)]
    db_password_env: Option<String>,
    /// Re-probe dependencies after committing.
    #[arg(long)]
    refresh: bool,
}

impl SettingsArgs {
    fn apply(self, settings: &mut Settings) {
        if let Some(host) = self.host {
            settings.host = host;
        }
        if let Some(scheme) = self.scheme {
            settings.scheme = scheme;
        }
        if let Some(port) = self.listen_port {
            settings.listen_port = port;
        }
        if let Some(base) = self.port_base {
            settings.port_base = base;
        }
        if let Some(engine) = self.proxy_engine {
            settings.proxy_engine = engine;
        }
        if let Some(path) = self.proxy_config_path {
            settings.proxy_config_path = path;
        }
        if let Some(root) = self.storage_root {
            settings.storage_root = root;
        }
        if let Some(user) = self.db_user {
            settings.credentials.db_user = user;
        }
        if let Some(var) = self.db_password_env {
            settings.credentials.db_password_env = var;
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_instances(instances: &[InstanceView]) {
    if instances.is_empty() {
        println!("No instances");
        return;
    }
    for view in instances {
        let instance = &view.instance;
        let state = match (instance.built, instance.running) {
            (false, _) => "unbuilt",
            (true, false) => "stopped",
            (true, true) => "running",
        };
        println!(
            "{:<20} {:<24} {:>5}  {:<8} {}",
            instance.name,
            instance.namespace,
            instance.port,
            state,
            view.public_url
        );
    }
}

async fn finish_job(client: &ApiClient, record: JobRecord, wait: bool) -> Result<()> {
    let record = if wait {
        client.wait_job(record.id, WAIT_INTERVAL).await?
    } else {
        record
    };
    print_json(&record)?;
    match &record.status {
        JobStatus::Failed { error } => Err(AppError::other(format!(
            "Job {} failed: {}",
            record.id, error.message
        ))),
        _ => Ok(()),
    }
}

async fn serve(data_dir: PathBuf, config: PathBuf, bind: Option<String>) -> Result<()> {
    ensure_data_dir(&data_dir)?;
    let daemon_config = load_daemon_config(&config)?;
    let state = daemon_config
        .state_path
        .clone()
        .unwrap_or_else(|| state_path(&data_dir));
    let registry = Arc::new(Registry::open(state, Settings::defaults_for(&data_dir))?);

    for class in registry.held_guards() {
        log::warn!(
            "Guard {} is still held from a previous run; clear it with `senex guard-clear {}` once no job is running",
            class,
            class
        );
    }

    let hooks = Hooks::from_config(&daemon_config.hooks);
    let plane = Arc::new(ControlPlane::new(registry, hooks));
    let bind = bind.unwrap_or(daemon_config.bind);
    api::serve(plane, &bind).await
}

fn render_offline(data_dir: PathBuf, config: PathBuf) -> Result<()> {
    let daemon_config = load_daemon_config(&config)?;
    let state = daemon_config
        .state_path
        .unwrap_or_else(|| state_path(&data_dir));
    let registry = Registry::open(state, Settings::defaults_for(&data_dir))?;
    let settings = registry.get_current_settings().settings;
    print!("{}", proxy::preview(&registry, &settings));
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let data_dir = cli.home.unwrap_or_else(get_data_dir);
    let config = cli.config.unwrap_or_else(|| config_path(&data_dir));

    let command = match cli.command {
        Command::Serve { bind } => return serve(data_dir, config, bind).await,
        Command::Render => return render_offline(data_dir, config),
        other => other,
    };

    let client = ApiClient::new(&cli.api)?;
    match command {
        Command::Serve { .. } | Command::Render => Ok(()),
        Command::Status => print_json(&client.status().await?),
        Command::List => {
            print_instances(&client.list_instances().await?);
            Ok(())
        }
        Command::Show { name } => print_json(&client.get_instance(&name).await?),
        Command::Create {
            name,
            human_name,
            wait,
        } => {
            let record = client.create_instance(&name, human_name).await?;
            finish_job(&client, record, wait.wait).await
        }
        Command::Edit { name, human_name } => {
            print_json(&client.update_instance(&name, human_name).await?)
        }
        Command::Start { name, wait } => {
            let record = client.instance_action(&name, "start").await?;
            finish_job(&client, record, wait.wait).await
        }
        Command::Stop { name, wait } => {
            let record = client.instance_action(&name, "stop").await?;
            finish_job(&client, record, wait.wait).await
        }
        Command::Rebuild { name, wait } => {
            let record = client.instance_action(&name, "rebuild").await?;
            finish_job(&client, record, wait.wait).await
        }
        Command::Cleanup { name, wait } => {
            let record = client.instance_action(&name, "cleanup").await?;
            finish_job(&client, record, wait.wait).await
        }
        Command::Job { id, wait } => {
            let record = client.job(id).await?;
            finish_job(&client, record, wait.wait).await
        }
        Command::Settings(SettingsCommand::Show) => print_json(&client.current_settings().await?),
        Command::Settings(SettingsCommand::History) => {
            print_json(&client.settings_history().await?)
        }
        Command::Settings(SettingsCommand::Set(args)) => {
            let refresh = args.refresh;
            let mut settings = client.current_settings().await?.settings;
            args.apply(&mut settings);
            print_json(&client.commit_settings(settings, refresh).await?)
        }
        Command::Deps { refresh } => {
            let snapshot = client.dependencies(refresh).await?;
            print_json(&snapshot.dependencies)
        }
        Command::InstallDeps { wait } => {
            let record = client.install_dependencies().await?;
            finish_job(&client, record, wait.wait).await
        }
        Command::GuardClear { class } => print_json(&client.clear_guard(class).await?),
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
