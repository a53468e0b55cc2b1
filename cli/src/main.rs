mod logging;
mod output;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use common::{Credential, ExecutionRecord, ExecutionStatus, JobRequest};
use runner::{
    validate_connection, Config, ConfigStore, GeminiIntentParser, HistoryStore, IntentParser,
    JobExecutionClient, StatsCollector,
};
use std::path::PathBuf;
use std::process::ExitCode;

/// Some job run failed or never reported back.
const EXIT_RUN_FAILED: u8 = 1;
/// The prompt could not be turned into a job request.
const EXIT_INTENT_FAILED: u8 = 2;

#[derive(Parser)]
#[command(author, version, about = "Trigger SAP Data Services batch jobs", long_about = None)]
struct Cli {
    /// Config file (.yaml, .yml or .toml)
    #[arg(long, global = true, env = "DSRUNNER_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ModeArgs {
    /// Simulate the run without contacting the server
    #[arg(long, conflicts_with = "live")]
    simulate: bool,
    /// Call the configured REST endpoint
    #[arg(long)]
    live: bool,
}

impl ModeArgs {
    fn simulate(&self, default: bool) -> bool {
        if self.simulate {
            true
        } else if self.live {
            false
        } else {
            default
        }
    }
}

#[derive(Args)]
struct TargetArgs {
    /// Repository the job belongs to
    #[arg(long)]
    repo: Option<String>,
    /// Job server to dispatch to
    #[arg(long)]
    job_server: Option<String>,
    /// Server group
    #[arg(long)]
    server_group: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one or more jobs
    Run {
        /// Job name; repeat to run several jobs at once
        #[arg(short, long = "job", required = true)]
        jobs: Vec<String>,
        /// Global variable, e.g. --var '$G_Region=NA'
        #[arg(short = 'v', long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        mode: ModeArgs,
        /// Print records as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Describe a job run in plain language and let the AI assistant fill in the details
    Ask {
        /// e.g. "Run the daily sales load for region NA and fiscal year 2024"
        prompt: String,
        /// Execute the parsed job right away
        #[arg(long)]
        run: bool,
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        mode: ModeArgs,
    },
    /// View execution history
    History {
        /// Only this job
        #[arg(long)]
        job: Option<String>,
        /// Number of entries
        #[arg(short, long)]
        limit: Option<usize>,
        /// Include request and response payloads
        #[arg(long)]
        details: bool,
        /// Write the entries to a CSV file instead of printing them
        #[arg(long, value_name = "FILE")]
        export: Option<PathBuf>,
        /// Delete all history
        #[arg(long, conflicts_with_all = ["export", "job"])]
        clear: bool,
    },
    /// Execution totals per job
    Stats {
        /// Prometheus text format
        #[arg(long)]
        prometheus: bool,
    },
    /// Show or change connection settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum AuthArg {
    Basic,
    Token,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current settings (secrets hidden)
    Show,
    /// Print the config file location
    Path,
    /// Update settings and save them
    Set {
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        cms: Option<String>,
        #[arg(long, value_enum)]
        auth: Option<AuthArg>,
        #[arg(long)]
        username: Option<String>,
        /// Password for basic auth, session token for token auth
        #[arg(long)]
        secret: Option<String>,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        job_server: Option<String>,
        #[arg(long)]
        server_group: Option<String>,
        /// Default mode for run/ask
        #[arg(long)]
        simulate: Option<bool>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let store = ConfigStore::new(cli.config.clone().unwrap_or_else(ConfigStore::default_path));

    let loaded = store.load();
    let logging_config = loaded.as_ref().map(|c| c.logging.clone()).unwrap_or_default();
    logging::setup_logging(&logging_config)?;

    let editing = matches!(cli.command, Commands::Config { .. });
    let mut config = settle_config(loaded, editing)?;
    if !editing {
        config.apply_env();
    }

    match cli.command {
        Commands::Run { jobs, vars, target, mode, json } => {
            let variables = common::parse_variables(&vars)?;
            let requests = jobs
                .iter()
                .map(|job| -> anyhow::Result<JobRequest> {
                    Ok(build_request(job, &target, &config)?.with_variables(variables.clone()))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            dispatch(&config, mode.simulate(config.runner.simulate), requests, json).await
        }
        Commands::Ask { prompt, run, target, mode } => {
            let parser = GeminiIntentParser::from_config(&config.intent);
            let parsed = match parser.parse(&prompt, &config.runner.known_jobs).await {
                Ok(parsed) => parsed,
                Err(e) => {
                    eprintln!("Intent parsing failed: {}", e);
                    return Ok(ExitCode::from(EXIT_INTENT_FAILED));
                }
            };
            output::print_parsed(&parsed);
            if !run {
                return Ok(ExitCode::SUCCESS);
            }
            let variables = parsed.to_variables();
            let request = build_request(&parsed.job_name, &target, &config)?.with_variables(variables);
            dispatch(&config, mode.simulate(config.runner.simulate), vec![request], false).await
        }
        Commands::History { job, limit, details, export, clear } => {
            let history = open_history(&config)?;
            if clear {
                let removed = history.clear()?;
                println!("Removed {} history entries.", removed);
                return Ok(ExitCode::SUCCESS);
            }
            let limit = limit.unwrap_or(config.history.default_limit);
            let records = match job {
                Some(job) => history.for_job(&job, limit)?,
                None => history.recent(limit)?,
            };
            match export {
                Some(path) => {
                    output::export_csv(&records, &path)?;
                    println!("Exported {} entries to {}", records.len(), path.display());
                }
                None => output::print_history(&records, details),
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Stats { prometheus } => {
            let records = open_history(&config)?.all()?;
            let stats = StatsCollector::from_records(&records);
            if prometheus {
                print!("{}", stats.export());
            } else {
                output::print_stats(&stats.summary(), &stats.per_job());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { action } => config_command(&store, config, action),
    }
}

/// A broken config file falls back to defaults for running jobs, but is never
/// edited, since saving would overwrite it.
fn settle_config(loaded: anyhow::Result<Config>, editing: bool) -> anyhow::Result<Config> {
    match loaded {
        Ok(config) => Ok(config),
        Err(e) if editing => Err(e.context("Refusing to overwrite a config file that does not parse")),
        Err(e) => {
            log::error!("Failed to load config, using defaults: {:#}", e);
            Ok(Config::default())
        }
    }
}

/// 0 only when every requested run came back successful.
fn run_exit_code(records: &[ExecutionRecord], requested: usize) -> u8 {
    let all_ok = records.len() == requested
        && records.iter().all(|r| r.status == ExecutionStatus::Success);
    if all_ok {
        0
    } else {
        EXIT_RUN_FAILED
    }
}

fn build_request(job: &str, target: &TargetArgs, config: &Config) -> anyhow::Result<JobRequest> {
    let repo = target.repo.as_deref().unwrap_or(&config.runner.repository);
    let job_server = target.job_server.as_deref().unwrap_or(&config.runner.job_server);
    let server_group = target.server_group.clone().or_else(|| config.runner.server_group.clone());
    Ok(JobRequest::new(job, repo, job_server)?.with_server_group(server_group))
}

fn open_history(config: &Config) -> anyhow::Result<HistoryStore> {
    let path = config.history.resolve_db_path();
    HistoryStore::open(&path).with_context(|| format!("History unavailable at {:?}", path))
}

async fn dispatch(
    config: &Config,
    simulate: bool,
    requests: Vec<JobRequest>,
    as_json: bool,
) -> anyhow::Result<ExitCode> {
    if !simulate {
        validate_connection(&config.connection)
            .context("Connection settings incomplete; use `dsrunner config set` or --simulate")?;
    }

    // History is best effort: a run still goes ahead without it.
    let history = match open_history(config) {
        Ok(history) => Some(history),
        Err(e) => {
            log::error!("{:#}", e);
            None
        }
    };

    let client = JobExecutionClient::for_mode(simulate, config)?;
    let requested = requests.len();
    let records: Vec<ExecutionRecord> = if requested == 1 {
        vec![client.execute(&config.connection, &requests[0]).await]
    } else {
        client.execute_all(&config.connection, requests).await
    };

    for record in &records {
        if let Some(history) = &history {
            if let Err(e) = history.record(record) {
                log::error!("Failed to save execution {}: {:#}", record.id, e);
            }
        }
        output::print_record(record, as_json);
    }

    Ok(ExitCode::from(run_exit_code(&records, requested)))
}

fn config_command(store: &ConfigStore, mut config: Config, action: ConfigAction) -> anyhow::Result<ExitCode> {
    match action {
        ConfigAction::Path => println!("{}", store.path().display()),
        ConfigAction::Show => output::print_config(&config, store.path()),
        ConfigAction::Set {
            base_url,
            cms,
            auth,
            username,
            secret,
            repo,
            job_server,
            server_group,
            simulate,
        } => {
            let conn = &mut config.connection;
            if let Some(url) = base_url {
                conn.base_url = url;
            }
            if let Some(cms) = cms {
                conn.cms_system = cms;
            }
            let current = std::mem::take(&mut conn.credential);
            conn.credential = update_credential(current, auth, username, secret)?;
            if let Some(repo) = repo {
                config.runner.repository = repo;
            }
            if let Some(job_server) = job_server {
                config.runner.job_server = job_server;
            }
            if let Some(group) = server_group {
                config.runner.server_group = Some(group).filter(|g| !g.is_empty());
            }
            if let Some(simulate) = simulate {
                config.runner.simulate = simulate;
            }
            store.save(&config)?;
            println!("Saved configuration to {}", store.path().display());
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Switching auth mode keeps the stored secret, and the username when going back to basic.
fn update_credential(
    current: Credential,
    auth: Option<AuthArg>,
    username: Option<String>,
    secret: Option<String>,
) -> anyhow::Result<Credential> {
    let carried_secret = current.secret().to_string();
    let carried_user = current.username().map(str::to_string);
    let mut credential = match auth {
        Some(AuthArg::Token) => Credential::Token { token: carried_secret },
        Some(AuthArg::Basic) => Credential::Basic {
            username: carried_user.unwrap_or_else(|| common::DEFAULT_USERNAME.to_string()),
            password: carried_secret,
        },
        None => current,
    };
    if let Some(username) = username {
        match &mut credential {
            Credential::Basic { username: u, .. } => *u = username,
            Credential::Token { .. } => bail!("--username only applies to basic auth"),
        }
    }
    if let Some(secret) = secret {
        credential = credential.with_secret(secret);
    }
    Ok(credential)
}
