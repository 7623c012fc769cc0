use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use runnable::api::{ErrorResponse, GetJobResponse, StartJobRequest, StartJobResponse};
use runnable::config::{ServerConfig, DEFAULT_OWNER_HEADER};
use runnable::server::Server;
use runnable::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "runnable")]
#[command(version)]
#[command(about = "Run OS commands as managed jobs and collect their output")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the job server
    Server(ServerArgs),

    /// Job management commands
    Job {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: JobCommands,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address for the HTTP API
    #[arg(long, env = "RUNNABLE_LISTEN", default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Directory for job output files
    #[arg(long, env = "RUNNABLE_LOG_DIR", default_value = "logs")]
    log_dir: PathBuf,

    /// Header carrying the authenticated client identity, set by the mTLS
    /// terminator in front of this server
    #[arg(long, env = "RUNNABLE_OWNER_HEADER", default_value = DEFAULT_OWNER_HEADER)]
    owner_header: String,

    /// Keep job output files after the server exits
    #[arg(long, env = "RUNNABLE_RETAIN_LOGS")]
    retain_logs: bool,

    /// How long to keep collecting output after a process exits (ms)
    #[arg(long, env = "RUNNABLE_DRAIN_TIMEOUT_MS", default_value = "2000")]
    drain_timeout_ms: u64,
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Server address
    #[arg(long, short = 'a', env = "RUNNABLE_ADDR", default_value = "http://127.0.0.1:8080")]
    addr: String,

    /// Identity to present to the server
    #[arg(long, env = "RUNNABLE_OWNER")]
    owner: String,

    /// Header used to present the identity
    #[arg(long, default_value = DEFAULT_OWNER_HEADER)]
    owner_header: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// Job Commands
// =============================================================================

#[derive(clap::Subcommand, Debug)]
enum JobCommands {
    /// Start a new job
    Start {
        /// Program and arguments (e.g., "ls -la /tmp")
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Stop a running job
    Stop {
        /// The job ID (UUID)
        job_id: String,
    },
    /// Get status of a job
    Status {
        /// The job ID (UUID)
        job_id: String,
    },
    /// Print the output a job has produced so far
    Logs {
        /// The job ID (UUID)
        job_id: String,
    },
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct JobStatusOutput {
    job_id: String,
    #[serde(flatten)]
    status: GetJobResponse,
}

#[derive(Serialize)]
struct JobLogsOutput {
    job_id: String,
    logs: String,
}

// =============================================================================
// HTTP Client
// =============================================================================

struct JobClient {
    http: reqwest::Client,
    base: String,
    owner_header: String,
    owner: String,
}

impl JobClient {
    fn new(args: &ClientArgs) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: args.addr.trim_end_matches('/').to_string(),
            owner_header: args.owner_header.clone(),
            owner: args.owner.clone(),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{}", self.base, path))
            .header(&self.owner_header, &self.owner)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{}", self.base, path))
            .header(&self.owner_header, &self.owner)
    }

    async fn send(
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, Box<dyn std::error::Error>> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };
        Err(format!("{} ({})", message, status).into())
    }
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::new(args.listen, args.log_dir)
        .with_owner_header(args.owner_header)
        .with_retained_logs(args.retain_logs)
        .with_output_drain_timeout(Duration::from_millis(args.drain_timeout_ms));

    if config.retain_logs_on_shutdown {
        tracing::info!("Job output will be kept after shutdown");
    }

    let shutdown = install_shutdown_handler();
    let server = Server::new(config).await?;
    server.run(shutdown).await?;

    tracing::info!("Server stopped");
    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn handle_job_start(
    client: &JobClient,
    command: Vec<String>,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    // Re-quote so arguments with spaces survive the server-side split.
    let request = StartJobRequest {
        command: shell_words::join(&command),
    };
    let response: StartJobResponse = JobClient::send(client.post("/job").json(&request))
        .await?
        .json()
        .await?;

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Table => {
            println!("Job started successfully!");
            println!("Job ID: {}", response.job_id);
        }
    }
    Ok(())
}

async fn handle_job_stop(
    client: &JobClient,
    job_id: String,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    JobClient::send(client.post(&format!("/job/{}/stop", job_id))).await?;

    match output_format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({ "job_id": job_id, "stopped": true })
            );
        }
        OutputFormat::Table => println!("Job {} stopped", job_id),
    }
    Ok(())
}

async fn handle_job_status(
    client: &JobClient,
    job_id: String,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let status: GetJobResponse = JobClient::send(client.get(&format!("/job/{}", job_id)))
        .await?
        .json()
        .await?;

    match output_format {
        OutputFormat::Json => {
            let output = JobStatusOutput { job_id, status };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Job ID:    {}", job_id);
            println!("State:     {}", status.state);
            if status.state.is_terminal() {
                println!("Exit Code: {}", status.exit_code);
            }
            if let Some(start) = status.start_time {
                println!("Started:   {}", start.to_rfc3339());
            }
            if let Some(end) = status.end_time {
                println!("Ended:     {}", end.to_rfc3339());
            }
        }
    }
    Ok(())
}

async fn handle_job_logs(
    client: &JobClient,
    job_id: String,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let logs = JobClient::send(client.get(&format!("/job/{}/logs", job_id)))
        .await?
        .bytes()
        .await?;

    match output_format {
        OutputFormat::Json => {
            let output = JobLogsOutput {
                job_id,
                logs: String::from_utf8_lossy(&logs).into_owned(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&logs)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

async fn run_job_command(
    args: ClientArgs,
    command: JobCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = JobClient::new(&args);

    match command {
        JobCommands::Start { command } => handle_job_start(&client, command, &args.output).await,
        JobCommands::Stop { job_id } => handle_job_stop(&client, job_id, &args.output).await,
        JobCommands::Status { job_id } => handle_job_status(&client, job_id, &args.output).await,
        JobCommands::Logs { job_id } => handle_job_logs(&client, job_id, &args.output).await,
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            run_server(server_args).await?;
        }
        Commands::Job { client, command } => {
            if let Err(e) = run_job_command(client, command).await {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
