use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, Instrument};
use uuid::Uuid;

use scholar_agent::{
    agents::{DispatchEngine, ResearchAssistant},
    config::Config,
    deploy::AgentEngineClient,
    models::ConversationState,
    search::SerpApiClient,
    utils::init_logger,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Research assistant for Google Scholar papers, authors and news", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start an interactive conversation
    Chat,
    /// Answer a single message with a fresh conversation
    Ask {
        /// The message to answer
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
    /// Manage hosted deployments
    Deploy(DeployArgs),
}

#[derive(Args, Debug)]
struct DeployArgs {
    /// List all deployments
    #[arg(long)]
    list: bool,

    /// Create a new deployment
    #[arg(long, conflicts_with = "delete")]
    create: bool,

    /// Delete an existing deployment (requires --resource-id)
    #[arg(long, requires = "resource_id")]
    delete: bool,

    /// Deployment resource id or full resource name
    #[arg(long)]
    resource_id: Option<String>,

    /// Display name for --create
    #[arg(long, default_value = "scholar-agent")]
    display_name: String,

    /// Overrides GOOGLE_CLOUD_PROJECT
    #[arg(long)]
    project_id: Option<String>,

    /// Overrides GOOGLE_CLOUD_LOCATION
    #[arg(long)]
    location: Option<String>,

    /// Overrides GOOGLE_CLOUD_STORAGE_BUCKET
    #[arg(long)]
    bucket: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Chat => chat(&config).await,
        Command::Ask { message } => {
            let assistant = build_assistant(&config)?;
            let mut state = ConversationState::new();
            let reply = assistant.respond(&message.join(" "), &mut state).await;
            println!("{}", reply);
            Ok(())
        }
        Command::Deploy(args) => deploy(config, args).await,
    }
}

fn build_assistant(config: &Config) -> anyhow::Result<ResearchAssistant> {
    let provider = SerpApiClient::from_config(&config.search)
        .context("Missing required environment variable: SERPAPI_API_KEY")?;
    let engine = DispatchEngine::from_config(Arc::new(provider), &config.dispatch);
    Ok(ResearchAssistant::new(engine))
}

async fn chat(config: &Config) -> anyhow::Result<()> {
    let assistant = build_assistant(config)?;
    let session_id = Uuid::new_v4();
    let span = tracing::info_span!("session", id = %session_id);

    async move {
        info!("Conversation started");
        let mut state = ConversationState::new();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        println!("Ask about a research topic or an author. Type 'exit' to quit.\n");
        loop {
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let line = line.trim();
            if matches!(line, "exit" | "quit") {
                break;
            }
            if line.is_empty() {
                continue;
            }

            let reply = assistant.respond(line, &mut state).await;
            println!("\n{}\n", reply);
        }

        info!("Conversation ended");
        Ok::<(), anyhow::Error>(())
    }
    .instrument(span)
    .await
}

async fn deploy(mut config: Config, args: DeployArgs) -> anyhow::Result<()> {
    if let Some(project_id) = args.project_id {
        config.deploy.project_id = Some(project_id);
    }
    if let Some(location) = args.location {
        config.deploy.location = Some(location);
    }
    if let Some(bucket) = args.bucket {
        config.deploy.bucket = Some(bucket);
    }

    let client = AgentEngineClient::from_config(&config.deploy)?;
    let target = client.target();
    info!(
        project = %target.project_id,
        location = %target.location,
        bucket = %target.staging_bucket(),
        "Deployment target resolved"
    );

    if args.list {
        let deployments = client.list().await?;
        if deployments.is_empty() {
            println!("No deployments found.");
        }
        for deployment in deployments {
            println!("{}", deployment);
        }
    } else if args.create {
        let operation = client.create(&args.display_name).await?;
        println!("Created deployment (operation {}).", operation.name);
    } else if args.delete {
        let resource_id = args
            .resource_id
            .context("--resource-id is required with --delete")?;
        let operation = client.delete(&resource_id).await?;
        println!("Deleted deployment {} (operation {}).", resource_id, operation.name);
    } else {
        anyhow::bail!("Unknown command: choose one of --list, --create or --delete");
    }

    Ok(())
}
