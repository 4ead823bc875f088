//! Binary entry point for the depgraph REST service.
#![forbid(unsafe_code)]

use std::error::Error;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use depgraph::{
    config::{parse_header, Config, Overrides},
    server::{self, SharedService},
    DbService, GraphStore, HttpStore,
};

#[derive(Parser, Debug)]
#[command(
    name = "depgraph",
    version,
    about = "REST CRUD service over a transactional graph-query endpoint",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "DEPGRAPH_CONFIG",
        value_name = "FILE",
        help = "Path to the TOML config file"
    )]
    config: Option<PathBuf>,

    #[command(flatten)]
    settings: SettingsArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct SettingsArgs {
    #[arg(
        long,
        global = true,
        env = "DEPGRAPH_STORE_URL",
        value_name = "URL",
        help = "Transactional commit endpoint of the graph store"
    )]
    store_url: Option<String>,

    #[arg(long, global = true, value_name = "SECS", help = "Store request timeout")]
    timeout_secs: Option<u64>,

    #[arg(
        long = "header",
        global = true,
        value_name = "NAME=VALUE",
        action = ArgAction::Append,
        help = "Header sent with every store request (repeatable)"
    )]
    headers: Vec<String>,

    #[arg(long, global = true, value_name = "HOST", help = "Bind address host")]
    host: Option<IpAddr>,

    #[arg(long, global = true, value_name = "PORT", help = "Bind port")]
    port: Option<u16>,

    #[arg(
        long = "allow-origin",
        global = true,
        value_name = "ORIGIN",
        action = ArgAction::Append,
        help = "Additional CORS origin to allow (repeatable)"
    )]
    allow_origins: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Serve the /db REST endpoints")]
    Serve,

    #[command(about = "Print the resolved configuration")]
    Config {
        #[arg(
            long,
            value_enum,
            default_value_t = OutputFormat::Text,
            help = "Output format"
        )]
        format: OutputFormat,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    config.apply(build_overrides(cli.settings)?);

    match cli.command {
        Command::Serve => {
            let store: Arc<dyn GraphStore> = Arc::new(HttpStore::new(config.store_options()?)?);
            let service: SharedService = Arc::new(DbService::new(store));
            if let Err(err) = server::serve(service, config.server_options()).await {
                eprintln!("server terminated: {err}");
                return Err(Box::new(err));
            }
        }
        Command::Config { format } => {
            let redacted = config.redacted();
            match format {
                OutputFormat::Text => print!("{}", toml::to_string_pretty(&redacted)?),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&redacted)?),
            }
        }
    }

    Ok(())
}

fn build_overrides(args: SettingsArgs) -> Result<Overrides, Box<dyn Error>> {
    let headers = args
        .headers
        .iter()
        .map(|raw| parse_header(raw))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Overrides {
        store_url: args.store_url,
        timeout_secs: args.timeout_secs,
        headers,
        host: args.host,
        port: args.port,
        allow_origins: args.allow_origins,
    })
}
