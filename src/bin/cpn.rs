use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cpn::{
    config::{
        DEFAULT_EXTENSION, DEFAULT_HOST, DEFAULT_MAX_PAYLOAD, DEFAULT_PORT, DEFAULT_READ_TIMEOUT,
    },
    template::{self, Template},
    Config, Connection, Ingestor, Listener, Transport,
};
use tracing::{error, info};
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const PACKAGE_NAME: &str = env!("CARGO_CRATE_NAME");

#[derive(Parser, Debug)]
#[command(version, about = "Competitive programming file helper", long_about = None)]
struct Args {
    /// Source template copied for every new problem
    #[arg(long, global = true, env = "CPN_TEMPLATE")]
    template: Option<PathBuf>,

    /// Extension of generated source files
    #[arg(long, global = true, env = "CPN_EXTENSION", default_value = DEFAULT_EXTENSION)]
    extension: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Receive problems from the browser helper and create their files
    Parse(ParseArgs),
    /// Create a source file from the template
    #[command(alias = "temp")]
    Template {
        #[arg(default_value = "main.cpp")]
        file: PathBuf,
    },
    /// Create the brute force and generator sources used for stress testing
    #[command(alias = "sf")]
    StressFiles {
        #[arg(long, env = "CPN_GENERATOR_TEMPLATE")]
        generator_template: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct ParseArgs {
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(long, value_enum, default_value_t = Transport::Tcp)]
    transport: Transport,

    /// Largest accepted submission in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD)]
    max_payload: usize,

    #[arg(long, default_value_t = DEFAULT_READ_TIMEOUT.as_millis() as u64)]
    read_timeout_ms: u64,

    /// Where the source file and test-cases/ are written
    #[arg(long, default_value = ".")]
    dir: PathBuf,
}

impl ParseArgs {
    fn into_config(self, template: Option<PathBuf>, extension: String) -> Config {
        Config {
            transport: self.transport,
            host: self.host,
            port: self.port,
            max_payload: self.max_payload,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            root: self.dir,
            extension,
            template,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("{PACKAGE_NAME}=info")),
        ))
        .with(tracing_subscriber::fmt::layer().compact())
        .init();

    let args = Args::parse();

    match args.command {
        Command::Parse(parse) => {
            parse_problems(parse.into_config(args.template, args.extension)).await
        }
        Command::Template { file } => {
            let template = template::from_config(args.template.as_deref());
            render(&*template, &file)
        }
        Command::StressFiles { generator_template } => {
            let brute = PathBuf::from(format!("brute.{}", args.extension));
            let generator = PathBuf::from(format!("gen.{}", args.extension));

            render(&*template::from_config(args.template.as_deref()), &brute)?;
            render(
                &*template::from_config(generator_template.as_deref()),
                &generator,
            )?;
            info!("Stress test files created");
            Ok(())
        }
    }
}

async fn parse_problems(config: Config) -> Result<()> {
    let listener = Listener::bind(&config).await?;
    let template = template::from_config(config.template.as_deref());
    let ingestor = Arc::new(Ingestor::from_config(&config, template));

    let handler = move |connection: Connection| {
        let ingestor = Arc::clone(&ingestor);
        async move { ingestor.ingest(connection).await }
    };
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    listener.run(handler, shutdown).await?;
    info!("Ended parsing");
    Ok(())
}

fn render(template: &dyn Template, file: &Path) -> Result<()> {
    info!("Generating {}", file.display());
    template
        .render(file)
        .with_context(|| format!("could not create {}", file.display()))
}
