//! `forge`: run pieces of the generation pipeline from the command line
//!
//! Events and results go to stdout as JSON, logs go to stderr.

mod replay;

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use forge_artifact::{ArtifactKey, ArtifactType, ParsedArtifact, SubjectId};
use forge_core::{Pipeline, PipelineConfig, StreamOutcome};
use forge_output::{ArtifactPersister, ProjectBuild, ProjectBuilder, ScaffoldTool, ScaffoldToolbox};
use replay::ReplayProvider;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let kind = || {
        Arg::new("type")
            .long("type")
            .short('t')
            .required(true)
            .help("Artifact type: single_file, multi_file or scaffold")
    };
    let subject = || {
        Arg::new("subject")
            .long("subject")
            .short('s')
            .required(true)
            .allow_negative_numbers(true)
            .value_parser(value_parser!(i64))
            .help("Subject id the artifact belongs to")
    };
    let input = || {
        Arg::new("input")
            .value_parser(value_parser!(PathBuf))
            .help("Model response file (stdin when omitted)")
    };

    Command::new("forge")
        .version(forge_core::VERSION)
        .about("Generation-to-artifact pipeline tools")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Pipeline configuration (TOML)"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Override the artifact output root"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("parse")
                .about("Parse a model response and print the files it declares")
                .arg(kind())
                .arg(input()),
        )
        .subcommand(
            Command::new("save")
                .about("Parse a model response and persist it under the output root")
                .arg(kind())
                .arg(subject())
                .arg(input()),
        )
        .subcommand(
            Command::new("replay")
                .about("Run a streaming generation against a recorded response")
                .arg(kind())
                .arg(subject())
                .arg(
                    Arg::new("response")
                        .long("response")
                        .short('r')
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Recorded model response"),
                )
                .arg(Arg::new("prompt").required(true).help("User prompt"))
                .arg(
                    Arg::new("wait-build")
                        .long("wait-build")
                        .action(ArgAction::SetTrue)
                        .help("Wait for a dispatched scaffold build and print its result"),
                ),
        )
        .subcommand(
            Command::new("build")
                .about("Install and build a scaffold project")
                .arg(
                    Arg::new("dir")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Project directory"),
                ),
        )
        .subcommand(
            Command::new("tool")
                .about("Execute one scaffold tool inside a project directory")
                .arg(
                    Arg::new("dir")
                        .long("dir")
                        .short('d')
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Project directory"),
                )
                .arg(Arg::new("name").required(true).help("Tool name, e.g. writeFile"))
                .arg(Arg::new("arguments").default_value("{}").help("Tool arguments (JSON)")),
        )
        .subcommand(Command::new("tools").about("List scaffold tools"))
        .subcommand(Command::new("config").about("Print the effective configuration"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"));

    let config = load_config(&matches)?;
    let code = match matches.subcommand() {
        Some(("parse", args)) => parse(args)?,
        Some(("save", args)) => save(&config, args)?,
        Some(("replay", args)) => replay(config, args).await?,
        Some(("build", args)) => build(&config, args).await?,
        Some(("tool", args)) => tool(args),
        Some(("tools", _)) => {
            for tool in ScaffoldTool::ALL {
                println!("{:<12} {}", tool.name(), tool.description());
            }
            0
        }
        Some(("config", _)) => {
            print!("{}", toml::to_string_pretty(&config)?);
            0
        }
        Some((other, _)) => bail!("unknown command {other}"),
        None => bail!("no command given"),
    };
    std::process::exit(code);
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(matches: &ArgMatches) -> Result<PipelineConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => PipelineConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(root) = matches.get_one::<PathBuf>("output") {
        config = config.with_output_root(root);
    }
    Ok(config)
}

fn artifact_type(args: &ArgMatches) -> Result<ArtifactType> {
    let value = args
        .get_one::<String>("type")
        .context("--type is required")?;
    Ok(ArtifactType::from_value(value)?)
}

fn subject_id(args: &ArgMatches) -> Result<SubjectId> {
    let raw = *args
        .get_one::<i64>("subject")
        .context("--subject is required")?;
    Ok(SubjectId::new(raw)?)
}

fn read_input(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
        }
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("reading stdin")?;
            Ok(text)
        }
    }
}

fn files_json(artifact: &ParsedArtifact) -> serde_json::Value {
    artifact
        .iter()
        .map(|file| {
            serde_json::json!({
                "path": file.path.as_slash_path(),
                "content": file.content,
            })
        })
        .collect()
}

fn parse(args: &ArgMatches) -> Result<i32> {
    let kind = artifact_type(args)?;
    let text = read_input(args.get_one::<PathBuf>("input"))?;
    let artifact = kind.parse(&text)?;
    println!("{}", serde_json::to_string_pretty(&files_json(&artifact))?);
    Ok(0)
}

fn save(config: &PipelineConfig, args: &ArgMatches) -> Result<i32> {
    let key = ArtifactKey::new(artifact_type(args)?, subject_id(args)?);
    let text = read_input(args.get_one::<PathBuf>("input"))?;
    let artifact = key.kind.parse(&text)?;

    let persister = ArtifactPersister::new(config.output.root_dir.clone());
    let persisted = persister.save(&artifact, &key)?;
    println!(
        "{}",
        serde_json::json!({
            "directory": persisted.directory,
            "written": persisted.written.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "skipped": persisted.skipped.iter().map(ToString::to_string).collect::<Vec<_>>(),
        })
    );
    Ok(0)
}

async fn replay(config: PipelineConfig, args: &ArgMatches) -> Result<i32> {
    let kind = args.get_one::<String>("type").map(String::as_str);
    let subject = *args
        .get_one::<i64>("subject")
        .context("--subject is required")?;
    let prompt = args
        .get_one::<String>("prompt")
        .context("prompt is required")?;
    let response_path = args
        .get_one::<PathBuf>("response")
        .context("--response is required")?;
    let response = std::fs::read_to_string(response_path)
        .with_context(|| format!("reading {}", response_path.display()))?;

    let pipeline = Pipeline::builder(config)
        .provider(Arc::new(ReplayProvider::new(response)))
        .build()?;
    let mut stream = pipeline.generate_streaming_raw(subject, kind, prompt)?;
    while let Some(event) = stream.recv().await {
        println!("{}", event.to_json()?);
    }

    match stream.finish().await {
        StreamOutcome::Completed { directory, build } => {
            if let Some(directory) = directory {
                tracing::info!(directory = %directory.display(), "artifact written");
            }
            if let (Some(build), true) = (build, args.get_flag("wait-build")) {
                let result = build.wait().await;
                println!("{}", serde_json::to_string(&result)?);
                return Ok(i32::from(!result.is_success()));
            }
            Ok(0)
        }
        StreamOutcome::Failed(_) | StreamOutcome::Cancelled => Ok(1),
    }
}

async fn build(config: &PipelineConfig, args: &ArgMatches) -> Result<i32> {
    let dir = args.get_one::<PathBuf>("dir").context("dir is required")?;
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let result = ProjectBuilder::new(config.build.clone()).build(dir).await;
    println!("{}", serde_json::to_string(&result)?);
    Ok(i32::from(!result.is_success()))
}

fn tool(args: &ArgMatches) -> i32 {
    let dir = args
        .get_one::<PathBuf>("dir")
        .map_or_else(|| Path::new(".").to_path_buf(), Clone::clone);
    let name = args.get_one::<String>("name").map_or("", String::as_str);
    let arguments = args.get_one::<String>("arguments").map_or("{}", String::as_str);

    let output = ScaffoldToolbox::new(dir).execute(name, arguments);
    println!("{output}");
    i32::from(output.starts_with("Error: "))
}
