use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use docfill::config::{init_default_config, resolve_config};
use docfill::counterparty::Counterparty;
use docfill::store::merge_saved_values;
use docfill::{Entity, ExportRequest, PreviewMode, TemplateEngine, ValueMap};

#[derive(Parser, Debug)]
#[command(name = "docfill")]
#[command(about = "Fill {scope.field} placeholders in .docx templates", long_about = None)]
struct Cli {
    /// Config file path (default: DOCFILL_CONFIG, then docfill.toml searched upwards)
    #[arg(long, global = true, value_name = "TOML")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default docfill.toml, then exit
    InitConfig {
        /// Target directory (default: current directory)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the placeholders of a document as JSON
    Placeholders {
        #[arg(value_name = "DOCX")]
        input: PathBuf,
        /// Include label, input kind and entity for every token
        #[arg(long)]
        details: bool,
    },
    /// Print the placeholders belonging to one entity
    Classify {
        #[arg(value_name = "DOCX")]
        input: PathBuf,
        /// customer, performer, agreement or other
        #[arg(long)]
        entity: Entity,
    },
    /// Render an HTML preview
    Preview {
        #[arg(value_name = "DOCX")]
        input: PathBuf,
        #[command(flatten)]
        values: ValuesArg,
        /// edit or final
        #[arg(long, default_value_t = PreviewMode::Edit)]
        mode: PreviewMode,
        /// Output HTML (default: stdout)
        #[arg(short, long, value_name = "HTML")]
        output: Option<PathBuf>,
    },
    /// Export the filled document
    Export {
        #[arg(value_name = "DOCX")]
        input: PathBuf,
        #[command(flatten)]
        values: ValuesArg,
        /// Merge values saved under this template id
        #[arg(long, value_name = "ID")]
        template_id: Option<String>,
        /// Output base name (extension appended when missing)
        #[arg(long)]
        name: Option<String>,
        /// Output .docx (default: <input dir>/<export filename>)
        #[arg(short, long, value_name = "DOCX")]
        output: Option<PathBuf>,
    },
    /// Fill customer or performer placeholders from a counterparty record
    Autofill {
        #[arg(value_name = "DOCX")]
        input: PathBuf,
        /// Counterparty record (camelCase JSON object)
        #[arg(long, value_name = "JSON")]
        counterparty: PathBuf,
        /// customer or performer
        #[arg(long)]
        role: Entity,
        #[command(flatten)]
        values: ValuesArg,
        /// Start from, and save back to, the values of this template id
        #[arg(long, value_name = "ID")]
        template_id: Option<String>,
    },
    /// Manage saved value maps
    Values {
        #[command(subcommand)]
        action: ValuesAction,
    },
}

#[derive(Subcommand, Debug)]
enum ValuesAction {
    Save {
        #[arg(long, value_name = "ID")]
        template_id: String,
        #[command(flatten)]
        values: ValuesArg,
    },
    Show {
        #[arg(long, value_name = "ID")]
        template_id: String,
    },
    Delete {
        #[arg(long, value_name = "ID")]
        template_id: String,
    },
}

#[derive(Args, Debug)]
struct ValuesArg {
    /// JSON object mapping placeholder tokens to values
    #[arg(long = "values", value_name = "JSON")]
    path: Option<PathBuf>,
}

impl ValuesArg {
    fn load(&self) -> Result<ValueMap> {
        match self.path.as_ref() {
            Some(p) => read_json(p, "values"),
            None => Ok(ValueMap::new()),
        }
    }
}

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { dir, force } = &cli.command {
        let dir = match dir {
            Some(d) => d.clone(),
            None => std::env::current_dir().context("current dir")?,
        };
        let path = init_default_config(&dir, *force).context("init default config")?;
        info!(path = %path.display(), "wrote config");
        return Ok(());
    }

    let (config, config_path) = resolve_config(cli.config.clone())?;
    if let Some(p) = config_path.as_ref() {
        info!(path = %p.display(), "loaded config");
    }
    let persistent = config.store.dir.is_some();
    let engine = TemplateEngine::from_config(config).context("build engine")?;

    match cli.command {
        Commands::InitConfig { .. } => Ok(()),
        Commands::Placeholders { input, details } => {
            let found = engine.extract_placeholders(&read_docx(&input)?)?;
            if details {
                print_json(&engine.describe(&found))
            } else {
                print_json(&found)
            }
        }
        Commands::Classify { input, entity } => {
            let found = engine.extract_placeholders(&read_docx(&input)?)?;
            print_json(&engine.classify(&found, entity))
        }
        Commands::Preview {
            input,
            values,
            mode,
            output,
        } => {
            let package = read_docx(&input)?;
            let found = engine.extract_placeholders(&package)?;
            let html = engine.render_preview(&package, &found, &values.load()?, mode)?;
            match output {
                Some(p) => std::fs::write(&p, html)
                    .with_context(|| format!("write preview: {}", p.display())),
                None => {
                    println!("{html}");
                    Ok(())
                }
            }
        }
        Commands::Export {
            input,
            values,
            template_id,
            name,
            output,
        } => {
            if template_id.is_some() && !persistent {
                warn!("no [store] dir configured; saved values are not available across runs");
            }
            let package = read_docx(&input)?;
            let found = engine.extract_placeholders(&package)?;
            let request_values = values.load()?;
            let original_name = input
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let doc = engine.export(ExportRequest {
                package: &package,
                placeholders: &found,
                values: &request_values,
                filename_hint: name.as_deref(),
                original_name: &original_name,
                template_id: template_id.as_deref(),
            })?;
            let output = output.unwrap_or_else(|| {
                input
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join(&doc.filename)
            });
            std::fs::write(&output, &doc.bytes)
                .with_context(|| format!("write docx: {}", output.display()))?;
            info!(path = %output.display(), "wrote document");
            Ok(())
        }
        Commands::Autofill {
            input,
            counterparty,
            role,
            values,
            template_id,
        } => {
            let record: Counterparty = read_json(&counterparty, "counterparty")?;
            record.validate()?;
            let package = read_docx(&input)?;
            let found = engine.extract_placeholders(&package)?;
            let saved = match template_id.as_deref() {
                Some(id) => engine.load_values(id)?,
                None => None,
            };
            let current = merge_saved_values(saved.as_ref(), &values.load()?);
            let filled = engine.auto_fill(&found, &current, &record, role)?;
            if let Some(id) = template_id.as_deref() {
                engine.save_values(id, &filled)?;
            }
            print_json(&filled)
        }
        Commands::Values { action } => {
            if !persistent {
                warn!("no [store] dir configured; values live only for this run");
            }
            match action {
                ValuesAction::Save {
                    template_id,
                    values,
                } => engine.save_values(&template_id, &values.load()?),
                ValuesAction::Show { template_id } => {
                    print_json(&engine.load_values(&template_id)?.unwrap_or_default())
                }
                ValuesAction::Delete { template_id } => {
                    let removed = engine.delete_values(&template_id)?;
                    info!(template_id = %template_id, removed, "deleted values");
                    Ok(())
                }
            }
        }
    }
}

fn read_docx(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("read docx: {}", path.display()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read {what}: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse {what} json: {}", path.display()))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{json}");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
