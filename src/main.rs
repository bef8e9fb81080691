use agenda::config::{ENV_API_URL, ENV_MODE};
use agenda::{ApiConfig, ApiError, BuildMode, ContactId, ContactInput, ContactsApi};
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

const EMPTY_LIST_TEXT: &str = "No hay contactos. Agrega uno desde el formulario.";
const ADDED_TEXT: &str = "Contacto agregado.";
const DELETED_TEXT: &str = "Contacto eliminado.";

/// agenda - contacts from the command line
///
/// Lists, adds and deletes contacts stored by the agenda backend.
///
/// Examples:
///   agenda list
///   agenda add --nombre Ana --telefono 555 --email ana@example.com
///   agenda delete 42
///   agenda --config agenda.json list
#[derive(Parser, Debug)]
#[command(author, version = env!("AGENDA_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend base URL (defaults to http://localhost:3002 in development)
    #[arg(long = "api-url", env = "AGENDA_API_URL", value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// Build mode: development, production or test
    #[arg(long, env = "AGENDA_MODE", value_name = "MODE", global = true)]
    pub mode: Option<BuildMode>,

    /// JSON config file; flags and AGENDA_* variables override its values
    #[arg(long, env = "AGENDA_CONFIG", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// List all contacts
    List,

    /// Add a new contact
    Add(AddArgs),

    /// Delete a contact by id
    Delete(DeleteArgs),
}

#[derive(clap::Args, Debug)]
pub struct AddArgs {
    #[arg(long)]
    pub nombre: String,

    #[arg(long)]
    pub telefono: String,

    #[arg(long)]
    pub email: String,

    #[arg(long, default_value = "")]
    pub empresa: String,
}

#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    /// Id of the contact to delete
    #[arg(value_name = "ID")]
    pub id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let api = ContactsApi::from_config(config)?;

    if let Err(e) = run(cli.command, &api).await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

/// Command-line values take precedence over the environment, which takes
/// precedence over the config file.
fn load_config(cli: &Cli) -> Result<ApiConfig> {
    let lookup = |key: &str| match key {
        ENV_API_URL => cli.api_url.clone(),
        ENV_MODE => cli.mode.map(|m| m.to_string()),
        _ => std::env::var(key).ok(),
    };
    match &cli.config {
        Some(path) => ApiConfig::from_file(path, lookup),
        None => ApiConfig::from_env(lookup),
    }
}

async fn run(command: Commands, api: &ContactsApi) -> Result<(), ApiError> {
    match command {
        Commands::List => {
            let contacts = api.list().await?;
            if contacts.is_empty() {
                println!("{}", EMPTY_LIST_TEXT);
            }
            for contact in contacts {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    contact.id,
                    contact.nombre,
                    contact.telefono,
                    contact.email,
                    contact.empresa.unwrap_or_default()
                );
            }
        }
        Commands::Add(args) => {
            let input = ContactInput {
                nombre: args.nombre,
                telefono: args.telefono,
                email: args.email,
                empresa: args.empresa,
            };
            let contact = api.create(&input).await?;
            println!("{} {}", ADDED_TEXT, contact.id);
        }
        Commands::Delete(args) => {
            api.delete(&ContactId::from(args.id)).await?;
            println!("{}", DELETED_TEXT);
        }
    }
    Ok(())
}
