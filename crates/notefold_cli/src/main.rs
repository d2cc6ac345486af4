//! Command-line front end for the container store.
//!
//! # Responsibility
//! - Load config, start logging and open the configured database.
//! - Map one subcommand onto one gateway call and print the result as JSON.
//!
//! # Invariants
//! - Failures print `error_kind=<kind>` on stderr and exit non-zero.

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use notefold_core::{
    core_version, init_logging_from_config, load_config, open_db, AccessFilter, ChildKind,
    CoreGateway, ErrorKind, GatewayError, GrantRequest, GrantScope, ParentRef,
    StaticIdentityProvider, Visibility,
};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "notefold",
    author,
    version = core_version(),
    about = "Hierarchical notes with inheritable access lists"
)]
struct Cli {
    /// TOML config file; missing files fall back to defaults
    #[arg(short, long, default_value = "notefold.toml")]
    config: PathBuf,

    /// Database file, overriding the config
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Caller credential
    #[arg(short, long, env = "NOTEFOLD_TOKEN", hide_env_values = true, default_value = "")]
    token: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create (or return) the caller's root container
    Provision,
    /// Create a folder under PARENT (`root` for the caller's root)
    Mkdir { parent: String, name: String },
    /// Show container metadata
    Meta { id: String },
    /// List child ids
    Ls {
        id: String,
        #[arg(long, value_enum, default_value_t = KindArg::Folders)]
        kind: KindArg,
    },
    /// List access entries
    Access {
        id: String,
        #[arg(long, value_enum, default_value_t = FilterArg::All)]
        filter: FilterArg,
    },
    /// Grant access on a container
    Grant(GrantArgs),
    /// Delete a container with its subtree and notes
    Rm { id: String },
    /// Finish interrupted deletes
    Recover,
    #[command(subcommand)]
    Note(NoteCommand),
    #[command(subcommand)]
    Group(GroupCommand),
}

#[derive(Args, Debug)]
struct GrantArgs {
    id: String,
    #[arg(value_enum)]
    visibility: VisibilityArg,
    /// Emails to grant
    #[arg(short, long = "email")]
    emails: Vec<String>,
    /// Named group whose members are granted too
    #[arg(short, long)]
    group: Option<String>,
    /// Only update the target, not its descendants
    #[arg(long)]
    container_only: bool,
}

#[derive(Subcommand, Debug)]
enum NoteCommand {
    /// Add a note to a folder
    Add { folder_id: String, content: String },
    /// Show one note
    Get { id: String },
}

#[derive(Subcommand, Debug)]
enum GroupCommand {
    Create {
        name: String,
        #[arg(short, long = "member")]
        members: Vec<String>,
    },
    Add {
        name: String,
        #[arg(short, long = "member", required = true)]
        members: Vec<String>,
    },
    Show { name: String },
    List,
    Rm { name: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Folders,
    Notes,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FilterArg {
    All,
    Read,
    Write,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum VisibilityArg {
    Read,
    Write,
}

impl From<KindArg> for ChildKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Folders => ChildKind::Folders,
            KindArg::Notes => ChildKind::Notes,
        }
    }
}

impl From<FilterArg> for AccessFilter {
    fn from(value: FilterArg) -> Self {
        match value {
            FilterArg::All => AccessFilter::All,
            FilterArg::Read => AccessFilter::Only(Visibility::Read),
            FilterArg::Write => AccessFilter::Only(Visibility::Write),
        }
    }
}

impl From<VisibilityArg> for Visibility {
    fn from(value: VisibilityArg) -> Self {
        match value {
            VisibilityArg::Read => Visibility::Read,
            VisibilityArg::Write => Visibility::Write,
        }
    }
}

#[derive(Debug)]
enum CliError {
    Setup(String),
    Gateway(GatewayError),
    Output(serde_json::Error),
}

impl CliError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Setup(_) | Self::Output(_) => ErrorKind::StorageError,
            Self::Gateway(err) => err.kind(),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup(message) => write!(f, "{message}"),
            Self::Gateway(err) => write!(f, "{err}"),
            Self::Output(err) => write!(f, "failed to encode output: {err}"),
        }
    }
}

impl From<GatewayError> for CliError {
    fn from(value: GatewayError) -> Self {
        Self::Gateway(value)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let kind = err.kind();
            eprintln!(
                "error_kind={kind} retryable={} {err}",
                kind.is_retryable()
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(Some(cli.config.as_path())).map_err(|err| CliError::Setup(err.to_string()))?;
    init_logging_from_config(&config.logging).map_err(CliError::Setup)?;

    let db_path = cli.database.unwrap_or_else(|| config.database.path.clone());
    let conn = open_db(&db_path).map_err(|err| CliError::Setup(err.to_string()))?;
    let provider = StaticIdentityProvider::from_config(&config.identities);
    info!(
        "event=cli_start module=cli status=ok version={} identities={}",
        core_version(),
        provider.len()
    );
    if provider.is_empty() {
        warn!("event=cli_start module=cli status=warn reason=no_identities");
    }
    let gateway = CoreGateway::new(&conn, provider);
    let token = cli.token.as_str();
    info!("event=cli_command module=cli status=start");

    match cli.command {
        Command::Provision => print_json(&gateway.provision_root(token)?),
        Command::Mkdir { parent, name } => print_json(&gateway.create_container(
            token,
            &ParentRef::parse(&parent),
            &name,
        )?),
        Command::Meta { id } => print_json(&gateway.get_meta(token, &id)?),
        Command::Ls { id, kind } => print_json(&gateway.list_children(token, &id, kind.into())?),
        Command::Access { id, filter } => {
            print_json(&gateway.list_access(token, &id, filter.into())?)
        }
        Command::Grant(args) => {
            let request = match args.group {
                Some(group) => GrantRequest::grouped(args.emails, group),
                None => GrantRequest::explicit(args.emails),
            };
            let scope = if args.container_only {
                GrantScope::ContainerOnly
            } else {
                GrantScope::Subtree
            };
            print_json(&gateway.grant_access(
                token,
                &args.id,
                args.visibility.into(),
                &request,
                scope,
            )?)
        }
        Command::Rm { id } => print_json(&gateway.delete_container(token, &id)?),
        Command::Recover => print_json(&gateway.recover_pending_deletes(token)?),
        Command::Note(NoteCommand::Add { folder_id, content }) => {
            print_json(&gateway.create_note(token, &folder_id, &content)?)
        }
        Command::Note(NoteCommand::Get { id }) => print_json(&gateway.get_note(token, &id)?),
        Command::Group(GroupCommand::Create { name, members }) => {
            print_json(&gateway.create_group(token, &name, &members)?)
        }
        Command::Group(GroupCommand::Add { name, members }) => {
            print_json(&gateway.add_group_members(token, &name, &members)?)
        }
        Command::Group(GroupCommand::Show { name }) => {
            print_json(&gateway.get_group(token, &name)?)
        }
        Command::Group(GroupCommand::List) => print_json(&gateway.list_groups(token)?),
        Command::Group(GroupCommand::Rm { name }) => {
            gateway.delete_group(token, &name)?;
            print_json(&serde_json::json!({ "deleted": name }))
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let encoded = serde_json::to_string_pretty(value).map_err(CliError::Output)?;
    println!("{encoded}");
    Ok(())
}
