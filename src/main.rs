use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use eyre::Result;
use std::path::PathBuf;
use userview::{
    Config, DateRange, FilterSpec, Gender, Record, SortSpec, Store, USERS_COLLECTION, UserInput, UserPatch, View,
    add_user, delete_user, export, update_user,
};

#[derive(Parser)]
#[command(name = "userview")]
#[command(about = "UserView CLI - Filter, sort and export user records from a live document store")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Directory containing the store (default: config file, then the user data directory)
    #[arg(short, long)]
    store_path: Option<PathBuf>,

    /// Config file (default: <config dir>/userview/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show users matching the filters, sorted
    List {
        #[command(flatten)]
        query: QueryArgs,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Write users matching the filters to a CSV file
    Export {
        #[command(flatten)]
        query: QueryArgs,

        /// Output directory (default: export_dir from config)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Create a user
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Date of birth, YYYY-MM-DD
        #[arg(long, default_value = "")]
        dob: String,
        /// male, female or other
        #[arg(long, default_value = "other")]
        gender: String,
        #[arg(long)]
        profile_picture: Option<String>,
    },

    /// Change fields of an existing user
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        dob: Option<String>,
        #[arg(long)]
        gender: Option<String>,
        /// Empty string removes the picture
        #[arg(long)]
        profile_picture: Option<String>,
    },

    /// Delete a user
    Delete { id: String },

    /// Rebuild the SQLite cache from JSONL files
    Sync,
}

/// Filter and sort flags shared by `list` and `export`
#[derive(Args)]
struct QueryArgs {
    /// Name contains (case-insensitive)
    #[arg(long, default_value = "")]
    name: String,

    /// Email contains (case-insensitive)
    #[arg(long, default_value = "")]
    email: String,

    /// any, male, female or other
    #[arg(long, default_value = "any")]
    gender: String,

    /// any, with or without
    #[arg(long, default_value = "any")]
    profile: String,

    #[arg(long)]
    dob_from: Option<String>,
    #[arg(long)]
    dob_to: Option<String>,
    #[arg(long)]
    created_from: Option<String>,
    #[arg(long)]
    created_to: Option<String>,
    #[arg(long)]
    updated_from: Option<String>,
    #[arg(long)]
    updated_to: Option<String>,

    /// name, email, dob, gender, createdAt or updatedAt
    #[arg(long)]
    sort: Option<String>,

    /// asc or desc
    #[arg(long)]
    dir: Option<String>,
}

impl QueryArgs {
    fn filter_spec(&self) -> Result<FilterSpec> {
        Ok(FilterSpec {
            name: self.name.clone(),
            email: self.email.clone(),
            gender: self.gender.parse()?,
            dob: DateRange::new(self.dob_from.as_deref(), self.dob_to.as_deref()),
            profile: self.profile.parse()?,
            created: DateRange::new(self.created_from.as_deref(), self.created_to.as_deref()),
            updated: DateRange::new(self.updated_from.as_deref(), self.updated_to.as_deref()),
        })
    }

    fn sort_spec(&self, default: SortSpec) -> Result<SortSpec> {
        let key = match &self.sort {
            Some(key) => key.parse()?,
            None => default.key,
        };
        let dir = match &self.dir {
            Some(dir) => dir.parse()?,
            None => default.dir,
        };
        Ok(SortSpec::new(key, dir))
    }
}

fn main() -> Result<()> {
    // Setup tracing; stdout is reserved for command output
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    let mut config = Config::resolve(cli.config.as_deref())?;
    if let Some(path) = cli.store_path {
        config.store_path = Some(path);
    }

    let mut store = Store::open(config.store_path())?;

    match cli.command {
        Commands::List { query, json } => {
            let view = query_view(&store, &query, &config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(view.displayed())?);
            } else {
                print_table(view.displayed(), view.authoritative().len());
            }
        }
        Commands::Export { query, out } => {
            let view = query_view(&store, &query, &config)?;
            let dir = out.unwrap_or_else(|| config.export_dir.clone());
            let path = export::write_export(&dir, view.displayed(), Utc::now())?;
            println!("Exported {} users to {}", view.displayed().len(), path.display());
        }
        Commands::Add {
            name,
            email,
            dob,
            gender,
            profile_picture,
        } => {
            let input = UserInput {
                name,
                email,
                dob,
                gender: gender.parse()?,
                profile_picture: profile_picture.filter(|url| !url.is_empty()),
            };
            let id = add_user(&mut store, &input)?;
            println!("Created user {}", id);
        }
        Commands::Update {
            id,
            name,
            email,
            dob,
            gender,
            profile_picture,
        } => {
            let patch = UserPatch {
                name,
                email,
                dob,
                gender: gender.map(|g| g.parse::<Gender>()).transpose()?,
                profile_picture,
            };
            update_user(&mut store, &id, &patch)?;
            println!("Updated user {}", id);
        }
        Commands::Delete { id } => {
            delete_user(&mut store, &id)?;
            println!("Deleted user {}", id);
        }
        Commands::Sync => {
            println!("Syncing database from JSONL files...");
            store.sync()?;
            println!("Sync complete");
        }
    }

    Ok(())
}

/// Connect a view, apply the query, and release the subscription
fn query_view(store: &Store, query: &QueryArgs, config: &Config) -> Result<View> {
    let filter = query.filter_spec()?;
    let sort = query.sort_spec(config.sort_spec())?;

    let (mut view, subscription) = View::connect(store, USERS_COLLECTION)?;
    view.set_filter(filter);
    view.set_sort(sort);
    subscription.unsubscribe();

    Ok(view)
}

fn print_table(records: &[Record], total: usize) {
    println!(
        "{}",
        format!(
            "{:<24} {:<30} {:<10} {:<7} {:<4} {:<24} {}",
            "NAME", "EMAIL", "DOB", "GENDER", "PIC", "CREATED", "ID"
        )
        .bold()
    );

    for record in records {
        let pic = if record.has_profile_picture() {
            format!("{:<4}", "yes").green()
        } else {
            format!("{:<4}", "no").dimmed()
        };
        println!(
            "{:<24} {:<30} {:<10} {:<7} {} {:<24} {}",
            truncate(&record.name, 24),
            truncate(&record.email, 30),
            record.dob,
            record.gender.as_str(),
            pic,
            record.created_at,
            record.id.dimmed()
        );
    }

    println!("\n{} of {} users", records.len().to_string().bold(), total);
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}
