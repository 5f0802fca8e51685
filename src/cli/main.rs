//! Command-line front end: manage a blog directory, its accounts and articles,
//! and print search results and reports.

use core::time::Duration;
use std::{
    env::current_dir,
    io::{self, Write},
    process::exit,
};

use clap::{Parser, Subcommand};
use color_eyre::{
    Section,
    config::HookBuilder,
    eyre::{self},
};
use indicatif::{ProgressBar, ProgressStyle};
use quire::{
    Blog,
    service::{CategoryInput, Registration},
};
use serde::Serialize;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{
    EnvFilter, filter::Directive, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::{
    article::{ArticleCommands, CommentCommands, handle_article_command, handle_comment_command},
    report::{ReportCommands, handle_report_command},
};

mod article;
mod report;

#[derive(Parser)]
#[command(about = "A small blogging backend", long_about = None)]
#[command(version, author)]
struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit machine-readable JSON output
    #[arg(long, global = true)]
    json: bool,

    /// Access token from `quire user login`
    #[arg(long, global = true, env = "QUIRE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new blog directory
    Create { name: Option<String> },

    #[command(subcommand)]
    User(UserCommands),

    #[command(subcommand)]
    Article(ArticleCommands),

    #[command(subcommand)]
    Comment(CommentCommands),

    #[command(subcommand)]
    Category(CategoryCommands),

    #[command(subcommand)]
    Tag(TagCommands),

    #[command(flatten)]
    Report(ReportCommands),

    /// Rebuild the full-text index from the database
    Reindex,
}

#[derive(Subcommand)]
enum UserCommands {
    Register {
        username: String,
        email: String,
        password: String,
    },
    /// Print a fresh token pair
    Login { email: String, password: String },
    /// Trade a refresh token for a new pair
    Refresh { refresh_token: String },
    /// Show a profile; defaults to the token's owner
    Show { id: Option<u64> },
}

#[derive(Subcommand)]
enum CategoryCommands {
    Create {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// List categories with their article counts
    List,
    Delete { id: u64 },
}

#[derive(Subcommand)]
enum TagCommands {
    List,
    /// Tags carried by the most articles
    Popular {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

fn main() {
    if let Err(err) = HookBuilder::default()
        .display_env_section(true)
        .panic_section("It looks like quire encountered a bug")
        .install()
    {
        eprintln!("Failed to install error hook: {err}");
    }

    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .without_time()
        .with_target(false);
    let mut filter_layer = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    if let Ok(directive) = "tantivy=warn".parse::<Directive>() {
        filter_layer = filter_layer.add_directive(directive);
    }

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(tracing_error::ErrorLayer::default())
        .init();

    if let Err(err) = entry(cli) {
        error!("{:#}", err);
        exit(1);
    }
}

fn entry(cli: Cli) -> eyre::Result<()> {
    let current_dir = current_dir()?;
    let Cli {
        json,
        token,
        command,
        ..
    } = cli;

    if let Commands::Create { name } = command {
        let name = match name {
            Some(name) => name,
            None => prompt_blog_name()?,
        };
        Blog::create(&current_dir, &name).note("Failed to create blog")?;
        info!("Blog created successfully");
        return Ok(());
    }

    let blog = Blog::open(&current_dir)
        .note("Can't open blog")
        .suggestion("Run `quire create <name>` and work inside the new directory")?;
    let context = Context {
        blog: &blog,
        token: token.as_deref(),
        json,
    };

    match command {
        Commands::Create { .. } => unreachable!(),
        Commands::User(command) => handle_user_command(&context, command),
        Commands::Article(command) => handle_article_command(&context, command),
        Commands::Comment(command) => handle_comment_command(&context, command),
        Commands::Category(command) => handle_category_command(&context, command),
        Commands::Tag(command) => handle_tag_command(&context, command),
        Commands::Report(command) => handle_report_command(&context, command),
        Commands::Reindex => {
            let indexed = long_task(
                "Rebuilding search index...",
                || blog.reindex(),
                "Search index rebuilt",
            )?;
            info!(indexed, "articles indexed");
            Ok(())
        }
    }
}

/// What every command handler gets to work with.
#[derive(Debug)]
pub struct Context<'a> {
    pub blog: &'a Blog,
    pub token: Option<&'a str>,
    pub json: bool,
}

impl Context<'_> {
    /// Id of the user the token belongs to.
    pub fn user_id(&self) -> eyre::Result<u64> {
        let token = self
            .token
            .ok_or_else(|| eyre::eyre!("This command needs an access token"))
            .suggestion("Pass --token or set QUIRE_TOKEN to the output of `quire user login`")?;
        Ok(self.blog.auth().validate_token(token)?)
    }

    /// Print `value` as JSON, or hand it to `human` for plain output.
    pub fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce(&T)) -> eyre::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human(value);
        }
        Ok(())
    }
}

fn handle_user_command(context: &Context<'_>, command: UserCommands) -> eyre::Result<()> {
    let auth = context.blog.auth();
    match command {
        UserCommands::Register {
            username,
            email,
            password,
        } => {
            let created = auth
                .register(&Registration {
                    username,
                    email,
                    password,
                })
                .note("Failed to register user")?;
            context.emit(&created, |created| {
                println!("Registered {} (#{})", created.user.username, created.user.id);
                println!("{}", created.tokens.access_token);
            })
        }
        UserCommands::Login { email, password } => {
            let logged_in = auth.login(&email, &password)?;
            context.emit(&logged_in.tokens, |tokens| println!("{}", tokens.access_token))
        }
        UserCommands::Refresh { refresh_token } => {
            let tokens = auth.refresh(&refresh_token)?;
            context.emit(&tokens, |tokens| println!("{}", tokens.access_token))
        }
        UserCommands::Show { id } => {
            let id = match id {
                Some(id) => id,
                None => context.user_id()?,
            };
            let profile = context.blog.users().get(id)?;
            let published = context.blog.users().published_article_count(id)?;
            context.emit(&profile, |profile| {
                println!("{} <{}>", profile.username, profile.email);
                if !profile.bio.is_empty() {
                    println!("  {}", profile.bio);
                }
                println!("  {published} published article(s)");
            })
        }
    }
}

fn handle_category_command(context: &Context<'_>, command: CategoryCommands) -> eyre::Result<()> {
    let categories = context.blog.categories();
    match command {
        CategoryCommands::Create { name, description } => {
            let category = categories
                .create(&CategoryInput::new(name, description))
                .note("Failed to create category")?;
            context.emit(&category, |category| {
                println!("Created category {} ({})", category.name, category.slug);
            })
        }
        CategoryCommands::List => {
            let listed = categories.list_with_counts()?;
            context.emit(&listed, |listed| {
                for entry in listed {
                    println!(
                        "#{} {} ({}): {} article(s)",
                        entry.category.id, entry.category.name, entry.category.slug, entry.article_count
                    );
                }
            })
        }
        CategoryCommands::Delete { id } => {
            categories.delete(id).note("Failed to delete category")?;
            info!(id, "Category deleted");
            Ok(())
        }
    }
}

fn handle_tag_command(context: &Context<'_>, command: TagCommands) -> eyre::Result<()> {
    let tags = context.blog.tags();
    match command {
        TagCommands::List => {
            let listed = tags.list()?;
            context.emit(&listed, |listed| {
                for tag in listed {
                    println!("#{} {} ({})", tag.id, tag.name, tag.slug);
                }
            })
        }
        TagCommands::Popular { limit } => {
            let popular = tags.popular(limit)?;
            context.emit(&popular, |popular| {
                for usage in popular {
                    println!("{}: {}", usage.tag.name, usage.article_count);
                }
            })
        }
    }
}

pub fn long_task<T, E>(
    loading_msg: &'static str,
    f: impl FnOnce() -> Result<T, E>,
    complete_msg: &'static str,
) -> Result<T, E> {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(loading_msg);

    let result = f();

    match &result {
        Ok(_) => pb.finish_with_message(complete_msg),
        Err(_) => pb.finish_and_clear(),
    }
    result
}

fn prompt_blog_name() -> eyre::Result<String> {
    loop {
        print!("Blog name: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let name = input.trim().to_string();

        if !name.is_empty() {
            return Ok(name);
        }

        println!("Blog name cannot be empty. Please enter a name.");
    }
}
