//! Offline operator tool for the movie bot database.
//!
//! Works directly on the SQLite file the bot uses, so catalog and roster
//! maintenance does not need a Telegram session. The main admin is
//! protected here exactly as in the bot.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;

use movie_code_bot::access::{AccessRoster, AdminRemoval};
use movie_code_bot::storage::{Database, NewMovie, is_flag_key, parse_flag};

/// Movie bot database administration.
#[derive(Parser, Debug)]
#[command(name = "movie_admin")]
#[command(about = "Inspect and edit the movie bot database")]
#[command(version)]
struct Args {
    /// SQLite database file.
    #[arg(short, long, env = "DATABASE_PATH", default_value = "movies.db")]
    database: PathBuf,

    /// Main admin id (cannot be removed).
    #[arg(long, env = "MAIN_ADMIN")]
    main_admin: Option<i64>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Log level for stderr (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Show user, movie and view counts.
    Stats,

    /// List active movies.
    ListMovies,

    /// Find active movies whose title contains the text.
    Search { query: String },

    /// Add a movie by its Telegram file id.
    AddMovie {
        #[arg(long)]
        title: String,

        #[arg(long)]
        file_id: String,

        #[arg(long, env = "DEFAULT_MOVIE_FORMAT", default_value = "MP4")]
        format: String,

        #[arg(long, env = "DEFAULT_MOVIE_LANGUAGE", default_value = "Uzbek")]
        language: String,
    },

    /// Retire a movie code.
    DeleteMovie { code: i64 },

    /// List admins.
    Admins,

    /// Grant admin rights.
    AddAdmin { user_id: i64 },

    /// Revoke admin rights.
    RemoveAdmin { user_id: i64 },

    /// List required channels.
    Channels,

    /// Require membership in a channel.
    AddChannel { handle: String },

    /// Stop requiring a channel.
    RemoveChannel { handle: String },

    /// Show settings with defaults applied.
    Settings,

    /// Change a setting.
    Set { key: String, value: String },

    /// List ads that still have repeats left.
    ListAds,

    /// Delete a scheduled ad.
    DeleteAd { id: i64 },
}

/// Outcome of one subcommand in both output forms.
#[derive(Debug)]
struct Report {
    success: bool,
    text: String,
    json: Value,
}

impl Report {
    fn ok(text: impl Into<String>, json: Value) -> Self {
        Self {
            success: true,
            text: text.into(),
            json,
        }
    }

    fn failed(text: impl Into<String>, json: Value) -> Self {
        Self {
            success: false,
            text: text.into(),
            json,
        }
    }
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(&args.log_level);

    let result = Database::open(&args.database)
        .with_context(|| format!("Failed to open database {}", args.database.display()))
        .and_then(|db| execute(&db, args.main_admin, args.command.clone()));

    match result {
        Ok(report) => {
            if args.json {
                println!("{:#}", report.json);
            } else {
                println!("{}", report.text);
            }
            if report.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("✗ {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so `--json` output stays clean.
fn init_logging(level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Who the audit log names for a CLI change.
fn operator(main_admin: Option<i64>) -> String {
    main_admin.map_or_else(
        || "CLI operator".to_owned(),
        |id| format!("CLI operator (admin {id})"),
    )
}

fn roster(db: &Database, main_admin: Option<i64>) -> Result<AccessRoster> {
    let Some(main_admin) = main_admin else {
        bail!("MAIN_ADMIN is required for this command (set it or pass --main-admin)");
    };
    Ok(AccessRoster::new(db.clone(), main_admin))
}

fn execute(db: &Database, main_admin: Option<i64>, command: Command) -> Result<Report> {
    let report = match command {
        Command::Stats => {
            let stats = db.stats()?;
            Report::ok(
                format!(
                    "Users:       {}\nMovies:      {}\nTotal views: {}",
                    stats.users, stats.movies, stats.total_views
                ),
                serde_json::to_value(stats)?,
            )
        }

        Command::ListMovies => {
            let movies = db.list_movies()?;
            let text = if movies.is_empty() {
                "The catalog is empty.".to_owned()
            } else {
                movies
                    .iter()
                    .map(|m| {
                        format!(
                            "{:>5}  {} [{}, {}] {} view(s)",
                            m.code,
                            truncate(&m.title, 50),
                            m.format,
                            m.language,
                            m.views
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            Report::ok(text, serde_json::to_value(movies)?)
        }

        Command::Search { query } => {
            let movies = db.search_movies(&query)?;
            let text = if movies.is_empty() {
                format!("Nothing found for \"{query}\".")
            } else {
                movies
                    .iter()
                    .map(|m| format!("{:>5}  {}", m.code, m.title))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            Report::ok(text, serde_json::to_value(movies)?)
        }

        Command::AddMovie {
            title,
            file_id,
            format,
            language,
        } => {
            let code = db.add_movie(&NewMovie {
                title: title.clone(),
                format,
                language,
                file_id,
            })?;
            info!(target: "audit", "{} added movie #{} \"{}\"", operator(main_admin), code, title);
            Report::ok(
                format!("✓ Added \"{title}\" with code {code}"),
                json!({ "code": code }),
            )
        }

        Command::DeleteMovie { code } => {
            let deleted = db.delete_movie(code)?;
            let json = json!({ "code": code, "deleted": deleted });
            if deleted {
                info!(target: "audit", "{} deleted movie #{}", operator(main_admin), code);
                Report::ok(format!("✓ Movie {code} deleted"), json)
            } else {
                Report::failed(format!("✗ No active movie with code {code}"), json)
            }
        }

        Command::Admins => {
            let roster = roster(db, main_admin)?;
            let admins = roster.list_admins()?;
            let text = admins
                .iter()
                .map(|id| {
                    if *id == roster.main_admin() {
                        format!("{id} (main)")
                    } else {
                        id.to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join("\n");
            Report::ok(
                text,
                json!({ "main_admin": roster.main_admin(), "admins": admins }),
            )
        }

        Command::AddAdmin { user_id } => {
            let roster = roster(db, main_admin)?;
            let added = roster.add_admin(roster.main_admin(), user_id)?;
            let text = if added {
                format!("✓ {user_id} is now an admin")
            } else {
                format!("{user_id} is already an admin")
            };
            Report::ok(text, json!({ "user_id": user_id, "added": added }))
        }

        Command::RemoveAdmin { user_id } => {
            let roster = roster(db, main_admin)?;
            let outcome = roster.remove_admin(roster.main_admin(), user_id)?;
            let json = json!({ "user_id": user_id, "removed": outcome == AdminRemoval::Removed });
            match outcome {
                AdminRemoval::Removed => Report::ok(format!("✓ {user_id} is no longer an admin"), json),
                AdminRemoval::NotAdmin => Report::failed(format!("✗ {user_id} is not an admin"), json),
                AdminRemoval::Protected => {
                    Report::failed("✗ The main admin cannot be removed", json)
                }
            }
        }

        Command::Channels => {
            let channels = db.get_channels()?;
            let text = if channels.is_empty() {
                "No required channels.".to_owned()
            } else {
                channels
                    .iter()
                    .map(|c| format!("@{c}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            Report::ok(text, json!(channels))
        }

        Command::AddChannel { handle } => {
            let roster = roster(db, main_admin)?;
            let (channel, added) = roster.add_channel(roster.main_admin(), &handle)?;
            let text = if added {
                format!("✓ @{channel} is now required")
            } else {
                format!("@{channel} is already required")
            };
            Report::ok(text, json!({ "channel": channel, "added": added }))
        }

        Command::RemoveChannel { handle } => {
            let roster = roster(db, main_admin)?;
            let (channel, removed) = roster.remove_channel(roster.main_admin(), &handle)?;
            let json = json!({ "channel": channel, "removed": removed });
            if removed {
                Report::ok(format!("✓ @{channel} is no longer required"), json)
            } else {
                Report::failed(format!("✗ @{channel} is not a required channel"), json)
            }
        }

        Command::Settings => {
            let settings = db.all_settings()?;
            let text = settings
                .iter()
                .map(|(key, value)| format!("{key} = {value}"))
                .collect::<Vec<_>>()
                .join("\n");
            Report::ok(text, json!(settings))
        }

        Command::Set { key, value } => {
            let key = key.to_lowercase();
            if is_flag_key(&key) && parse_flag(&value).is_none() {
                bail!("{key} accepts true/false, on/off, yes/no or 1/0");
            }
            db.set_setting(&key, &value)?;
            info!(target: "audit", "{} set {} = {}", operator(main_admin), key, value);
            Report::ok(
                format!("✓ {key} = {value}"),
                json!({ "key": key, "value": value }),
            )
        }

        Command::ListAds => {
            let ads = db.list_pending_ads()?;
            let text = if ads.is_empty() {
                "No pending ads.".to_owned()
            } else {
                ads.iter()
                    .map(|ad| {
                        format!(
                            "#{:<4} {} UTC  {} left  {}",
                            ad.id,
                            ad.schedule_time.format("%Y-%m-%d %H:%M"),
                            ad.repeat_count,
                            truncate(&ad.text, 40)
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            Report::ok(text, serde_json::to_value(ads)?)
        }

        Command::DeleteAd { id } => {
            let deleted = db.delete_ad(id)?;
            let json = json!({ "id": id, "deleted": deleted });
            if deleted {
                info!(target: "audit", "{} deleted ad #{}", operator(main_admin), id);
                Report::ok(format!("✓ Ad #{id} deleted"), json)
            } else {
                Report::failed(format!("✗ No ad with id {id}"), json)
            }
        }
    };
    Ok(report)
}

/// Truncates a string for display.
fn truncate(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        s.to_owned()
    } else {
        format!("{}...", chars[..max_len].iter().collect::<String>())
    }
}
