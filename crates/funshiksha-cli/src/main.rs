//! Funshiksha CLI - quizzes that keep working offline.
//!
//! A thin terminal front-end over `funshiksha-core`: seed content, answer
//! questions, inspect progress and the pending queue, run sync passes and
//! manage the offline cache.

use std::io;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use funshiksha_core::api::HttpRemote;
use funshiksha_core::cache::{CacheInterceptor, CacheStorage, HttpFetcher, Request};
use funshiksha_core::models::{Category, Locale, NewAttempt, NewProfile};
use funshiksha_core::store::default_content;
use funshiksha_core::utils::{age_display, truncate_string};
use funshiksha_core::{Config, Connectivity, LocalStore, Message, OfflineClient, SyncCoordinator};

// ============================================================================
// Constants
// ============================================================================

/// Log file prefix inside `<data_dir>/logs`
const LOG_FILE: &str = "funshiksha.log";

/// Profile used when none has been created yet
const DEFAULT_PROFILE_ID: &str = "demo_user";

/// Maximum prompt width in content listings
const PROMPT_DISPLAY_WIDTH: usize = 60;

const USAGE: &str = "\
Usage: funshiksha [--offline] <command>

Commands:
  seed                              Load the built-in question set
  content [category] [locale]       List questions
  answer <content_id> <option> [seconds]
                                    Submit an answer (option is 0-based)
  profile create <name> <class> [locale]
                                    Create the learner profile
  profile show                      Show the learner profile
  progress                          Show per-category progress
  recompute                         Rebuild progress from attempt history
  status                            Online / syncing / pending summary
  sync                              Deliver pending operations now
  cache install                     Populate and activate the offline cache
  cache fetch <url> [accept]        Request a URL through the cache

Environment:
  FUNSHIKSHA_REMOTE_URL   Remote sync endpoint base URL
  FUNSHIKSHA_DATA_DIR     Data directory (store, cache, logs)
  RUST_LOG                Log filter (default: warn)";

/// Initialize the tracing subscriber: stderr plus a daily log file.
/// The returned guard flushes the file writer on drop.
fn init_tracing(log_dir: &Path) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::fs::create_dir_all(log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = Config::load().context("Failed to load config")?;
    config.apply_env();

    let data_dir = config.data_dir()?;
    let _log_guard = init_tracing(&data_dir.join("logs"));

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let offline = match args.iter().position(|a| a == "--offline") {
        Some(i) => {
            args.remove(i);
            true
        }
        None => false,
    };
    if args.is_empty() || args[0] == "--help" || args[0] == "-h" {
        println!("{}", USAGE);
        return Ok(());
    }

    info!(data_dir = %data_dir.display(), offline, "Funshiksha starting");
    let client = build_client(&config, offline)?;
    client
        .store()
        .initialize()
        .await
        .context("Failed to open local store")?;

    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let locale = config.preferred_locale;
    match args.as_slice() {
        ["seed"] => seed(&client).await,
        ["content"] => list_content(&client, None, locale).await,
        ["content", category] => list_content(&client, Some(parse_arg(category)?), locale).await,
        ["content", category, locale] => {
            list_content(&client, Some(parse_arg(category)?), parse_arg(locale)?).await
        }
        ["answer", content_id, option] => answer(&client, &config, content_id, option, "0").await,
        ["answer", content_id, option, secs] => {
            answer(&client, &config, content_id, option, secs).await
        }
        ["profile", "create", name, class] => {
            create_profile(&client, &mut config, name, class, locale).await
        }
        ["profile", "create", name, class, locale] => {
            let locale = parse_arg(locale)?;
            create_profile(&client, &mut config, name, class, locale).await
        }
        ["profile", "show"] => show_profile(&client, &config).await,
        ["progress"] => show_progress(&client, &config).await,
        ["recompute"] => recompute(&client, &config).await,
        ["status"] => show_status(&client).await,
        ["sync"] => sync(&client).await,
        ["cache", "install"] => cache_install(&config).await,
        ["cache", "fetch", url] => cache_fetch(&config, url, None).await,
        ["cache", "fetch", url, accept] => cache_fetch(&config, url, Some(accept)).await,
        _ => {
            eprintln!("{}", USAGE);
            bail!("Unknown command: {}", args.join(" "))
        }
    }
}

/// Parse a category or locale argument.
fn parse_arg<T: FromStr<Err = String>>(raw: &str) -> Result<T> {
    raw.parse().map_err(anyhow::Error::msg)
}

fn build_client(config: &Config, offline: bool) -> Result<OfflineClient> {
    let store = Arc::new(LocalStore::new(config.store_dir()?));
    let remote = Arc::new(
        HttpRemote::new(config.remote_base_url.as_str()).context("Failed to build HTTP client")?,
    );
    let sync = SyncCoordinator::new(
        store,
        remote,
        Connectivity::new(!offline),
        config.delivery_timeout(),
    );
    Ok(OfflineClient::new(sync))
}

fn profile_id(config: &Config) -> &str {
    config.profile_id.as_deref().unwrap_or(DEFAULT_PROFILE_ID)
}

async fn seed(client: &OfflineClient) -> Result<()> {
    let items = default_content();
    if client.store().seed_if_empty(&items).await? {
        println!("Seeded {} questions", items.len());
    } else {
        println!("Content already present, nothing seeded");
    }
    Ok(())
}

async fn list_content(
    client: &OfflineClient,
    category: Option<Category>,
    locale: Locale,
) -> Result<()> {
    let categories = match category {
        Some(c) => vec![c],
        None => Category::ALL.to_vec(),
    };
    for category in categories {
        for item in client.store().content_by_category(category, None, usize::MAX).await? {
            println!(
                "{:<18} {:<12} {:<7} {}",
                item.id,
                item.category.as_str(),
                item.difficulty.as_str(),
                truncate_string(item.prompt.get(locale), PROMPT_DISPLAY_WIDTH)
            );
            for (n, option) in item.options.get(locale).iter().enumerate() {
                println!("{:>22} {}", n, option);
            }
        }
    }
    Ok(())
}

async fn answer(
    client: &OfflineClient,
    config: &Config,
    content_id: &str,
    option: &str,
    secs: &str,
) -> Result<()> {
    let selected_option: usize = option
        .parse()
        .with_context(|| format!("Invalid option '{}'", option))?;
    let time_spent_secs: u64 = secs
        .parse()
        .with_context(|| format!("Invalid time '{}'", secs))?;

    let events = client.sync().events().subscribe();
    let attempt = client
        .submit_answer(NewAttempt {
            profile_id: profile_id(config).to_string(),
            content_id: content_id.to_string(),
            selected_option,
            time_spent_secs,
            locale: config.preferred_locale,
        })
        .await?;
    println!("{}", if attempt.is_correct { "Correct!" } else { "Incorrect" });

    wait_for_sync(client, config, events).await;
    println!("Pending operations: {}", client.sync().pending_count().await?);
    Ok(())
}

/// When online, give the pass started by the last enqueue a chance to
/// finish before the process exits. Anything undelivered stays queued.
async fn wait_for_sync(
    client: &OfflineClient,
    config: &Config,
    mut events: broadcast::Receiver<Message>,
) {
    if !client.sync().connectivity().is_online() {
        return;
    }
    let wait = config.delivery_timeout() * 2;
    if tokio::time::timeout(wait, events.recv()).await.is_err() {
        info!("Sync still running at exit");
    }
}

async fn create_profile(
    client: &OfflineClient,
    config: &mut Config,
    name: &str,
    class: &str,
    locale: Locale,
) -> Result<()> {
    let events = client.sync().events().subscribe();
    let profile = client
        .create_profile(NewProfile {
            name: name.to_string(),
            class: class.to_string(),
            school: None,
            preferred_locale: locale,
        })
        .await?;
    config.profile_id = Some(profile.id.clone());
    config.preferred_locale = locale;
    config.save().context("Failed to save config")?;
    println!("Created profile {} ({})", profile.id, profile.name);
    wait_for_sync(client, config, events).await;
    Ok(())
}

async fn show_profile(client: &OfflineClient, config: &Config) -> Result<()> {
    match client.store().get_profile(profile_id(config)).await? {
        Some(profile) => println!(
            "{}\n  name: {}\n  class: {}\n  locale: {}\n  last active: {}",
            profile.id,
            profile.name,
            profile.class,
            profile.preferred_locale,
            age_display(profile.last_active_at)
        ),
        None => println!("No profile yet. Create one with `funshiksha profile create`."),
    }
    Ok(())
}

async fn show_progress(client: &OfflineClient, config: &Config) -> Result<()> {
    let progress = client
        .store()
        .progress_for_profile(profile_id(config))
        .await?;
    if progress.is_empty() {
        println!("No progress yet");
    }
    for p in progress {
        println!(
            "{:<12} {:>3}/{:<3} ({:.0}%)  streak {}d  updated {}",
            p.category.as_str(),
            p.correct_answers,
            p.total_questions,
            p.accuracy(),
            p.streak_days,
            age_display(p.last_updated)
        );
        if !p.achievements.is_empty() {
            let names: Vec<String> = p
                .achievements
                .iter()
                .filter_map(|a| serde_json::to_value(a).ok())
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            println!("{:>14} {}", "achievements:", names.join(", "));
        }
    }
    Ok(())
}

async fn recompute(client: &OfflineClient, config: &Config) -> Result<()> {
    let rebuilt = client
        .store()
        .recompute_progress(profile_id(config))
        .await?;
    println!("Rebuilt {} progress aggregates", rebuilt.len());
    Ok(())
}

async fn show_status(client: &OfflineClient) -> Result<()> {
    let status = client.status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn sync(client: &OfflineClient) -> Result<()> {
    let report = client.sync().sync_pending().await?;
    println!(
        "{:?}: delivered {}, failed {}, remaining {}",
        report.outcome, report.delivered, report.failed, report.remaining
    );
    Ok(())
}

fn build_interceptor(config: &Config) -> Result<CacheInterceptor> {
    let storage = Arc::new(CacheStorage::new(config.cache_dir()?)?);
    let fetcher = Arc::new(HttpFetcher::new(&config.app_origin)?);
    Ok(CacheInterceptor::new(
        config.interceptor_config(),
        storage,
        fetcher,
    ))
}

async fn cache_install(config: &Config) -> Result<()> {
    let interceptor = build_interceptor(config)?;
    let count = interceptor
        .install()
        .await
        .context("Cache install failed")?;
    let deleted = interceptor.activate().await?;
    println!(
        "Cached {} resources in {}; removed {} old cache(s)",
        count,
        interceptor.config().cache_name,
        deleted.len()
    );
    Ok(())
}

async fn cache_fetch(config: &Config, url: &str, accept: Option<&str>) -> Result<()> {
    let interceptor = build_interceptor(config)?;
    if !interceptor.resume().await {
        // First run: try to install, but still answer the request if that fails
        match interceptor.install().await {
            Ok(_) => {
                interceptor.activate().await?;
            }
            Err(e) => info!(error = %e, "Serving without cache"),
        }
    }

    let mut request = Request::get(url);
    if let Some(accept) = accept {
        request = request.accept(accept);
    }
    let mut response = interceptor.handle(request).await?;
    interceptor.settle().await;

    eprintln!("{} {} ({:?})", response.status.as_u16(), response.status_text(), response.kind);
    print!("{}", response.text()?);
    Ok(())
}
