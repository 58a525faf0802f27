use std::{num::NonZeroUsize, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use event_catalog::{
    auth, browser::EventCard, AppConfig, CollectionController, ConfigStore, ControllerSettings,
    DifficultyLevel, Event, EventBrowser, HttpApi, LoadOutcome, NewAccount, RegisterOutcome,
    RegistrationTracker, SessionAuth, SortOrder,
};

#[derive(Parser)]
#[command(name = "event-catalog", about = "Browse and join running events")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List events, filtered and paged.
    List {
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        level: Option<DifficultyLevel>,
        /// Sort names Z to A.
        #[arg(long)]
        desc: bool,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        page_size: Option<NonZeroUsize>,
    },
    /// Show the next events by date.
    Upcoming {
        #[arg(long)]
        count: Option<usize>,
    },
    /// Show cities and levels available for filtering.
    Options,
    Register {
        event_id: i64,
    },
    Cancel {
        event_id: i64,
    },
    /// List events you are registered for.
    Mine,
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account.
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        surname: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        gender: Option<String>,
    },
    /// Check the saved session with the server.
    Whoami,
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("event_catalog=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = Arc::new(ConfigStore::load());
    let config = store.read();

    match cli.command {
        Command::List {
            search,
            city,
            level,
            desc,
            page,
            page_size,
        } => {
            let controller = controller_for(&config)?;
            controller.set_search_text(search);
            controller.set_city(city);
            controller.set_level(level);
            controller.set_sort_order(if desc { SortOrder::Desc } else { SortOrder::Asc });
            load_or_fail(&controller).await?;

            let tracker = tracker_for(&config, &store)?;
            if let Err(err) = tracker.refresh().await {
                warn!("could not load your registrations: {err}");
            }
            tracker.publish_to(&controller);

            let mut browser =
                EventBrowser::new(controller.clone(), page_size.unwrap_or(config.page_size()));
            if page != 1 && !browser.paginator_mut().go_to_page(page) {
                warn!(page, "page out of range, showing page 1");
            }
            print_page(&browser);
            controller.dispose();
        }
        Command::Upcoming { count } => {
            let controller = controller_for(&config)?;
            let count = count.unwrap_or(config.upcoming_count);
            if controller.load_upcoming(count).await == LoadOutcome::Failed {
                bail!(controller.upcoming_error().unwrap_or_default());
            }
            for event in controller.upcoming().iter() {
                print_event(event, false);
            }
        }
        Command::Options => {
            let controller = controller_for(&config)?;
            load_or_fail(&controller).await?;
            let options = controller.filter_options();
            println!("cities: {}", options.cities.join(", "));
            let levels: Vec<&str> = options.levels.iter().map(|l| l.as_api_str()).collect();
            println!("levels: {}", levels.join(", "));
        }
        Command::Register { event_id } => {
            let tracker = tracker_for(&config, &store)?;
            match tracker.register(event_id).await? {
                RegisterOutcome::Registered(_) => println!("registered for event {event_id}"),
                RegisterOutcome::LoginRequired { .. } => println!(
                    "sign in with `event-catalog login` to finish registering for event {event_id}"
                ),
            }
        }
        Command::Cancel { event_id } => {
            let tracker = tracker_for(&config, &store)?;
            if tracker.cancel(event_id).await? {
                println!("registration for event {event_id} cancelled");
            } else {
                bail!("the server did not confirm the cancellation");
            }
        }
        Command::Mine => {
            let controller = controller_for(&config)?;
            load_or_fail(&controller).await?;
            let tracker = tracker_for(&config, &store)?;
            tracker.refresh().await?;
            for event in controller.original().iter() {
                if tracker.is_registered(event.id) {
                    print_event(event, true);
                }
            }
        }
        Command::Login { email, password } => {
            let api = HttpApi::from_config(&config)?;
            let user = auth::login(&api, &store, &email, &password).await?;
            println!("signed in as {}", user.name);

            let tracker = tracker_for(&store.read(), &store)?;
            if let Some(participation) = tracker.resume_pending().await? {
                println!("registered for event {}", participation.event_id);
            }
        }
        Command::Signup {
            name,
            surname,
            email,
            password,
            gender,
        } => {
            let api = HttpApi::from_config(&config)?;
            let account = NewAccount {
                name,
                surname,
                email: email.trim().to_string(),
                password,
                gender,
            };
            let user = auth::register(&api, &store, &account).await?;
            if store.read().user_id == Some(user.id) {
                println!("account created, signed in as {}", user.name);
            } else {
                println!("account created, sign in with `event-catalog login`");
            }
        }
        Command::Whoami => {
            let api = HttpApi::from_config(&config)?;
            match auth::check_session(&api, &store).await? {
                Some(user) => println!("signed in as {} <{}>", user.name, user.email),
                None => println!("not signed in"),
            }
        }
        Command::Logout => {
            let api = HttpApi::from_config(&config)?;
            auth::logout(&api, &store).await?;
            println!("signed out");
        }
    }

    Ok(())
}

fn controller_for(config: &AppConfig) -> Result<Arc<CollectionController>> {
    let api = HttpApi::from_config(config).context("building api client")?;
    Ok(Arc::new(CollectionController::new(
        Arc::new(api),
        ControllerSettings::from(config),
    )))
}

fn tracker_for(config: &AppConfig, store: &Arc<ConfigStore>) -> Result<RegistrationTracker> {
    let api = HttpApi::from_config(config).context("building api client")?;
    Ok(RegistrationTracker::new(
        Arc::new(api),
        Arc::new(SessionAuth::new(store.clone())),
        store.clone(),
    ))
}

async fn load_or_fail(controller: &CollectionController) -> Result<()> {
    match controller.load().await {
        LoadOutcome::Applied => Ok(()),
        _ => Err(anyhow!(controller
            .error()
            .unwrap_or_else(|| "event load did not complete".to_string()))),
    }
}

fn print_page(browser: &EventBrowser) {
    let state = browser.state();
    if state.total_items == 0 {
        println!("No events match the current filters.");
        return;
    }
    for EventCard { event, registered } in browser.cards() {
        print_event(event, registered);
    }
    println!(
        "page {}/{} ({} events)",
        state.current_page, state.total_pages, state.total_items
    );
}

fn print_event(event: &Event, registered: bool) {
    let badge = if registered { " [registered]" } else { "" };
    let featured = if event.featured { " *" } else { "" };
    println!(
        "{:>5}  {}  {:<32} {:<14} {}{}{}",
        event.id,
        event.date.format("%Y-%m-%d %H:%M"),
        event.title(),
        event.city,
        event.level,
        featured,
        badge
    );
}
