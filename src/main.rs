use std::process;
use std::rc::Rc;

use clap::Parser;
use log::{debug, error, info};
use regex::Regex;

mod protocol;
mod transport;
mod utils;

mod console;
mod option;
mod tracker;

use crate::console::EventFilter;
use crate::option::{ConfigError, TrackerOption};
use crate::protocol::RideEvent;
use crate::tracker::RideTracker;
use crate::utils::emiter::EventManager;

/// ridebus follows ride lifecycle events pushed over a websocket
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// json config file
    #[arg(short, long)]
    pub config: Option<String>,
    /// websocket url, overrides the config file
    #[arg(short, long)]
    pub url: Option<String>,
    /// only print events for this ride id
    #[arg(short, long)]
    pub ride: Option<String>,
    /// only subscribe to event names matching this regex
    #[arg(short, long)]
    pub events: Option<String>,
    /// also print this event name as-is, may be repeated
    #[arg(short, long, value_name = "NAME")]
    pub also: Vec<String>,
    /// print the retained event history as json on exit
    #[arg(long)]
    pub dump_history: bool,
}

fn main() {
    let args = Args::parse();
    let opts = match load_options(&args) {
        Ok(opts) => opts,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(2);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&opts.log_level)).init();
    utils::install_panic_logger();
    debug!("opts: {:?}", opts);

    let names = match args.events.as_deref().map(Regex::new).transpose() {
        Ok(names) => names,
        Err(err) => {
            error!("invalid --events pattern: {}", err);
            process::exit(2);
        }
    };
    let filter = EventFilter {
        ride_id: opts.ride_id.clone(),
        names,
        extra: args.also.clone(),
    };

    let events: Rc<EventManager<RideEvent>> = Rc::new(EventManager::with_history_limit(opts.history_limit));
    let subscriptions = console::attach(&events, &filter);
    info!("listening to {:?}", events.listener_counts());
    info!("keeping the last {} events", events.history_limit());

    let tracker = RideTracker::new(opts, events.clone());
    let outcome = tracker.bootstrap();
    console::detach(&events, &subscriptions);
    debug!("{} listeners left after detach", events.total_listeners());

    if args.dump_history {
        match serde_json::to_string_pretty(&events.event_history()) {
            Ok(json) => println!("{}", json),
            Err(err) => error!("dump history failed: {}", err),
        }
    }

    if let Err(err) = outcome {
        error!("tracker stopped: {}", err);
        process::exit(1);
    }
}

fn load_options(args: &Args) -> Result<TrackerOption, ConfigError> {
    let mut opts = match (&args.config, &args.url) {
        (Some(path), _) => TrackerOption::load(path)?,
        (None, Some(url)) => TrackerOption::new(url),
        (None, None) => return Err(ConfigError::MissingUrl),
    };
    if let Some(url) = &args.url {
        opts.url = url.clone();
    }
    if let Some(ride) = &args.ride {
        opts.ride_id = Some(ride.clone());
    }
    opts.validate()?;
    Ok(opts)
}
