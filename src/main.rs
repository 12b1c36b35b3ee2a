#[macro_use]
extern crate clap;
extern crate weblogstat;

use std::path::PathBuf;
use std::process;

use clap::{App, ArgMatches};
use weblogstat::{Error, Options};

fn main() {
    let yaml = load_yaml!("cli.yml");
    let matches = App::from_yaml(yaml).get_matches();
    init_logging(matches.occurrences_of("verbose"));

    let result = options_from(&matches).and_then(|options| weblogstat::run(&options));
    if let Err(e) = result {
        eprintln!("Application error: {}", e);
        process::exit(1);
    }
}

fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn options_from(matches: &ArgMatches<'_>) -> weblogstat::Result<Options> {
    let hours = value_t!(matches, "hours", i64).map_err(|e| Error::InvalidArgument(e.message))?;
    let max_items = value_t!(matches, "max-items", usize).map_err(|e| Error::InvalidArgument(e.message))?;

    Ok(Options {
        hours,
        max_items,
        compare_previous: matches.is_present("compare-previous"),
        json: matches.value_of("json").map(PathBuf::from),
        config: matches.value_of("config").map(PathBuf::from),
        logs: matches
            .values_of("log")
            .map(|values| values.map(PathBuf::from).collect())
            .unwrap_or_default(),
        ..Options::default()
    })
}
