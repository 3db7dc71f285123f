use anyhow::{Context, Result};
use heck::SnakeCase;
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use structopt::StructOpt;
use surf::Url;

#[derive(Debug)]
pub struct Config {
    /// Enables verbose logging of errors that occur while gathering metrics
    pub debug: bool,

    /// How frequently (in seconds) to log internal debug metrics
    pub debug_interval: Option<Duration>,

    /// How frequently (in seconds) to start a generation of gatherers.
    pub gather_interval: Duration,

    /// How long (in seconds) to wait to receive a response from a target.
    pub gather_timeout: Duration,

    /// The services to gather metrics for, and the url each one is scraped from.
    /// e.g. "api=http://localhost:9025/metrics,worker=http://localhost:9026/metrics"
    pub targets: Vec<(String, Url)>,

    /// Whether to print every gathered series as JSON when shutting down
    pub dump: bool,
}

impl Config {
    /// Loads configuration from arguments, env and dotenv
    pub fn load() -> Result<Config> {
        // Attempts to find a `.env` file to initialize/extend the environment
        dotenv::dotenv().ok();

        // Load the config from arguments, then environment variables
        let env = Environment::from_args();
        Config::from_env(env)
    }

    fn from_env(env: Environment) -> Result<Config> {
        Ok(Config {
            debug: env.debug
                || match dotenv::var("DEBUG").ok() {
                    Some(val) => parse_toggle(&val).context("invalid DEBUG")?,
                    None => false,
                },
            debug_interval: match env.debug_interval {
                ToggleValue::Enabled(secs) => Some(Duration::from_secs(secs)),
                ToggleValue::EnabledDefault => Some(Duration::from_secs(300)),
                ToggleValue::Disabled => None,
            },
            gather_interval: Duration::from_secs(env.gather_interval.max(1)),
            gather_timeout: Duration::from_secs(env.gather_timeout),
            targets: parse_targets(&env.targets).context("invalid GATHER_TARGETS")?,
            dump: env.dump || parse_toggle(&env.dump_env).context("invalid METRICS_DUMP")?,
        })
    }
}

fn parse_toggle(val: &str) -> Result<bool> {
    match val {
        "true" | "on" | "1" => Ok(true),
        "false" | "off" | "0" | "" => Ok(false),
        _ => Ok(val.parse::<bool>()?),
    }
}

/// Parse a comma separated list of `service=url` pairs
fn parse_targets(targets: &str) -> Result<Vec<(String, Url)>> {
    let mut seen = HashSet::new();
    targets
        .split(',')
        .filter(|x| !x.trim().is_empty())
        .map(|name_url| {
            let name_url = name_url.trim().splitn(2, '=').collect::<Vec<_>>();
            match name_url.as_slice() {
                [name, url]
                    if !url.is_empty() && !name.is_empty() && *name == name.to_snake_case() =>
                {
                    if !seen.insert(name.to_string()) {
                        return Err(anyhow::format_err!("duplicate service '{}'", name));
                    }
                    Ok((name.to_string(), parse_url(url)?))
                }
                _ => Err(anyhow::format_err!(
                    "expected 'service=url', got '{}'",
                    name_url.join("=")
                )),
            }
        })
        .collect()
}

/// Parse a target url, which must be absolute and use http(s)
fn parse_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).with_context(|| format!("invalid url '{}'", url))?;
    match parsed.scheme() {
        "http" | "https" if parsed.has_host() => Ok(parsed),
        _ => Err(anyhow::format_err!("url '{}' must be an http(s) url", url)),
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "gather-bot")]
struct Environment {
    /// Enables verbose logging of errors that occur while gathering metrics
    #[structopt(short, long)]
    debug: bool,

    /// How frequently (in seconds) to log internal debug metrics
    #[structopt(long, env = "DEBUG_INTERVAL", default_value = "300")]
    debug_interval: ToggleValue<u64>,

    /// How frequently (in seconds) to run every gatherer
    #[structopt(long, env = "GATHER_INTERVAL", default_value = "15")]
    gather_interval: u64,

    /// How long (in seconds) to wait for a target to respond
    #[structopt(long, env = "GATHER_TIMEOUT", default_value = "5")]
    gather_timeout: u64,

    /// A comma separated list of `service=url` targets to gather from
    #[structopt(short = "t", long, env = "GATHER_TARGETS")]
    targets: String,

    /// Print every gathered series as JSON on shutdown
    #[structopt(long)]
    dump: bool,

    /// Same as `--dump`, but as a toggle (on, off)
    #[structopt(long = "dump-env", env = "METRICS_DUMP", default_value = "", hidden = true)]
    dump_env: String,
}

#[derive(Debug, Eq, PartialEq)]
enum ToggleValue<T: FromStr> {
    Enabled(T),
    EnabledDefault,
    Disabled,
}

impl<T: FromStr> Default for ToggleValue<T> {
    fn default() -> Self {
        ToggleValue::Disabled
    }
}

impl<T: FromStr> FromStr for ToggleValue<T> {
    type Err = T::Err;
    fn from_str(val: &str) -> std::result::Result<Self, Self::Err> {
        match val {
            "false" | "off" | "0" | "" => Ok(ToggleValue::Disabled),
            "true" | "on" | "1" => Ok(ToggleValue::EnabledDefault),
            _ => val.parse().map(ToggleValue::Enabled),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_targets() {
        let targets =
            parse_targets("api=http://10.0.0.1:9025/metrics, worker=http://10.0.0.2/m?a=b")
                .unwrap();
        assert_eq!(
            targets,
            vec![
                (
                    "api".to_string(),
                    Url::parse("http://10.0.0.1:9025/metrics").unwrap()
                ),
                (
                    "worker".to_string(),
                    Url::parse("http://10.0.0.2/m?a=b").unwrap()
                ),
            ]
        );
        assert!(parse_targets("").unwrap().is_empty());
    }

    #[test]
    fn rejects_invalid_targets() {
        assert!(parse_targets("api").is_err());
        assert!(parse_targets("api=").is_err());
        assert!(parse_targets("=http://localhost").is_err());
        assert!(parse_targets("MyService=http://localhost").is_err());
        assert!(parse_targets("api=http://a,api=http://b").is_err());

        // Urls are checked up front, instead of failing on every gather
        assert!(parse_targets("api=not a url").is_err());
        assert!(parse_targets("api=/metrics").is_err());
        assert!(parse_targets("api=localhost:9025/metrics").is_err());
        assert!(parse_targets("api=ftp://localhost/metrics").is_err());
        assert!(parse_targets("api=https://localhost/metrics").is_ok());
    }

    #[test]
    fn parses_toggle_values() {
        assert_eq!("off".parse::<ToggleValue<u64>>().unwrap(), ToggleValue::Disabled);
        assert_eq!("on".parse::<ToggleValue<u64>>().unwrap(), ToggleValue::EnabledDefault);
        assert_eq!("60".parse::<ToggleValue<u64>>().unwrap(), ToggleValue::Enabled(60));
        assert!("soon".parse::<ToggleValue<u64>>().is_err());
        assert!(parse_toggle("1").unwrap());
        assert!(!parse_toggle("").unwrap());
        assert!(parse_toggle("maybe").is_err());
    }

    #[test]
    fn loads_from_arguments() {
        let env = Environment::from_iter_safe(&[
            "gather-bot",
            "--targets",
            "api=http://localhost:9025/metrics",
            "--gather-interval",
            "0",
            "--debug-interval",
            "off",
            "--dump",
        ])
        .unwrap();
        let config = Config::from_env(env).unwrap();
        assert_eq!(config.gather_interval, Duration::from_secs(1));
        assert_eq!(config.debug_interval, None);
        assert_eq!(config.targets.len(), 1);
        assert!(config.dump);
    }
}
