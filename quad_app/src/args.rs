//! Command line flags
//!
//! Parsing never fails the process: unknown flags and malformed versions fall
//! back to [`ParsedArgs::Help`] carrying the text to print.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

use clap::{Arg, ArgAction, Command};
use thiserror::Error;
use vk_session::prelude::ApiVersion;

const DEFAULT_API_VERSION: &str = "1.3";

/// Why the flags could not be turned into [`LaunchArgs`]
#[derive(Error, Debug)]
pub enum ArgsError {
    /// clap rejected the command line
    #[error("{0}")]
    Clap(#[from] clap::Error),

    /// `--vk-ver` is not `major.minor`
    #[error("bad version number: [{0}]")]
    BadVersion(String),
}

/// Settings selected on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchArgs {
    /// Route session diagnostics to stderr
    pub verbose: bool,
    /// Requested Vulkan API version
    pub api_version: ApiVersion,
    /// Require the Khronos validation layer
    pub validation: bool,
    /// Attach a debug-utils messenger
    pub debug_callback: bool,
    /// High pixel density window
    pub hdpi: bool,
    /// Optional TOML or RON configuration file
    pub config: Option<PathBuf>,
    /// Optional game library to load and hot-reload
    pub game_lib: Option<PathBuf>,
}

/// Outcome of parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedArgs {
    /// Start the application
    Run(LaunchArgs),
    /// Print the text and exit
    Help(String),
}

fn command() -> Command {
    Command::new("quad_app")
        .about("Draws a rotating quad through a Vulkan session")
        .disable_help_flag(true)
        .arg(
            Arg::new("help")
                .short('h')
                .long("help")
                .action(ArgAction::SetTrue)
                .help("print this help"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("enable verbose mode"),
        )
        .arg(
            Arg::new("vk-ver")
                .long("vk-ver")
                .value_name("MAJOR.MINOR")
                .default_value(DEFAULT_API_VERSION)
                .help("desired vulkan version in format 1.0 or 1.1 or 1.2 or 1.3 or 1.4"),
        )
        .arg(
            Arg::new("vk-validation-layer")
                .short('l')
                .long("vk-validation-layer")
                .action(ArgAction::SetTrue)
                .help("enable VK_LAYER_KHRONOS_validation"),
        )
        .arg(
            Arg::new("vk-debug-callback")
                .short('d')
                .long("vk-debug-callback")
                .action(ArgAction::SetTrue)
                .help("enable VK_EXT_debug_utils"),
        )
        .arg(
            Arg::new("hdpi")
                .long("hdpi")
                .action(ArgAction::SetTrue)
                .help("enable high pixel density"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("load settings from a .toml or .ron file"),
        )
        .arg(
            Arg::new("game-lib")
                .long("game-lib")
                .value_name("PATH")
                .help("load the game from a shared library and reload it when rebuilt"),
        )
}

/// Rendered `--help` text
pub fn help_text() -> String {
    command().render_help().to_string()
}

/// Parse an argument list, first element being the program name
pub fn parse<I, T>(args: I) -> ParsedArgs
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match try_parse(args) {
        Ok(Some(launch)) => ParsedArgs::Run(launch),
        Ok(None) => ParsedArgs::Help(help_text()),
        Err(ArgsError::Clap(e)) => ParsedArgs::Help(e.render().to_string()),
        Err(e @ ArgsError::BadVersion(_)) => ParsedArgs::Help(format!("error: {e}\n{}", help_text())),
    }
}

/// `Ok(None)` when help was requested
fn try_parse<I, T>(args: I) -> Result<Option<LaunchArgs>, ArgsError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = command().try_get_matches_from(args)?;
    if matches.get_flag("help") {
        return Ok(None);
    }

    let version = matches
        .get_one::<String>("vk-ver")
        .map_or(DEFAULT_API_VERSION, String::as_str);
    let api_version = version
        .parse::<ApiVersion>()
        .map_err(|_| ArgsError::BadVersion(version.to_string()))?;

    Ok(Some(LaunchArgs {
        verbose: matches.get_flag("verbose"),
        api_version,
        validation: matches.get_flag("vk-validation-layer"),
        debug_callback: matches.get_flag("vk-debug-callback"),
        hdpi: matches.get_flag("hdpi"),
        config: matches.get_one::<String>("config").map(PathBuf::from),
        game_lib: matches.get_one::<String>("game-lib").map(PathBuf::from),
    }))
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}

impl fmt::Display for LaunchArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = |p: &Option<PathBuf>| p.as_ref().map_or_else(|| "(none)".to_string(), |p| p.display().to_string());
        let rows = [
            ("Vulkan version", self.api_version.to_string()),
            ("Verbose", enabled(self.verbose).to_string()),
            ("Validation layer", enabled(self.validation).to_string()),
            ("Debug callback", enabled(self.debug_callback).to_string()),
            ("High pixel density", enabled(self.hdpi).to_string()),
            ("Config file", path(&self.config)),
            ("Game library", path(&self.game_lib)),
        ];

        let value_width = rows.iter().map(|(_, v)| v.chars().count()).max().unwrap_or(0).max(5);
        let rule = |left: char, mid: char, right: char| {
            format!("{left}{}{mid}{}{right}", "─".repeat(22), "─".repeat(value_width + 2))
        };

        writeln!(f, "{}", rule('┌', '┬', '┐'))?;
        writeln!(f, "│ {:<20} │ {:<value_width$} │", "Parameter", "Value")?;
        writeln!(f, "{}", rule('├', '┼', '┤'))?;
        for (name, value) in &rows {
            writeln!(f, "│ {name:<20} │ {value:<value_width$} │")?;
        }
        write!(f, "{}", rule('└', '┴', '┘'))
    }
}
