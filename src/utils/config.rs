use dotenv::dotenv;
use rustyline::EditMode;
use std::env;
use std::fs;
use std::path::PathBuf;

use clap::{Arg, ArgAction, Command};
use log::warn;

pub struct Config {
    pub quiet: bool,
    pub script: Option<PathBuf>,
    pub history_file: PathBuf,
    pub editor_mode: String,
    pub logger_level: String,
}

impl Config {
    fn config_dir() -> PathBuf {
        if let Ok(home) = env::var("HOME") {
            PathBuf::from(home).join(".config/sh61")
        } else {
            PathBuf::from("/tmp/sh61")
        }
    }

    fn default() -> Self {
        Config {
            quiet: false,
            script: None,
            history_file: Self::config_dir().join("history"),
            editor_mode: String::from("emacs"),
            logger_level: String::from("warn"),
        }
    }

    pub fn new() -> Self {
        dotenv().ok();

        let matches = Command::new("sh61")
            .about("A small process-control shell")
            .arg(
                Arg::new("quiet")
                    .short('q')
                    .help("Print no prompts")
                    .action(ArgAction::SetTrue),
            )
            .arg(
                Arg::new("file")
                    .value_name("FILE")
                    .help("Read commands from FILE instead of standard input")
                    .index(1),
            )
            .get_matches();

        let mut config = Config::default();
        config.quiet = matches.get_flag("quiet");
        config.script = matches.get_one::<String>("file").map(PathBuf::from);

        if let Ok(history) = env::var("SH61_HISTORY") {
            config.history_file = PathBuf::from(history);
        }
        if let Ok(editor) = env::var("SH61_EDITOR") {
            config.editor_mode = editor;
        }
        if let Ok(level) = env::var("SH61_LOG") {
            config.logger_level = level;
        }

        if let Some(parent) = config.history_file.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!("cannot create history directory: {}", err);
            }
        }

        config
    }

    pub fn edit_mode(&self) -> EditMode {
        match self.editor_mode.to_lowercase().as_str() {
            "vi" => EditMode::Vi,
            _ => EditMode::Emacs,
        }
    }
}
