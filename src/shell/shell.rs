use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use log::debug;

use crate::shell::executor::Executor;
use crate::shell::parser::Parser;
use crate::shell::readline::{ReadlineError, ReadlineManager};
use crate::shell::signals;
use crate::utils::config::Config;

pub struct Shell<'a> {
    config: &'a Config,
    executor: Executor,
}

impl<'a> Shell<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            executor: Executor::new(),
        }
    }

    /// Sets up the terminal and runs the shell to end-of-input. Reading
    /// from a script file that cannot be opened is the one startup error;
    /// it surfaces to `main` as exit code 1.
    pub fn run(&mut self) -> Result<(), Box<dyn Error>> {
        signals::ignore_sigttou();
        signals::claim_foreground();

        match self.config.script.clone() {
            Some(path) => self.run_script(&path),
            None => self.run_interactive(),
        }
    }

    fn prompt(&self) -> String {
        if self.config.quiet {
            String::new()
        } else {
            format!("sh61[{}]$ ", std::process::id())
        }
    }

    fn run_interactive(&mut self) -> Result<(), Box<dyn Error>> {
        let mut readline = ReadlineManager::new(self.config)?;
        readline.load_history();
        debug!("sh61 ready");

        loop {
            std::io::stdout().flush()?;
            match readline.readline(&self.prompt()) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        readline.add_history(&line);
                    }
                    self.handle_line(&line);
                }
                Err(ReadlineError::Eof) => break,
                Err(ReadlineError::Interrupted) => continue,
                Err(err) => {
                    eprintln!("sh61: {}", err);
                    break;
                }
            }
        }

        readline.save_history();
        debug!("sh61 exiting");
        Ok(())
    }

    fn run_script(&mut self, path: &Path) -> Result<(), Box<dyn Error>> {
        let file = File::open(path).map_err(|err| format!("{}: {}", path.display(), err))?;
        let reader = BufReader::new(file);

        for line in reader.lines() {
            // The prompt is keyed to quietness, not to the input source.
            if !self.config.quiet {
                print!("{}", self.prompt());
                std::io::stdout().flush()?;
            }
            let line = line?;
            self.handle_line(&line);
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        debug!("input: {}", line);

        match Parser::new(line).parse_line() {
            Ok(Some(mut list)) => self.executor.run_line(&mut list),
            Ok(None) => {}
            Err(err) => eprintln!("sh61: {}", err),
        }
    }
}
