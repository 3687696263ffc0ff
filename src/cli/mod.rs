mod configuration;
mod html;
mod standalone;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "asyncscope",
    version,
    about = "Static async/await propagation analysis for JavaScript",
    long_about = "Asyncscope takes one function you intend to make async and computes every \
                  other function that must also become async, and every call site that must \
                  become awaited, to keep the program consistent. Locations where the async \
                  keyword is illegal (constructors, getters, setters) are flagged for manual \
                  refactoring."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a standalone JavaScript file
    #[command(long_about = "Analyzes a single JavaScript file. The seed function is the one \
                            at the given line; use --fnIndex when several functions share it.")]
    Standalone {
        /// Path to the JavaScript file
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Line of the function to mark async (1-based, in the file)
        #[arg(value_name = "LINE")]
        line: u32,

        /// Which function on that line to seed (0-based)
        #[arg(long = "fnIndex", default_value_t = 0, value_name = "N")]
        fn_index: usize,

        /// Write the equivalent configuration document to FILE
        #[arg(long = "save-config", value_name = "FILE")]
        save_config: Option<PathBuf>,

        /// Write the report to FILE instead of stdout
        #[arg(long = "save-output", value_name = "FILE")]
        save_output: Option<PathBuf>,
    },
    /// Analyze the scripts of an HTML page
    #[command(long_about = "Extracts every <script> of the page (inline bodies keep their \
                            line numbers, src files are read from disk) and analyzes the \
                            result. The seed coordinates name an inline function of the page; \
                            to seed inside an external script, use a configuration document.")]
    Html {
        /// Path to the HTML page
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Line of the function to mark async (1-based, in the page)
        #[arg(value_name = "LINE")]
        line: u32,

        /// Which function on that line to seed (0-based)
        #[arg(long = "fnIndex", default_value_t = 0, value_name = "N")]
        fn_index: usize,

        /// Write the equivalent configuration document to FILE
        #[arg(long = "save-config", value_name = "FILE")]
        save_config: Option<PathBuf>,

        /// Write the report to FILE instead of stdout
        #[arg(long = "save-output", value_name = "FILE")]
        save_output: Option<PathBuf>,
    },
    /// Run a saved configuration document
    Configuration {
        /// Path to the configuration JSON
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Write the report to FILE instead of stdout
        #[arg(long = "save-output", value_name = "FILE")]
        save_output: Option<PathBuf>,
    },
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let _guard = asyncscope::logging::init_logging("cli");

    match cli.command {
        Commands::Standalone {
            path,
            line,
            fn_index,
            save_config,
            save_output,
        } => standalone::run(path, line, fn_index, save_config, save_output),
        Commands::Html {
            path,
            line,
            fn_index,
            save_config,
            save_output,
        } => html::run(path, line, fn_index, save_config, save_output),
        Commands::Configuration { file, save_output } => configuration::run(file, save_output),
    }
}

pub(crate) fn emit(output: String, save_output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    match save_output {
        Some(path) => std::fs::write(path, output)?,
        None => print!("{output}"),
    }
    Ok(())
}
