use asyncscope::config::Configuration;
use std::path::PathBuf;

pub fn run(file: PathBuf, save_output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Configuration::load(&file)?;
    let output = config.execute()?;
    super::emit(output, save_output)
}
