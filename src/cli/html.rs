use asyncscope::config::{Configuration, DriverConfig, DriverKind, MarkAsync, SerializerConfig};
use asyncscope::engine::EngineOptions;
use std::path::PathBuf;

pub fn run(
    path: PathBuf,
    line: u32,
    fn_index: usize,
    save_config: Option<PathBuf>,
    save_output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let page = PathBuf::from(path.file_name().ok_or("path has no file name")?);

    let config = Configuration {
        driver: DriverConfig {
            kind: DriverKind::Html,
            root,
            scripts: Vec::new(),
            path_to_html: Some(page.clone()),
            ignore: Vec::new(),
            mark_async: MarkAsync {
                path: page,
                line,
                function_index: fn_index,
            },
            options: EngineOptions::default(),
        },
        serializer: SerializerConfig::default(),
    };

    if let Some(target) = save_config {
        config.save(&target)?;
    }
    let output = config.execute()?;
    super::emit(output, save_output)
}
