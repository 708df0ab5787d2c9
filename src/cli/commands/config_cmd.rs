//! The `config` command: show the effective configuration.

use std::path::Path;

use console::style;

use tallyscan::Config;

/// Print the configuration as TOML. Status lines go to stderr so the
/// output can be redirected into a config file.
pub async fn cmd_config(config: &Config, source: Option<&Path>) -> anyhow::Result<()> {
    match source {
        Some(path) => eprintln!("{} Loaded from {}", style("→").dim(), path.display()),
        None => eprintln!(
            "{} No config file found, showing defaults",
            style("!").yellow()
        ),
    }

    print!("{}", config.to_toml_string()?);
    Ok(())
}
