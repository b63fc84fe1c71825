//! `markwright config`: configuration management commands.

use markwright_config::AppConfig;

/// Print the built-in defaults as TOML.
pub fn default_toml() -> Result<(), Box<dyn std::error::Error>> {
    print!("{}", AppConfig::default_toml());
    Ok(())
}

/// Print the effective configuration (file plus environment overrides).
pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");
            if config.gateway.host == "0.0.0.0" {
                println!("   warning: gateway is bound to all interfaces");
            }
            println!();
            println!("   Max concurrent: {}", config.queue.max_concurrent);
            match config.queue.max_pending {
                Some(cap) => println!("   Max pending:    {cap}"),
                None => println!("   Max pending:    unbounded"),
            }
            println!("   Max rounds:     {}", config.reasoning.max_rounds);
            println!("   Gateway:        {}:{}", config.gateway.host, config.gateway.port);
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
