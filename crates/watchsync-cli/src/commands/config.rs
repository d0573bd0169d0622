use crate::output::Output;
use crate::ConfigCommands;
use chrono::{DateTime, Utc};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde_json::json;
use watch_sync_config::{Config, CredentialStore, PathManager};

pub async fn run_config(cmd: ConfigCommands, output: &Output) -> Result<()> {
    let paths = PathManager::default();
    match cmd {
        ConfigCommands::Show => show_config(&paths, output),
        ConfigCommands::Init { force } => init_config(&paths, force, output),
        ConfigCommands::Token { account, token, expires } => {
            let expires = expires.as_deref().map(parse_expiry).transpose()?;
            set_token(&paths, &account, token, expires, output)
        }
        ConfigCommands::RemoveToken { account } => remove_token(&paths, &account, output),
    }
}

fn parse_expiry(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| eyre!("Invalid --expires value '{}' (expected RFC 3339): {}", value, e))
}

fn load_credentials(paths: &PathManager) -> Result<CredentialStore> {
    let file = paths.credentials_file();
    let mut store = CredentialStore::new(file.clone());
    store
        .load()
        .map_err(|e| eyre!("Failed to load credentials from {}: {}", file.display(), e))?;
    Ok(store)
}

fn show_config(paths: &PathManager, output: &Output) -> Result<()> {
    let config_file = paths.config_file();
    if !config_file.exists() {
        output.warn(format!("Configuration file not found at: {}", config_file.display()));
        output.info("Defaults are used. Run 'watchsync config init' to write them to disk.");
    }
    let config = Config::load_or_default(&config_file)
        .map_err(|e| eyre!("Failed to load config from {}: {}", config_file.display(), e))?;

    output.json(&json!({
        "type": "config",
        "path": config_file.display().to_string(),
        "config": config,
    }));

    let history = match &config.history {
        Some(h) if config.is_history_configured() => format!("{} (client id set)", h.base_url),
        Some(_) => "disabled".to_string(),
        None => "not configured".to_string(),
    };
    let schedule = config
        .scheduler
        .as_ref()
        .map(|s| format!("every {} min, startup sync: {}", s.interval_minutes, s.run_on_startup))
        .unwrap_or_else(|| "default".to_string());

    output.table(
        &["Setting", "Value"],
        vec![
            vec!["Config file".to_string(), config_file.display().to_string()],
            vec!["Library API".to_string(), config.library.base_url.clone()],
            vec!["History API".to_string(), history],
            vec!["Metadata API".to_string(), config.metadata.base_url.clone()],
            vec!["Metadata cache TTL".to_string(), format!("{} s", config.metadata.cache_ttl_secs)],
            vec!["Account sync".to_string(), config.sync.account_sync.to_string()],
            vec!["History sync".to_string(), config.sync.history_sync.to_string()],
            vec!["History page size".to_string(), config.sync.history_page_limit.to_string()],
            vec!["Rate limit retries".to_string(), config.sync.max_rate_limit_retries.to_string()],
            vec!["Schedule".to_string(), schedule],
        ],
    );
    Ok(())
}

fn init_config(paths: &PathManager, force: bool, output: &Output) -> Result<()> {
    let config_file = paths.config_file();
    if config_file.exists() && !force {
        output.warn(format!(
            "Configuration already exists at {} (use --force to overwrite)",
            config_file.display()
        ));
        return Ok(());
    }
    paths
        .ensure_directories()
        .map_err(|e| eyre!("Failed to create directories: {}", e))?;
    Config::default()
        .save_to_file(&config_file)
        .map_err(|e| eyre!("Failed to write {}: {}", config_file.display(), e))?;
    output.success(format!("Wrote default configuration to {}", config_file.display()));
    Ok(())
}

fn set_token(
    paths: &PathManager,
    account: &str,
    token: String,
    expires: Option<DateTime<Utc>>,
    output: &Output,
) -> Result<()> {
    let mut store = load_credentials(paths)?;
    store.set_account_token(account, token);
    if let Some(expires) = expires {
        store.set_account_token_expires(account, expires);
    }
    store
        .save()
        .map_err(|e| eyre!("Failed to save credentials: {}", e))?;
    output.success(format!("Stored token for account {}", account));
    Ok(())
}

fn remove_token(paths: &PathManager, account: &str, output: &Output) -> Result<()> {
    let mut store = load_credentials(paths)?;
    if store.get_account_token(account).is_none() {
        output.warn(format!("No token stored for account {}", account));
        return Ok(());
    }
    store.remove_account(account);
    store
        .save()
        .map_err(|e| eyre!("Failed to save credentials: {}", e))?;
    output.success(format!("Removed token for account {}", account));
    Ok(())
}
