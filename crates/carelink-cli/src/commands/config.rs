use carelink_core::util::normalize_text_option;
use carelink_core::AppConfig;

use crate::cli::{ConfigCommands, ProviderArg};
use crate::commands::common::{print_json, CliEnv};
use crate::error::CliError;

/// Values accepted by `config init`.
#[derive(Debug, Default)]
pub struct ConfigUpdate {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub token_endpoint: Option<String>,
    pub provider: Option<ProviderArg>,
    pub language: Option<String>,
    pub sync_interval: Option<u64>,
}

pub fn run_config(command: ConfigCommands, env: &CliEnv) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show { json } => {
            let config = env.load_config()?;
            if json {
                print_json(&config)?;
            } else {
                for line in format_config_lines(&config) {
                    println!("{line}");
                }
            }
        }
        ConfigCommands::Path => println!("{}", env.config_path.display()),
        ConfigCommands::Init {
            supabase_url,
            supabase_anon_key,
            token_endpoint,
            provider,
            language,
            sync_interval,
        } => {
            let update = ConfigUpdate {
                supabase_url,
                supabase_anon_key,
                token_endpoint,
                provider,
                language,
                sync_interval,
            };
            run_config_init(update, env)?;
        }
    }
    Ok(())
}

/// Merge `update` into the config file; only the file is written, never
/// values that came from the environment.
pub fn run_config_init(update: ConfigUpdate, env: &CliEnv) -> Result<(), CliError> {
    let mut config = AppConfig::load_from_path(&env.config_path)?;
    apply_update(&mut config, update);
    config.validate()?;
    config.save_to_path(&env.config_path)?;

    println!("Saved config to {}", env.config_path.display());
    if !config.has_remote() {
        println!("Supabase is not configured yet; changes stay queued until it is.");
    }
    Ok(())
}

pub fn apply_update(config: &mut AppConfig, update: ConfigUpdate) {
    if let Some(url) = normalize_text_option(update.supabase_url) {
        config.supabase_url = Some(url);
    }
    if let Some(anon_key) = normalize_text_option(update.supabase_anon_key) {
        config.supabase_anon_key = Some(anon_key);
    }
    if let Some(endpoint) = normalize_text_option(update.token_endpoint) {
        config.transcription.token_endpoint = Some(endpoint);
    }
    if let Some(provider) = update.provider {
        config.transcription.provider = provider.provider();
    }
    if let Some(language) = normalize_text_option(update.language) {
        config.transcription.language_code = Some(language);
    }
    if let Some(interval) = update.sync_interval {
        config.sync.interval_secs = interval;
    }
}

pub fn format_config_lines(config: &AppConfig) -> Vec<String> {
    let unset = || "(unset)".to_string();
    vec![
        format!(
            "supabase_url:         {}",
            config.supabase_url.clone().unwrap_or_else(unset)
        ),
        format!(
            "supabase_anon_key:    {}",
            if config.supabase_anon_key.is_some() { "set" } else { "(unset)" }
        ),
        format!(
            "access_token:         {}",
            if config.access_token.is_some() { "set" } else { "(unset)" }
        ),
        format!("sync.max_retries:     {}", config.sync.max_retries),
        format!("sync.retry_delay_ms:  {}", config.sync.retry_delay_ms),
        format!("sync.interval_secs:   {}", config.sync.interval_secs),
        format!("stt.provider:         {}", config.transcription.provider),
        format!(
            "stt.token_endpoint:   {}",
            config
                .transcription
                .token_endpoint
                .clone()
                .unwrap_or_else(unset)
        ),
        format!(
            "stt.websocket_url:    {}",
            config.transcription.websocket_url.clone().unwrap_or_else(|| {
                config
                    .transcription
                    .provider
                    .default_websocket_url()
                    .to_string()
            })
        ),
        format!(
            "stt.language_code:    {}",
            config
                .transcription
                .language_code
                .clone()
                .unwrap_or_else(unset)
        ),
        format!("stt.sample_rate:      {}", config.transcription.sample_rate),
        format!("stt.buffer_size:      {}", config.transcription.buffer_size),
    ]
}
