use config::Config;
use lazy_static::lazy_static;
use serde::Deserialize;
use std::{env, path::Path, time::Duration};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub test_mode: bool,
    pub spool_dir: String,
    pub digest_dir: String,
    pub candidate_window_hours: i64,
    pub max_content_length: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub key: String,
    pub model: String,
    pub temperature: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub batch_interval_secs: u64,
    pub retry_attempts: u32,
    pub retry_interval_secs: u64,
    pub test_batch_interval_secs: u64,
    pub test_retry_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeeklyConfig {
    pub genre_interval_secs: u64,
    pub retry_attempts: u32,
    pub retry_interval_secs: u64,
    pub test_genre_interval_secs: u64,
    pub test_retry_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    pub daily_cron: String,
    pub weekly_cron: String,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub settings: Settings,
    pub api: ApiConfig,
    pub batch: BatchConfig,
    pub weekly: WeeklyConfig,
    pub schedule: ScheduleConfig,
}

impl ServerConfig {
    /// Wait between successive gateway batch calls. Test mode substitutes the
    /// shortened interval; retry counts are never changed by test mode.
    pub fn batch_interval(&self) -> Duration {
        if self.settings.test_mode {
            Duration::from_secs(self.batch.test_batch_interval_secs)
        } else {
            Duration::from_secs(self.batch.batch_interval_secs)
        }
    }

    pub fn batch_retry_interval(&self) -> Duration {
        if self.settings.test_mode {
            Duration::from_secs(self.batch.test_retry_interval_secs)
        } else {
            Duration::from_secs(self.batch.retry_interval_secs)
        }
    }

    pub fn genre_interval(&self) -> Duration {
        if self.settings.test_mode {
            Duration::from_secs(self.weekly.test_genre_interval_secs)
        } else {
            Duration::from_secs(self.weekly.genre_interval_secs)
        }
    }

    pub fn weekly_retry_interval(&self) -> Duration {
        if self.settings.test_mode {
            Duration::from_secs(self.weekly.test_retry_interval_secs)
        } else {
            Duration::from_secs(self.weekly.retry_interval_secs)
        }
    }
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Server Config:\n{:?}\n\nAPI: model={} base_url={}\n\nBatch: {:?}\n\nWeekly: {:?}\n\nSchedule: {:?}",
            self.settings, self.api.model, self.api.base_url, self.batch, self.weekly, self.schedule,
        )
    }
}

lazy_static! {
    pub static ref cfg: ServerConfig = {
        let root = env::var("APP_DIR").unwrap_or_else(|_| {
            let dir =
                env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR or APP_DIR is required");
            let dir = Path::new(&dir).parent().unwrap().display().to_string();
            format!("{}/config", dir)
        });
        let path = format!("{root}/config.toml");
        let mut config: ServerConfig = Config::builder()
            .add_source(config::File::with_name(&path))
            .build()
            .expect("config.toml is required")
            .try_deserialize()
            .expect("config.toml is invalid");

        if let Ok(key) = env::var("OPENROUTER_API_KEY") {
            config.api.key = key;
        }

        config
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(test_mode: bool) -> ServerConfig {
        ServerConfig {
            settings: Settings {
                test_mode,
                spool_dir: "spool".to_string(),
                digest_dir: "digests".to_string(),
                candidate_window_hours: 24,
                max_content_length: 3000,
            },
            api: ApiConfig {
                base_url: "https://openrouter.ai/api/v1".to_string(),
                key: String::new(),
                model: "test-model".to_string(),
                temperature: 0.3,
            },
            batch: BatchConfig {
                batch_size: 10,
                batch_interval_secs: 3600,
                retry_attempts: 3,
                retry_interval_secs: 600,
                test_batch_interval_secs: 2,
                test_retry_interval_secs: 1,
            },
            weekly: WeeklyConfig {
                genre_interval_secs: 1800,
                retry_attempts: 3,
                retry_interval_secs: 600,
                test_genre_interval_secs: 2,
                test_retry_interval_secs: 1,
            },
            schedule: ScheduleConfig {
                daily_cron: "0 0 20 * * *".to_string(),
                weekly_cron: "0 0 7 * * Sun".to_string(),
            },
        }
    }

    #[test]
    fn test_production_intervals() {
        let config = test_config(false);
        assert_eq!(config.batch_interval(), Duration::from_secs(3600));
        assert_eq!(config.batch_retry_interval(), Duration::from_secs(600));
        assert_eq!(config.genre_interval(), Duration::from_secs(1800));
    }

    #[test]
    fn test_mode_shortens_waits_only() {
        let config = test_config(true);
        assert_eq!(config.batch_interval(), Duration::from_secs(2));
        assert_eq!(config.batch_retry_interval(), Duration::from_secs(1));
        assert_eq!(config.genre_interval(), Duration::from_secs(2));
        assert_eq!(config.weekly_retry_interval(), Duration::from_secs(1));
        // retry counts are untouched by test mode
        assert_eq!(config.batch.retry_attempts, 3);
        assert_eq!(config.weekly.retry_attempts, 3);
    }
}
