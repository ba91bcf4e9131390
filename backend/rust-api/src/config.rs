use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub redis_uri: String,
    pub mongo_database: String,
    pub openai_api_url: String,
    pub openai_api_key: String,
    pub openai_model: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let config_builder = config::Config::builder()
            // Load base config from TOML file
            .add_source(
                config::File::with_name(&format!("config/{}", env)).required(false), // Allow missing config file, fallback to ENV
            )
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings = config_builder.build()?;

        // Extract values with fallbacks to ENV or defaults
        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017/aitutor".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "aitutor".to_string());

        let openai_api_url = settings
            .get_string("openai.api_url")
            .or_else(|_| env::var("OPENAI_API_URL"))
            .unwrap_or_else(|_| "https://api.openai.com".to_string());

        let openai_api_key = settings
            .get_string("openai.api_key")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .unwrap_or_else(|_| {
                if env == "prod" {
                    panic!("FATAL: OPENAI_API_KEY must be set in production!");
                }
                eprintln!("WARNING: Using empty OPENAI_API_KEY (dev mode only!)");
                String::new()
            });

        let openai_model = settings
            .get_string("openai.model")
            .or_else(|_| env::var("OPENAI_MODEL"))
            .unwrap_or_else(|_| "gpt-4".to_string());

        Ok(Config {
            mongo_uri,
            redis_uri,
            mongo_database,
            openai_api_url,
            openai_api_key,
            openai_model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn env_overrides_are_picked_up() {
        env::set_var("MONGO_URI", "mongodb://db.internal:27017/tutor");
        env::set_var("REDIS_URI", "redis://cache.internal:6379/1");
        env::set_var("OPENAI_MODEL", "gpt-4o-mini");

        let config = Config::load().expect("config should load from env");
        assert_eq!(config.mongo_uri, "mongodb://db.internal:27017/tutor");
        assert_eq!(config.redis_uri, "redis://cache.internal:6379/1");
        assert_eq!(config.openai_model, "gpt-4o-mini");

        env::remove_var("MONGO_URI");
        env::remove_var("REDIS_URI");
        env::remove_var("OPENAI_MODEL");
    }

    #[test]
    #[serial]
    fn defaults_cover_a_bare_environment() {
        env::remove_var("MONGO_URI");
        env::remove_var("REDIS_URI");
        env::remove_var("MONGO_DATABASE");
        env::remove_var("OPENAI_MODEL");

        let config = Config::load().expect("config should load with defaults");
        assert_eq!(config.mongo_database, "aitutor");
        assert_eq!(config.openai_model, "gpt-4");
    }
}
