use std::env;

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bus_type: String,
    pub nats_url: String,
    pub host: String,
    pub port: u16,
    pub publish_enveloped: bool,
    pub consume_enveloped: bool,
    pub producer_name: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let bus_type = env::var("BUS_TYPE").unwrap_or_else(|_| "inmemory".to_string());

        let nats_url =
            env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8082".to_string())
            .parse()
            .map_err(|_| "PORT must be a valid u16".to_string())?;

        let publish_enveloped = env_flag("PUBLISH_ENVELOPED_EVENTS", true);
        let consume_enveloped = env_flag("CONSUME_ENVELOPED_EVENTS", true);

        let producer_name =
            env::var("PRODUCER_NAME").unwrap_or_else(|_| crate::SERVICE_NAME.to_string());

        Ok(Config {
            database_url,
            bus_type,
            nats_url,
            host,
            port,
            publish_enveloped,
            consume_enveloped,
            producer_name,
        })
    }
}

/// Boolean flag parsing: only an explicit "false"/"0" disables a
/// default-enabled flag.
fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => !(v.eq_ignore_ascii_case("false") || v == "0"),
        Err(_) => default,
    }
}
