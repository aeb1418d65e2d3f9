use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment,
    parse_positive_u64, parse_u16, parse_u32, parse_u64,
};
use super::types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, RuntimeSettings, SecuritySettings,
    ServerHost, ServerPort, ServerSettings, SessionSettings, Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("CBT_HOST", "0.0.0.0");
        let port = env_or_default("CBT_PORT", "8000");

        let environment =
            parse_environment(env_optional("CBT_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("CBT_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "CBT Exam Engine");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        // Tokens are issued elsewhere; without the shared secret nothing can be verified.
        let secret_key =
            env_optional("SECRET_KEY").ok_or(ConfigError::MissingSecret("SECRET_KEY"))?;
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "cbt");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "cbt_engine");
        let database_url = env_optional("DATABASE_URL");

        let max_concurrent_sessions = parse_u64(
            "MAX_CONCURRENT_SESSIONS",
            env_or_default("MAX_CONCURRENT_SESSIONS", "500"),
        )?;
        let result_store_max_attempts = parse_u32(
            "RESULT_STORE_MAX_ATTEMPTS",
            env_or_default("RESULT_STORE_MAX_ATTEMPTS", "5"),
        )?;
        let result_store_backoff_base_ms = parse_positive_u64(
            "RESULT_STORE_BACKOFF_BASE_MS",
            env_or_default("RESULT_STORE_BACKOFF_BASE_MS", "500"),
        )?;
        let terminated_session_retention_seconds = parse_u64(
            "TERMINATED_SESSION_RETENTION_SECONDS",
            env_or_default("TERMINATED_SESSION_RETENTION_SECONDS", "600"),
        )?;
        let sweep_interval_seconds = parse_positive_u64(
            "SESSION_SWEEP_INTERVAL_SECONDS",
            env_or_default("SESSION_SWEEP_INTERVAL_SECONDS", "30"),
        )?;
        let shutdown_drain_seconds = parse_u64(
            "SESSION_DRAIN_TIMEOUT_SECONDS",
            env_or_default("SESSION_DRAIN_TIMEOUT_SECONDS", "60"),
        )?;

        let log_level = env_or_default("CBT_LOG_LEVEL", "info");
        let json = env_optional("CBT_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            session: SessionSettings {
                max_concurrent_sessions,
                result_store_max_attempts,
                result_store_backoff_base_ms,
                terminated_session_retention_seconds,
                sweep_interval_seconds,
                shutdown_drain_seconds,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn session(&self) -> &SessionSettings {
        &self.session
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.session.result_store_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "RESULT_STORE_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        if self.security.algorithm != "HS256" {
            return Err(ConfigError::InvalidValue {
                field: "ALGORITHM",
                value: self.security.algorithm.clone(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.security.secret_key.len() < 16 {
            return Err(ConfigError::InvalidValue {
                field: "SECRET_KEY",
                value: String::from("<too short>"),
            });
        }

        Ok(())
    }
}
