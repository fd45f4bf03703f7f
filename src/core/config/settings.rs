use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment,
    parse_positive_u64, parse_snapshot_policy, parse_store_backend, parse_u16, parse_u32,
};
use super::types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, DeletionSettings, RuntimeSettings,
    SecuritySettings, ServerHost, ServerPort, ServerSettings, SessionSettings, Settings,
    StoreBackend, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("PORTAL_HOST", "0.0.0.0");
        let port = env_or_default("PORTAL_PORT", "8000");

        let environment = parse_environment(env_optional("PORTAL_ENV"));
        let strict_config =
            env_optional("PORTAL_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Exam Portal API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let jwt_secret =
            env_optional("IDENTITY_JWT_SECRET").ok_or(ConfigError::MissingSecret("IDENTITY_JWT_SECRET"))?;
        let algorithm = env_or_default("IDENTITY_JWT_ALGORITHM", "HS256");
        let issuer = env_optional("IDENTITY_JWT_ISSUER");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let store = parse_store_backend(env_or_default("PORTAL_STORE", "postgres"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "exam_portal");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "exam_portal");
        let database_url = env_optional("DATABASE_URL");

        let tick_millis =
            parse_positive_u64("SESSION_TICK_MILLIS", env_or_default("SESSION_TICK_MILLIS", "1000"))?;
        let max_active_sessions = parse_positive_u64(
            "MAX_ACTIVE_SESSIONS",
            env_or_default("MAX_ACTIVE_SESSIONS", "500"),
        )? as usize;
        let snapshot_policy =
            parse_snapshot_policy(env_or_default("QUESTION_SNAPSHOT_POLICY", "live"))?;

        let retry_attempts =
            parse_u32("DELETE_RETRY_ATTEMPTS", env_or_default("DELETE_RETRY_ATTEMPTS", "3"))?.max(1);
        let retry_backoff_millis = parse_positive_u64(
            "DELETE_RETRY_BACKOFF_MILLIS",
            env_or_default("DELETE_RETRY_BACKOFF_MILLIS", "500"),
        )?;

        let log_level = env_or_default("PORTAL_LOG_LEVEL", "info");
        let json = env_optional("PORTAL_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings { host: ServerHost::parse(host)?, port: ServerPort::parse(port)? },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { jwt_secret, algorithm, issuer },
            cors: CorsSettings { origins: cors_origins },
            store,
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            session: SessionSettings { tick_millis, max_active_sessions, snapshot_policy },
            deletion: DeletionSettings { retry_attempts, retry_backoff_millis },
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

    pub(crate) fn store(&self) -> StoreBackend {
        self.store
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn session(&self) -> &SessionSettings {
        &self.session
    }

    pub(crate) fn deletion(&self) -> &DeletionSettings {
        &self.deletion
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.security.algorithm != "HS256" {
            return Err(ConfigError::InvalidValue {
                field: "IDENTITY_JWT_ALGORITHM",
                value: self.security.algorithm.clone(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.store == StoreBackend::Memory {
            return Err(ConfigError::InvalidValue {
                field: "PORTAL_STORE",
                value: String::from("memory (not allowed with strict config)"),
            });
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}

impl DatabaseSettings {
    pub(crate) fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_server,
            self.postgres_port,
            self.postgres_db
        )
    }
}
