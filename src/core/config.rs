mod parsing;
mod settings;
mod types;

pub(crate) use types::Settings;

#[cfg(test)]
mod tests {
    use super::types::ConfigError;
    use super::*;
    use crate::test_support;

    #[test]
    fn load_reads_session_settings() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        std::env::set_var("RESULT_STORE_MAX_ATTEMPTS", "7");
        std::env::set_var("TERMINATED_SESSION_RETENTION_SECONDS", "42");

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.session().result_store_max_attempts, 7);
        assert_eq!(settings.session().terminated_session_retention_seconds, 42);
        assert_eq!(settings.session().result_store_backoff_base_ms, 500);
        assert_eq!(settings.session().shutdown_drain_seconds, 60);
        assert_eq!(settings.api().api_v1_str, "/api/v1");

        std::env::remove_var("RESULT_STORE_MAX_ATTEMPTS");
        std::env::remove_var("TERMINATED_SESSION_RETENTION_SECONDS");
    }

    #[test]
    fn load_requires_secret_key() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        std::env::remove_var("SECRET_KEY");

        let err = Settings::load().expect_err("missing secret");
        assert!(matches!(err, ConfigError::MissingSecret("SECRET_KEY")));
    }

    #[test]
    fn zero_retry_budget_is_rejected() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        std::env::set_var("RESULT_STORE_MAX_ATTEMPTS", "0");

        let err = Settings::load().expect_err("zero attempts");
        assert!(matches!(
            err,
            ConfigError::InvalidValue { field: "RESULT_STORE_MAX_ATTEMPTS", .. }
        ));

        std::env::remove_var("RESULT_STORE_MAX_ATTEMPTS");
    }

    #[test]
    fn strict_mode_requires_database_password() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        std::env::set_var("CBT_STRICT_CONFIG", "1");
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("POSTGRES_PASSWORD");

        let err = Settings::load().expect_err("strict");
        assert!(matches!(err, ConfigError::MissingSecret("POSTGRES_PASSWORD")));

        std::env::set_var("CBT_STRICT_CONFIG", "0");
    }
}
