mod parsing;
mod settings;
mod types;

pub(crate) use types::{
    ConfigError, CorsSettings, DatabaseSettings, DeletionSettings, Environment, QuestionSnapshotPolicy,
    SecuritySettings, SessionSettings, Settings, StoreBackend,
};
