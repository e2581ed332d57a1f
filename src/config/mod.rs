mod settings;

pub use settings::{
    HistoryConfig, LogFormat, LoggingConfig, ReconnectConfig, ServerConfig, SessionConfig,
    Settings,
};
