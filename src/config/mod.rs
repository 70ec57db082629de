mod settings;

pub use settings::{
    ApiConfig, AwsCredentials, CacheConfig, ChannelsConfig, DatabaseConfig, JobsConfig,
    LicenseConfig, NexmoCredentials, NotificationsConfig, OtelConfig, ProvidersConfig,
    RedisConfig, ServerConfig, Settings, T2Credentials, WorkerConfig,
};
