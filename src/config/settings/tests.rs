use super::*;
use serial_test::serial;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.provider.kind, ProviderKind::Ollama);
    assert_eq!(config.provider.protocol, "http");
    assert_eq!(config.provider.host, "localhost");
    assert_eq!(config.provider.port, 11434);
    assert_eq!(config.provider.model, "nomic-embed-text:latest");
    assert_eq!(config.provider.batch_size, 16);
    assert_eq!(config.chunking.target_chars, 500);
    assert_eq!(config.chunking.min_chars, 100);
    assert_eq!(config.retrieval.top_k, 3);
    assert!(!config.retrieval.strict);
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.provider.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.provider.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.provider.model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.provider.batch_size = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.provider.batch_size = 1001;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.provider.timeout_seconds = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.retrieval.top_k = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidTopK(0))
    ));

    let mut invalid_config = config;
    invalid_config.provider.kind = ProviderKind::OpenAi;
    invalid_config.provider.api_key_env = " ".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidApiKeyEnv(_))
    ));
}

#[test]
fn chunking_validation() {
    let mut config = Config::default();
    config.chunking.target_chars = 10;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidTargetChunkSize(10))
    ));

    let mut config = Config::default();
    config.chunking.min_chars = 500;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::TargetChunkSizeTooSmall(500, 500))
    ));
}

#[test]
fn base_url_generation() {
    let config = Config::default();
    let url = config
        .provider
        .base_url()
        .expect("should generate base_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn https_url_generation() {
    let mut config = Config::default();
    config.provider.protocol = "https".to_string();
    config.provider.host = "api.example.com".to_string();
    config.provider.port = 443;

    let url = config
        .provider
        .base_url()
        .expect("should generate https url successfully");
    assert_eq!(url.as_str(), "https://api.example.com/");
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_uses_defaults() {
    let partial_toml = r#"
        [provider]
        kind = "openai"
        host = "api.openai.com"
        protocol = "https"
        port = 443
        model = "text-embedding-ada-002"

        [retrieval]
        top_k = 5
    "#;

    let config: Config = toml::from_str(partial_toml).expect("should parse toml correctly");
    assert_eq!(config.provider.kind, ProviderKind::OpenAi);
    assert_eq!(config.provider.batch_size, 16);
    assert_eq!(config.provider.api_key_env, "OPENAI_API_KEY");
    assert_eq!(config.retrieval.top_k, 5);
    assert_eq!(config.chunking, ChunkingConfig::default());
    assert!(config.validate().is_ok());
}

#[test]
fn unknown_provider_kind_is_rejected() {
    let toml_str = r#"
        [provider]
        kind = "carrier-pigeon"
    "#;

    let result: Result<Config, toml::de::Error> = toml::from_str(toml_str);
    assert!(result.is_err());
}

#[test]
fn setter_validation() {
    let mut config = ProviderConfig::default();

    assert!(config.set_protocol("https".to_string()).is_ok());
    assert!(config.set_host("example.com".to_string()).is_ok());
    assert!(config.set_port(8080).is_ok());
    assert!(config.set_model("new-model".to_string()).is_ok());
    assert!(config.set_batch_size(128).is_ok());
    assert!(config.set_timeout_seconds(120).is_ok());

    assert!(config.set_protocol("ftp".to_string()).is_err());
    assert!(config.set_protocol("HTTP".to_string()).is_err());
    assert!(config.set_port(0).is_err());
    assert!(config.set_model(String::new()).is_err());
    assert!(config.set_batch_size(0).is_err());
    assert!(config.set_batch_size(1001).is_err());
    assert!(config.set_timeout_seconds(0).is_err());

    assert_eq!(config.protocol, "https");
    assert_eq!(config.port, 8080);
    assert_eq!(config.batch_size, 128);
}

#[test]
fn load_missing_config_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load(temp_dir.path()).expect("should load default config");
    assert_eq!(config.provider, ProviderConfig::default());
    assert_eq!(config.get_base_dir(), temp_dir.path());
}

#[test]
fn save_and_load_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let mut config = Config {
        base_dir: temp_dir.path().join("nested"),
        ..Config::default()
    };
    config.provider.model = "mxbai-embed-large".to_string();
    config.retrieval.strict = true;
    config.save().expect("should save config");

    assert!(config.config_file_path().exists());

    let loaded = Config::load(temp_dir.path().join("nested")).expect("should load saved config");
    assert_eq!(loaded, config);
}

#[test]
fn load_rejects_invalid_values() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[provider]\nbatch_size = 0\n",
    )
    .expect("should write config file");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
#[serial]
fn default_dir_honors_env_override() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    // SAFETY: serialized with every other test that touches the environment
    unsafe { env::set_var(HOME_ENV_VAR, temp_dir.path()) };
    let dir = Config::default_dir();
    // SAFETY: as above
    unsafe { env::remove_var(HOME_ENV_VAR) };

    assert_eq!(
        dir.expect("should resolve config dir"),
        temp_dir.path().to_path_buf()
    );
}
