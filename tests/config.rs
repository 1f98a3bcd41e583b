//! Tests for loader configuration.

use ironline::config::{DEFAULT_BLOCK_SIZE, MIN_BLOCK_SIZE};
use ironline::testing::TempTextFiles;
use ironline::{FileLoader, LoaderConfig, LoaderError, WORKER_ID_SPACE};

#[test]
fn defaults_are_sensible() {
    let config = LoaderConfig::default();
    assert!(config.max_job_count >= 1);
    assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
    assert_eq!(config.encoding, "utf-8");
    assert!(config.decompress);
    assert!(config.validate().is_ok());
}

#[test]
fn json_fills_missing_fields() -> anyhow::Result<()> {
    let config = LoaderConfig::from_json_str(r#"{ "block_size": 4, "encoding": "UTF-16LE" }"#)?;
    assert_eq!(config.block_size, 4);
    assert_eq!(config.effective_block_size(), MIN_BLOCK_SIZE);
    assert_eq!(config.resolve_encoding()?.name(), "utf-16le");
    assert_eq!(config.worker_threads, None);
    Ok(())
}

#[test]
fn json_file_round_trip() -> anyhow::Result<()> {
    let files = TempTextFiles::new()?;
    let config = LoaderConfig {
        max_job_count: 3,
        worker_threads: Some(2),
        decompress: false,
        ..LoaderConfig::default()
    };
    let path = files.write("loader.json", serde_json::to_string_pretty(&config)?)?;
    assert_eq!(LoaderConfig::from_json_file(&path)?, config);
    Ok(())
}

#[test]
fn invalid_values_are_rejected() {
    assert!(matches!(
        LoaderConfig::from_json_str(r#"{ "max_job_count": 0 }"#),
        Err(LoaderError::Config(_))
    ));
    assert!(matches!(
        LoaderConfig::from_json_str(r#"{ "worker_threads": 0 }"#),
        Err(LoaderError::Config(_))
    ));
    assert!(matches!(
        LoaderConfig::from_json_str(r#"{ "encoding": "klingon" }"#),
        Err(LoaderError::UnknownEncoding(_))
    ));
    assert!(matches!(
        LoaderConfig::from_json_str("not json"),
        Err(LoaderError::Config(_))
    ));

    let too_many = LoaderConfig {
        max_job_count: WORKER_ID_SPACE + 1,
        ..LoaderConfig::default()
    };
    assert!(matches!(too_many.validate(), Err(LoaderError::Config(_))));
}

#[test]
fn builder_applies_config() -> anyhow::Result<()> {
    let loader = FileLoader::builder()
        .config(LoaderConfig {
            max_job_count: 2,
            block_size: 1,
            encoding: "latin1".into(),
            ..LoaderConfig::default()
        })
        .build()?;
    assert_eq!(loader.max_job_count(), 2);
    assert_eq!(loader.block_size(), MIN_BLOCK_SIZE);
    assert_eq!(loader.encoding().name(), "latin1");
    assert!(loader.is_empty());
    Ok(())
}

#[test]
fn builder_rejects_invalid_config() {
    let result = FileLoader::builder()
        .config(LoaderConfig {
            max_job_count: 0,
            ..LoaderConfig::default()
        })
        .build();
    assert!(matches!(result, Err(LoaderError::Config(_))));
}
