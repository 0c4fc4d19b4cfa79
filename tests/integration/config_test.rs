//! Loading configuration files from disk

use riskcore::config::Config;
use riskcore::risk::{ConfidenceScaling, PositionSizer, RiskStatus};
use riskcore::telemetry::LogFormat;
use rust_decimal_macros::dec;
use std::io::Write;

#[test]
fn test_load_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        [account]
        account_size = 10000

        [limits]
        kelly_fraction = 0.25
        max_position_pct = 0.10
        max_risk_per_trade_pct = 0.02

        [sizing]
        confidence_scaling = {{ mode = "linear" }}

        [telemetry]
        log_format = "json"
        "#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.account.account_size, dec!(10000));
    assert_eq!(config.sizing.confidence_scaling, ConfidenceScaling::Linear);
    assert_eq!(config.telemetry.log_format, LogFormat::Json);

    let sizer = PositionSizer::from_config(&config).unwrap();
    let decision = sizer
        .calculate_position_size("BHP", dec!(45), dec!(43), dec!(0.75))
        .unwrap();
    assert_eq!(decision.shares, 22);
    assert_eq!(sizer.risk_status(), RiskStatus::Normal);
}

#[test]
fn test_invalid_config_file_reports_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[limits]\nkelly_fraction = 2.0").unwrap();

    let err = Config::load(file.path()).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("kelly_fraction"), "{message}");
    assert!(message.contains(&file.path().display().to_string()), "{message}");
}

#[test]
fn test_example_config_round_trips() {
    let config = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml.example")).unwrap();
    let rendered = toml::to_string_pretty(&config).unwrap();
    let reparsed = Config::from_toml(&rendered).unwrap();
    assert_eq!(config, reparsed);
}
