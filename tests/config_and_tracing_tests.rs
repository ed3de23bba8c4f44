//! Configuration loading and tracing setup

use latscope::telemetry::init_tracing;
use latscope::{Sli, SliConfig};
use serial_test::serial;
use std::io::Write;

#[test]
fn test_load_config_file_and_build() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
units = 3
tick_hz = 100
mbuf_capacity = 8192
max_stack_depth = 16
enabled = true
"#
    )
    .unwrap();

    let config = SliConfig::from_file(file.path()).unwrap();
    assert_eq!(config.units, 3);
    assert_eq!(config.max_stack_depth, 16);

    let sli = Sli::new(config).unwrap();
    assert_eq!(sli.enabled_show(), "1\n");
    let group = sli.create_group(sli.root(), "cfg");
    let units = group.with_sli(|s| s.sched().units()).unwrap();
    assert_eq!(units, 3);

    // 100 Hz: 25ms rounds up to 3 ticks
    sli.control_write(&group, "period=25000").unwrap();
    assert!(sli.control_show(&group).starts_with("period: 3\n"));
}

#[test]
fn test_invalid_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "max_stack_depth = 128").unwrap();
    let err = SliConfig::from_file(file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("max_stack_depth"));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "units = \"many\"").unwrap();
    assert!(SliConfig::from_file(file.path()).is_err());
}

#[test]
fn test_disabled_by_default() {
    let sli = Sli::new(SliConfig::default()).unwrap();
    assert_eq!(sli.enabled_show(), "0\n");
}

#[test]
#[serial]
fn test_tracing_init_is_repeatable() {
    let _ = init_tracing(false);
    // only one global subscriber can be installed per process
    assert!(!init_tracing(true));

    // lifecycle logging must work with a subscriber installed
    let sli = Sli::new(SliConfig::default()).unwrap();
    sli.faults().fail_nth(1);
    let group = sli.create_group(sli.root(), "logged");
    assert!(!group.is_monitored());
}
