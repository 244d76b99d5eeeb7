/// Harness configuration tests
///
/// Kept in their own binary: they change process environment variables.
/// Run with: cargo test --test harness_config_tests

use occ_delete_demo::{DbError, HarnessConfig};
use occ_delete_demo::harness::config::UNITS_ENV;

#[test]
fn test_units_from_env() {
    // Single test in this binary, so nothing else reads the variable concurrently.
    unsafe { std::env::remove_var(UNITS_ENV) };
    assert_eq!(HarnessConfig::from_env().unwrap().units, 10);

    unsafe { std::env::set_var(UNITS_ENV, "3") };
    assert_eq!(HarnessConfig::from_env().unwrap(), HarnessConfig::new().units(3));

    unsafe { std::env::set_var(UNITS_ENV, "0") };
    assert!(matches!(HarnessConfig::from_env(), Err(DbError::ConfigError(_))));

    unsafe { std::env::set_var(UNITS_ENV, "ten") };
    let err = HarnessConfig::from_env().unwrap_err();
    assert!(err.to_string().contains(UNITS_ENV));

    unsafe { std::env::remove_var(UNITS_ENV) };
}
