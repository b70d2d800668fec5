//! 日志初始化测试
//!
//! 全局 subscriber 对整个进程生效，单独放在一个测试二进制中

use disbursement_core::{config::LoggingConfig, infrastructure::logging::init_logging};

#[test]
fn test_second_init_reports_error() {
    let config = LoggingConfig {
        level: "warn".to_string(),
        format: "json".to_string(),
    };
    assert!(init_logging(&config).is_ok());
    // 全局 subscriber 只能设置一次
    assert!(init_logging(&config).is_err());
}
