use powerlimiter::error::LimiterError;

#[test]
fn error_constructors_group_1() {
    assert!(matches!(
        LimiterError::config("x"),
        LimiterError::Config { .. }
    ));
    assert!(matches!(
        LimiterError::validation("f", "m"),
        LimiterError::Validation { .. }
    ));
    assert!(matches!(LimiterError::io("x"), LimiterError::Io { .. }));
}

#[test]
fn error_constructors_group_2() {
    let ser = LimiterError::Serialization {
        message: "s".into(),
    };
    assert!(matches!(ser, LimiterError::Serialization { .. }));
    assert!(matches!(
        LimiterError::inverter("x"),
        LimiterError::Inverter { .. }
    ));
    assert!(matches!(
        LimiterError::command("x"),
        LimiterError::Command { .. }
    ));
    assert!(matches!(
        LimiterError::generic("x"),
        LimiterError::Generic { .. }
    ));
}

#[test]
fn error_display_names_the_field() {
    let err = LimiterError::validation("power_limiter.restart_hour", "out of range");
    assert_eq!(
        err.to_string(),
        "Validation error: power_limiter.restart_hour - out of range"
    );
}

#[test]
fn io_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: LimiterError = io.into();
    assert!(matches!(err, LimiterError::Io { .. }));
}
