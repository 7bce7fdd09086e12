//! Unit tests for `AppError` display formats.

use agent_warden::AppError;

#[test]
fn each_variant_has_its_own_prefix() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::Db("x".into()), "db: x"),
        (AppError::Validation("x".into()), "validation: x"),
        (AppError::NotFound("x".into()), "not found: x"),
        (AppError::Process("x".into()), "process: x"),
        (AppError::Session("x".into()), "session: x"),
        (AppError::Discovery("x".into()), "discovery: x"),
        (AppError::Callback("x".into()), "callback: x"),
        (AppError::Io("x".into()), "io: x"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn io_errors_convert_to_io_variant() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "transcript missing");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(_)));
    assert!(err.to_string().contains("transcript missing"));
}

#[test]
fn toml_errors_convert_to_config_variant() {
    let parse = toml::from_str::<toml::Value>("= broken").expect_err("invalid toml");
    let err: AppError = parse.into();
    assert!(matches!(err, AppError::Config(_)));
}
