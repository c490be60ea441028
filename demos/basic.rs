use rapidlog::{fields, get_logger, FieldValue};

fn main() -> Result<(), rapidlog::ConfigError> {
    let logger = get_logger("INFO", Some("low-memory"))?;

    logger.debug("not printed", fields!["reason" => "below INFO"]);
    logger.info("user login", fields!["user_id" => 123, "action" => "login"]);
    logger.warning(
        "slow request",
        fields![
            "path" => "/api/orders",
            "elapsed_ms" => 812.5,
            "tags" => vec!["db", "retry"],
        ],
    );
    logger.error("db timeout", vec![("query", FieldValue::from("SELECT 1"))]);

    logger.close();
    eprintln!("{:?}", logger.stats());
    Ok(())
}
