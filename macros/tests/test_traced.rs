#[cfg(test)]
mod tests {
    use racebench_macros::test_traced;
    use tracing::{debug, error, info, trace};

    #[test_traced("INFO")]
    fn test_info_level() {
        info!("round completed");
        debug!("pairing detail (won't be shown)");
        assert_eq!(2 + 2, 4);
    }

    #[test_traced]
    fn test_default_level() {
        debug!(bug = 3, "part claimed");
        assert_eq!(3 * 3, 9);
    }

    #[test_traced("trace")]
    fn test_lowercase_level() {
        trace!(part = 1, "abstained");
        assert_eq!(1 << 4, 16);
    }

    #[test_traced("ERROR")]
    fn test_error_level() {
        error!("stat file unavailable");
        assert_eq!(5 * 2, 10);
    }

    #[test_traced]
    fn test_returns_value() -> Result<(), String> {
        let value: u32 = "7".parse().map_err(|_| "parse".to_string())?;
        assert_eq!(value, 7);
        Ok(())
    }
}
