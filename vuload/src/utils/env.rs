/// Identifier used as `User-Agent` for all outbound load traffic.
pub const fn user_agent() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_contains_project_name_and_version() {
        let ua = user_agent();
        assert!(ua.starts_with("vuload/"));
        assert!(ua.ends_with(env!("CARGO_PKG_VERSION")));
    }
}
