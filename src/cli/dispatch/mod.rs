use crate::cli::actions::Action;
use anyhow::Result;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches.get_one::<String>("dsn").cloned(),
        identity_url: matches.get_one::<String>("identity-url").cloned(),
        challenge_url: matches.get_one::<String>("challenge-url").cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::handler;
    use crate::cli::{actions::Action, commands};
    use anyhow::Result;

    #[test]
    fn handler_builds_server_action() -> Result<()> {
        let matches = commands::new().get_matches_from(vec![
            "pasejo",
            "--port",
            "9090",
            "--identity-url",
            "https://id.tld",
        ]);
        let Action::Server {
            port,
            dsn,
            identity_url,
            challenge_url,
        } = handler(&matches)?;
        assert_eq!(port, 9090);
        assert_eq!(dsn, None);
        assert_eq!(identity_url.as_deref(), Some("https://id.tld"));
        assert_eq!(challenge_url, None);
        Ok(())
    }
}
