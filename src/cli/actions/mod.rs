pub mod server;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: Option<String>,
        identity_url: Option<String>,
        challenge_url: Option<String>,
    },
}
