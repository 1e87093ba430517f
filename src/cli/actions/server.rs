use crate::api;
use crate::cli::{actions::Action, globals::GlobalArgs};
use crate::login::LoginConfig;
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            base_url,
        } => {
            let config = LoginConfig::from_env(base_url);
            api::new(port, dsn, config, globals).await?;
        }
    }

    Ok(())
}
