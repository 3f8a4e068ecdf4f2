//! `keeper link` / `keeper unlink`: the access token for an identity.

use anyhow::{Context, Result};
use clap::Args;

use keeper_core::DaemonIdentity;
use keeper_supervisor::TokenFileCredentials;

use super::home;

#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Access token issued for this account.
    pub token: String,
}

impl LinkArgs {
    pub fn run(self, identity: &DaemonIdentity) -> Result<()> {
        if self.token.trim().is_empty() {
            anyhow::bail!("token must not be empty");
        }
        TokenFileCredentials::new(home()?)
            .link(identity, &self.token)
            .context("failed to store token")?;
        println!("linked '{identity}'");
        Ok(())
    }
}

pub fn unlink(identity: &DaemonIdentity) -> Result<()> {
    let removed = TokenFileCredentials::new(home()?)
        .unlink(identity)
        .context("failed to remove token")?;
    if removed {
        println!("unlinked '{identity}'");
    } else {
        println!("'{identity}' was not linked");
    }
    Ok(())
}
