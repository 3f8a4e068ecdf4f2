//! `keeper config get|set`: daemon configuration values.
//!
//! Goes through the daemon when it is running so its in-memory store stays
//! authoritative; edits `config.yaml` directly otherwise.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde_json::Value;

use keeper_core::{config as store, DaemonIdentity};
use keeper_daemon::{DaemonProxy, ProxyError};

use super::{connect, home};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print a value as JSON.
    Get(KeyArgs),
    /// Set a value. JSON literals are parsed; anything else is stored as a string.
    Set(SetArgs),
}

#[derive(Args, Debug)]
pub struct KeyArgs {
    /// Section, e.g. `account`.
    pub section: String,
    /// Key within the section, e.g. `usage`.
    pub key: String,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    #[command(flatten)]
    pub target: KeyArgs,
    pub value: String,
}

pub fn run(command: ConfigCommand, identity: &DaemonIdentity) -> Result<()> {
    match command {
        ConfigCommand::Get(args) => {
            let value = get(identity, &args)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&value).context("failed to render value")?
            );
        }
        ConfigCommand::Set(args) => {
            let value = parse_value(&args.value);
            set(identity, &args.target, value)?;
            println!("{}.{} updated", args.target.section, args.target.key);
        }
    }
    Ok(())
}

fn get(identity: &DaemonIdentity, args: &KeyArgs) -> Result<Value> {
    let proxy = connect(identity)?;
    match proxy.get_config(&args.section, &args.key) {
        Ok(value) => Ok(value),
        Err(ProxyError::DaemonNotRunning { .. }) => {
            let config = store::load_config_at(&home()?, identity)
                .context("failed to load config.yaml")?;
            Ok(config
                .get(&args.section, &args.key)
                .cloned()
                .unwrap_or(Value::Null))
        }
        Err(err) => Err(err).context("failed to read config value"),
    }
}

fn set(identity: &DaemonIdentity, args: &KeyArgs, value: Value) -> Result<()> {
    let proxy = connect(identity)?;
    match proxy.set_config(&args.section, &args.key, value.clone()) {
        Ok(()) => Ok(()),
        Err(ProxyError::DaemonNotRunning { .. }) => {
            let home = home()?;
            let mut config =
                store::load_config_at(&home, identity).context("failed to load config.yaml")?;
            config.set(&args.section, &args.key, value);
            store::save_config_at(&home, identity, &config).context("failed to save config.yaml")
        }
        Err(err) => Err(err).context("failed to write config value"),
    }
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_literals_parse_and_text_falls_back_to_string() {
        assert_eq!(parse_value("0"), json!(0));
        assert_eq!(parse_value("[\"/a\"]"), json!(["/a"]));
        assert_eq!(parse_value("/home/me/Keeper"), json!("/home/me/Keeper"));
    }
}
