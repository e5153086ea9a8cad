//! # Flags Subcommand
//!
//! Prints the feature-flag catalogue with each flag's resolved default.

use clap::{Args, Subcommand};
use redlane_core::FlagResolver;
use serde_json::Value;

/// Arguments for the flags subcommand.
#[derive(Args, Debug)]
pub struct FlagsArgs {
    #[command(subcommand)]
    pub command: FlagsCommand,
}

#[derive(Subcommand, Debug)]
pub enum FlagsCommand {
    /// List every catalogued flag.
    List,
    /// Show one flag, with global overrides applied first.
    Check {
        name: String,
        /// Flags to force on globally before resolving.
        #[arg(long = "enable")]
        enable: Vec<String>,
        /// Flags to force off globally before resolving.
        #[arg(long = "disable")]
        disable: Vec<String>,
    },
}

pub fn run(args: &FlagsArgs) -> anyhow::Result<Value> {
    let resolver = FlagResolver::default();
    match &args.command {
        FlagsCommand::List => Ok(serde_json::to_value(resolver.all_flags(None))?),
        FlagsCommand::Check {
            name,
            enable,
            disable,
        } => {
            for flag in enable {
                resolver.global_enable(flag)?;
            }
            for flag in disable {
                resolver.global_disable(flag)?;
            }
            let enabled = resolver.is_active(name, None)?;
            Ok(serde_json::json!({ "name": name, "enabled": enabled }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, enable: &[&str], disable: &[&str]) -> anyhow::Result<Value> {
        run(&FlagsArgs {
            command: FlagsCommand::Check {
                name: name.into(),
                enable: enable.iter().map(|s| s.to_string()).collect(),
                disable: disable.iter().map(|s| s.to_string()).collect(),
            },
        })
    }

    #[test]
    fn list_has_whole_catalogue() {
        let out = run(&FlagsArgs {
            command: FlagsCommand::List,
        })
        .unwrap();
        assert_eq!(out.as_array().unwrap().len(), 5);
    }

    #[test]
    fn defaults_resolve() {
        assert_eq!(check("admin_dashboard", &[], &[]).unwrap()["enabled"], true);
        assert_eq!(check("ocr_processing", &[], &[]).unwrap()["enabled"], false);
    }

    #[test]
    fn overrides_apply() {
        let out = check("ocr_processing", &["ocr_processing"], &[]).unwrap();
        assert_eq!(out["enabled"], true);
        let out = check("admin_dashboard", &[], &["admin_dashboard"]).unwrap();
        assert_eq!(out["enabled"], false);
    }

    #[test]
    fn unknown_flag_is_an_error() {
        assert!(check("time_travel", &[], &[]).is_err());
    }
}
