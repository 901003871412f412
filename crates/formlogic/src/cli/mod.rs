//! Command-line interface for formlogic.
//!
//! This module provides the CLI structure for the `formlogic` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, EvalCommand, FormCommand, RuleCommand, StatusCommand, SubmissionsCommand,
    SubmitCommand, ValidateCommand,
};

use crate::logging::Verbosity;

/// formlogic - Conditional field rules for FastSubmit forms
///
/// Evaluates show/hide, require, value and option rules against a set of
/// answers, validates rule definitions, and keeps a local store of forms and
/// submissions.
#[derive(Debug, Parser)]
#[command(name = "formlogic")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Evaluate a form's rules against answers
    Eval(EvalCommand),

    /// Check a form definition's rules
    Validate(ValidateCommand),

    /// Manage stored forms
    #[command(subcommand)]
    Form(FormCommand),

    /// Edit the rules of a stored form
    #[command(subcommand)]
    Rule(RuleCommand),

    /// Submit answers to a stored form
    Submit(SubmitCommand),

    /// List submissions for a stored form
    Submissions(SubmissionsCommand),

    /// Show store status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{ActionKind, Operator};
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args.iter().copied()).unwrap()
    }

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "formlogic");
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(parse(&["formlogic", "-q", "status"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["formlogic", "status"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["formlogic", "-v", "status"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["formlogic", "-vv", "status"]).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_parse_eval() {
        let cli = parse(&[
            "formlogic",
            "eval",
            "--form",
            "form.json",
            "--set",
            "country=USA",
            "-s",
            "budget=1500",
            "--json",
        ]);
        let Command::Eval(cmd) = cli.command else {
            panic!("expected eval");
        };
        assert_eq!(cmd.form, PathBuf::from("form.json"));
        assert_eq!(cmd.set, vec!["country=USA", "budget=1500"]);
        assert!(cmd.answers.is_none());
        assert!(cmd.json);
    }

    #[test]
    fn test_parse_eval_requires_form() {
        assert!(Cli::try_parse_from(["formlogic", "eval"]).is_err());
    }

    #[test]
    fn test_parse_validate() {
        let cli = parse(&["formlogic", "validate", "-f", "form.json"]);
        assert!(matches!(cli.command, Command::Validate(_)));
    }

    #[test]
    fn test_parse_form_subcommands() {
        let cli = parse(&["formlogic", "form", "import", "form.json", "--force"]);
        assert!(matches!(
            cli.command,
            Command::Form(FormCommand::Import { force: true, .. })
        ));

        let cli = parse(&["formlogic", "form", "show", "contact"]);
        assert!(matches!(cli.command, Command::Form(FormCommand::Show { ref id }) if id == "contact"));

        let cli = parse(&["formlogic", "form", "list", "--json"]);
        assert!(matches!(cli.command, Command::Form(FormCommand::List { json: true })));

        let cli = parse(&["formlogic", "form", "delete", "contact"]);
        assert!(matches!(cli.command, Command::Form(FormCommand::Delete { .. })));
    }

    #[test]
    fn test_parse_rule_add() {
        let cli = parse(&[
            "formlogic",
            "rule",
            "add",
            "quote",
            "--field",
            "approval_code",
            "--when",
            "budget",
            "--op",
            "greater_than",
            "--value",
            "1000",
            "--action",
            "require",
        ]);
        let Command::Rule(RuleCommand::Add {
            op, action, value, ..
        }) = cli.command
        else {
            panic!("expected rule add");
        };
        assert_eq!(op, Operator::GreaterThan);
        assert_eq!(action, ActionKind::Require);
        assert_eq!(value.as_deref(), Some("1000"));
    }

    #[test]
    fn test_parse_rule_add_rejects_unknown_operator() {
        let result = Cli::try_parse_from([
            "formlogic", "rule", "add", "quote", "--field", "a", "--when", "b", "--op",
            "between", "--action", "show",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_submit_and_submissions() {
        let cli = parse(&["formlogic", "submit", "contact", "--answers", "a.json"]);
        assert!(matches!(cli.command, Command::Submit(ref c) if c.form_id == "contact"));

        let cli = parse(&["formlogic", "submissions", "contact", "-n", "5"]);
        let Command::Submissions(cmd) = cli.command else {
            panic!("expected submissions");
        };
        assert_eq!(cmd.limit, 5);
    }

    #[test]
    fn test_parse_with_config() {
        let cli = parse(&["formlogic", "-c", "/custom/config.toml", "status"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_config_validate() {
        let cli = parse(&["formlogic", "config", "validate", "--file", "x.toml"]);
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { file: Some(_) })
        ));
    }
}
