//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::rule::{ActionKind, Operator};

/// Evaluate a form's rules against a set of answers.
#[derive(Debug, Args)]
pub struct EvalCommand {
    /// Form definition JSON file
    #[arg(short, long, value_name = "FILE")]
    pub form: PathBuf,

    /// Answers JSON file (an object keyed by field id)
    #[arg(short, long, value_name = "FILE")]
    pub answers: Option<PathBuf>,

    /// Set or override one answer (repeatable)
    #[arg(short, long = "set", value_name = "ID=VALUE")]
    pub set: Vec<String>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Check a form definition's rules for problems.
#[derive(Debug, Args)]
pub struct ValidateCommand {
    /// Form definition JSON file
    #[arg(short, long, value_name = "FILE")]
    pub form: PathBuf,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Stored form commands.
#[derive(Debug, Subcommand)]
pub enum FormCommand {
    /// Validate and store a form definition
    Import {
        /// Form definition JSON file
        file: PathBuf,

        /// Store the form even if validation reports errors
        #[arg(long)]
        force: bool,
    },

    /// Print a stored form definition
    Show {
        /// Form id
        id: String,
    },

    /// List stored forms
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Delete a stored form and its submissions
    Delete {
        /// Form id
        id: String,
    },
}

/// Rule editing commands for a stored form.
#[derive(Debug, Subcommand)]
pub enum RuleCommand {
    /// List the rules targeting a field
    List {
        /// Form id
        form_id: String,

        /// Target field id
        #[arg(long, value_name = "ID")]
        field: String,
    },

    /// Add a rule targeting a field
    Add {
        /// Form id
        form_id: String,

        /// Target field id
        #[arg(long, value_name = "ID")]
        field: String,

        /// Trigger field id
        #[arg(long, value_name = "ID")]
        when: String,

        /// Comparison operator (e.g. equals, greater_than, is_empty)
        #[arg(long, value_name = "OPERATOR")]
        op: Operator,

        /// Comparison operand, as JSON or a bare string
        #[arg(long)]
        value: Option<String>,

        /// Action (e.g. show, require, set_value)
        #[arg(long)]
        action: ActionKind,

        /// Action payload, as JSON or a bare string
        #[arg(long, value_name = "VALUE")]
        target_value: Option<String>,
    },

    /// Remove a rule
    Remove {
        /// Form id
        form_id: String,

        /// Target field id
        #[arg(long, value_name = "ID")]
        field: String,

        /// Rule id
        rule_id: String,
    },
}

/// Submit answers to a stored form.
#[derive(Debug, Args)]
pub struct SubmitCommand {
    /// Form id
    pub form_id: String,

    /// Answers JSON file (an object keyed by field id)
    #[arg(short, long, value_name = "FILE")]
    pub answers: Option<PathBuf>,

    /// Set or override one answer (repeatable)
    #[arg(short, long = "set", value_name = "ID=VALUE")]
    pub set: Vec<String>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// List submissions for a stored form.
#[derive(Debug, Args)]
pub struct SubmissionsCommand {
    /// Form id
    pub form_id: String,

    /// Maximum number of results
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
