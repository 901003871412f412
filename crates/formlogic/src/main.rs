//! `formlogic` - CLI for the conditional field rule engine
//!
//! This binary evaluates form rules against answers, validates form
//! definitions, and manages the local store of forms and submissions.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::Value;
use tracing::warn;

use formlogic::cli::{
    Cli, Command, ConfigCommand, EvalCommand, FormCommand, RuleCommand, StatusCommand,
    SubmissionsCommand, SubmitCommand, ValidateCommand,
};
use formlogic::{
    build_submission, init_logging, validate_form, Answers, Config, Error, Evaluation,
    FormDefinition, RuleDraft, RuleEditor, RuleEngine, Storage, ValidationReport,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Eval(cmd) => handle_eval(&config, &cmd),
        Command::Validate(cmd) => handle_validate(&cmd),
        Command::Form(cmd) => handle_form(&config, cmd),
        Command::Rule(cmd) => handle_rule(&config, cmd),
        Command::Submit(cmd) => handle_submit(&config, &cmd),
        Command::Submissions(cmd) => handle_submissions(&config, &cmd),
        Command::Status(cmd) => handle_status(&config, &cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn read_form(path: &Path) -> Result<FormDefinition> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read form definition {}", path.display()))?;
    FormDefinition::from_json(&json)
        .with_context(|| format!("failed to parse form definition {}", path.display()))
}

fn read_answers(form: &FormDefinition, file: Option<&Path>, set: &[String]) -> Result<Answers> {
    let mut answers = match file {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read answers {}", path.display()))?;
            Answers::from_json(&json)
                .with_context(|| format!("failed to parse answers {}", path.display()))?
        }
        None => Answers::new(),
    };

    for assignment in set {
        let (field_id, value) = form.parse_assignment(assignment)?;
        answers.set(field_id, value);
    }
    Ok(answers)
}

/// Read a command-line value as JSON, falling back to a plain string.
fn parse_json_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn open_storage(config: &Config) -> Result<Storage> {
    Ok(Storage::open(config.database_path())?)
}

fn evaluate(config: &Config, form: &FormDefinition, answers: &Answers) -> Evaluation {
    let engine = RuleEngine::new(form, &config.engine);
    let evaluation = engine.evaluate(answers);
    if !evaluation.outcome.converged() {
        warn!(
            form = %form.id,
            passes = evaluation.outcome.passes(),
            "Rules did not settle; the render state may be unstable"
        );
    }
    evaluation
}

fn handle_eval(config: &Config, cmd: &EvalCommand) -> Result<()> {
    let form = read_form(&cmd.form)?;
    let answers = read_answers(&form, cmd.answers.as_deref(), &cmd.set)?;
    let evaluation = evaluate(config, &form, &answers);

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&evaluation)?);
        return Ok(());
    }

    println!("{} ({})", form.title, form.id);
    println!();
    for field in &evaluation.state.fields {
        let value = field
            .value
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string);
        println!(
            "  {:<20} {:<8} {:<9} {}{}",
            field.field_id,
            if field.visible { "visible" } else { "hidden" },
            if field.required { "required" } else { "optional" },
            value,
            if field.forced { " (set by rule)" } else { "" },
        );
    }
    println!();
    if let Some(target) = &evaluation.state.skip_to {
        println!("Skip to:  {target}");
    }
    if evaluation.outcome.converged() {
        println!("Settled after {} pass(es).", evaluation.outcome.passes());
    } else {
        println!(
            "Stopped after {} passes without settling; check for rule cycles.",
            evaluation.outcome.passes()
        );
    }
    Ok(())
}

fn print_report(report: &ValidationReport) {
    for issue in &report.issues {
        eprintln!("{issue}");
    }
}

/// Run save-time validation and store the form only if it has no errors.
fn save_validated(storage: &Storage, form: &FormDefinition) -> Result<()> {
    let report = validate_form(form);
    print_report(&report);
    report.into_result(&form.id)?;
    storage.save_form(form)?;
    Ok(())
}

fn handle_validate(cmd: &ValidateCommand) -> Result<()> {
    let form = read_form(&cmd.form)?;
    let report = validate_form(&form);

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.is_clean() {
        println!("Form '{}' has no rule problems.", form.id);
    } else {
        for issue in &report.issues {
            println!("{issue}");
        }
        println!();
        println!(
            "{} error(s), {} warning(s)",
            report.errors().count(),
            report.warnings().count()
        );
    }

    report.into_result(&form.id)?;
    Ok(())
}

fn handle_form(config: &Config, cmd: FormCommand) -> Result<()> {
    let storage = open_storage(config)?;

    match cmd {
        FormCommand::Import { file, force } => {
            let form = read_form(&file)?;
            let report = validate_form(&form);
            print_report(&report);
            if report.has_errors() && !force {
                report.into_result(&form.id)?;
            }
            let outcome = storage.save_form(&form)?;
            println!("Form '{}' {outcome}.", form.id);
        }
        FormCommand::Show { id } => {
            let form = storage.require_form(&id)?;
            println!("{}", form.to_json_pretty()?);
        }
        FormCommand::List { json } => {
            let forms = storage.list_forms()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&forms)?);
            } else if forms.is_empty() {
                println!("No stored forms.");
            } else {
                for form in forms {
                    println!(
                        "{:<24} {:<32} {:>6} submission(s)  updated {}",
                        form.id,
                        form.title,
                        form.submission_count,
                        form.updated_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }
        FormCommand::Delete { id } => {
            if !storage.delete_form(&id)? {
                return Err(Error::form_not_found(id).into());
            }
            println!("Form '{id}' deleted.");
        }
    }
    Ok(())
}

fn handle_rule(config: &Config, cmd: RuleCommand) -> Result<()> {
    let storage = open_storage(config)?;

    match cmd {
        RuleCommand::List { form_id, field } => {
            let mut form = storage.require_form(&form_id)?;
            let editor = RuleEditor::open(&mut form, &field)?;
            if editor.rules().is_empty() {
                println!("No rules target '{field}'.");
            }
            for rule in editor.rules() {
                let value = rule.value.as_ref().map(ToString::to_string).unwrap_or_default();
                let payload = rule
                    .target_value
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                println!(
                    "{}  when {} {} {} -> {} {}",
                    rule.id, rule.field_id, rule.operator, value, rule.action, payload
                );
            }
        }
        RuleCommand::Add {
            form_id,
            field,
            when,
            op,
            value,
            action,
            target_value,
        } => {
            let mut form = storage.require_form(&form_id)?;
            let mut draft = RuleDraft::new(when, op, action);
            if let Some(value) = value {
                draft = draft.with_value(parse_json_arg(&value));
            }
            if let Some(target_value) = target_value {
                draft = draft.with_target_value(parse_json_arg(&target_value));
            }
            let id = RuleEditor::open(&mut form, &field)?.add(draft)?;
            save_validated(&storage, &form)?;
            println!("{id}");
        }
        RuleCommand::Remove {
            form_id,
            field,
            rule_id,
        } => {
            let mut form = storage.require_form(&form_id)?;
            RuleEditor::open(&mut form, &field)?.remove(&rule_id)?;
            save_validated(&storage, &form)?;
            println!("Rule '{rule_id}' removed.");
        }
    }
    Ok(())
}

fn handle_submit(config: &Config, cmd: &SubmitCommand) -> Result<()> {
    if cmd.answers.is_none() && cmd.set.is_empty() {
        bail!("no answers given; use --answers or --set");
    }

    let storage = open_storage(config)?;
    let form = storage.require_form(&cmd.form_id)?;
    let answers = read_answers(&form, cmd.answers.as_deref(), &cmd.set)?;
    let evaluation = evaluate(config, &form, &answers);

    let mut submission = build_submission(&form, &evaluation.state, &config.submission)?;
    let id = storage.insert_submission(&submission)?;
    submission.id = Some(id);

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&submission)?);
    } else {
        println!("Submission {id} stored for form '{}'.", form.id);
    }
    Ok(())
}

fn handle_submissions(config: &Config, cmd: &SubmissionsCommand) -> Result<()> {
    let storage = open_storage(config)?;
    if !storage.has_form(&cmd.form_id)? {
        return Err(Error::form_not_found(&cmd.form_id).into());
    }
    let submissions = storage.submissions_for(&cmd.form_id, cmd.limit)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&submissions)?);
        return Ok(());
    }

    if submissions.is_empty() {
        println!("No submissions for '{}'.", cmd.form_id);
    }
    for submission in submissions {
        println!(
            "#{:<6} {}  {}",
            submission.id.unwrap_or_default(),
            submission.submitted_at.format("%Y-%m-%d %H:%M:%S"),
            Value::Object(submission.payload)
        );
    }
    Ok(())
}

fn handle_status(config: &Config, cmd: &StatusCommand) -> Result<()> {
    let storage = open_storage(config)?;
    let stats = storage.stats()?;

    if cmd.json {
        let status = serde_json::json!({
            "database_path": storage.path(),
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("formlogic status");
        println!("----------------");
        println!("Database:          {}", storage.path().display());
        println!("Forms:             {}", stats.total_forms);
        println!("Submissions:       {}", stats.total_submissions);
        if let Some(newest) = stats.newest_submission {
            println!("Last submission:   {}", newest.format("%Y-%m-%d %H:%M:%S"));
        }
        println!("Size:              {} bytes", stats.db_size_bytes);
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Engine]");
                println!("  Max passes:         {}", config.engine.max_passes);
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Submission]");
                println!("  Validate email:     {}", config.submission.validate_email);
                println!("  Include hidden:     {}", config.submission.include_hidden);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}
