//! Command handlers.

use anyhow::{Context, Result};
use colored::Colorize;
use fieldtree::{
    Address, BindingContent, Change, EditOp, EditSession, FieldError, FieldRegistry,
    FilePersistence, Persistence, ResolvedBinding, ValueOrigin, lint_schema,
};
use serde_json::Value;

use crate::{
    cli::{Cli, Command},
    config::EditorConfig,
    ctx::AppContext,
};

/// Run the command named on the command line.
pub async fn dispatch(cli: Cli) -> Result<()> {
    if let Command::ConfigSchema = cli.command {
        let schema = EditorConfig::json_schema()?;
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let ctx = AppContext::from_cli(&cli).await?;
    match cli.command {
        Command::Show { scope } => show(&ctx, scope.as_deref()).await,
        Command::Get { address } => get(&ctx, &parse_address(&address)?).await,
        Command::Set { address, value } => {
            let op = EditOp::Set {
                address: parse_address(&address)?,
                value: parse_value(&value),
            };
            apply(&ctx, op).await
        }
        Command::Add { address } => {
            let op = EditOp::Add {
                address: parse_address(&address)?,
            };
            apply(&ctx, op).await
        }
        Command::Delete { address, index } => {
            let op = EditOp::Delete {
                address: parse_address(&address)?,
                index,
            };
            apply(&ctx, op).await
        }
        Command::Swap { address, from, to } => {
            let op = EditOp::Swap {
                address: parse_address(&address)?,
                from,
                to,
            };
            apply(&ctx, op).await
        }
        Command::Check => check(&ctx).await,
        Command::ConfigSchema => Ok(()),
    }
}

fn parse_address(s: &str) -> Result<Address> {
    Address::parse(s).with_context(|| format!("invalid address `{s}`"))
}

/// Parse a command-line value as JSON; anything that is not JSON is taken as
/// a plain string.
pub fn parse_value(s: &str) -> Value {
    serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string()))
}

async fn open(ctx: &AppContext) -> Result<EditSession<FilePersistence>> {
    let session = EditSession::open(
        ctx.persistence(),
        &ctx.doc_id(),
        &ctx.schema_id(),
        ctx.config.session_options(),
    )
    .await?;
    Ok(session)
}

async fn show(ctx: &AppContext, scope: Option<&str>) -> Result<()> {
    let mut session = open(ctx).await?;
    if let Some(scope) = scope {
        let target = parse_address(scope)?;
        enter_path(&mut session, &target)?;
    }

    let resolution = session.bindings()?;
    let title = session
        .schema()
        .title
        .clone()
        .unwrap_or_else(|| ctx.doc.display().to_string());
    println!("{} {}", title.bold(), resolution.scope.address.to_string().dimmed());
    for binding in &resolution.bindings {
        print_binding(binding, 1);
    }
    for problem in &resolution.problems {
        println!("{} {}", "warning:".yellow().bold(), problem.error);
    }
    Ok(())
}

/// Enter every nest between the root and `target`.
fn enter_path(session: &mut EditSession<FilePersistence>, target: &Address) -> Result<()> {
    for n in 1..=target.len() {
        let prefix: Address = target.segments()[..n].iter().cloned().collect();
        match session.enter(&prefix) {
            Ok(_) => {}
            // Sections on the way are not scopes of their own.
            Err(FieldError::NotANest { .. }) | Err(FieldError::AddressResolution { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }
    if &session.scope().address != target {
        bail!("{target} is not a nest scope");
    }
    Ok(())
}

fn print_binding(binding: &ResolvedBinding<'_>, depth: usize) {
    let indent = "  ".repeat(depth);
    let label = binding
        .node
        .title
        .clone()
        .unwrap_or_else(|| binding.node.key.clone());
    let tag = format!("[{}]", binding.node.tag()).dimmed();
    match &binding.content {
        BindingContent::Leaf => {
            let value = match (&binding.value, binding.origin) {
                (Some(v), ValueOrigin::Document) => v.to_string().green(),
                (Some(v), _) => format!("{v} (default)").cyan(),
                (None, _) => "-".dimmed(),
            };
            println!("{indent}{} {tag} {} = {value}", label.bold(), binding.address);
        }
        BindingContent::Group(children) => {
            println!("{indent}{} {tag}", label.bold());
            for child in children {
                print_binding(child, depth + 1);
            }
        }
        BindingContent::List(items) => {
            println!(
                "{indent}{} {tag} {} ({} items)",
                label.bold(),
                binding.address,
                items.len()
            );
            for item in items {
                println!("{indent}  {}", format!("#{}", item.index).blue());
                for field in &item.fields {
                    print_binding(field, depth + 2);
                }
            }
        }
        BindingContent::Navigation { scope } => {
            println!(
                "{indent}{} {tag} {}",
                label.bold(),
                format!("--scope {}", scope.address).magenta()
            );
        }
    }
}

async fn get(ctx: &AppContext, address: &Address) -> Result<()> {
    let session = open(ctx).await?;
    let Some(value) = session.get(address) else {
        bail!("nothing stored at {address}");
    };
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn apply(ctx: &AppContext, op: EditOp) -> Result<()> {
    let report = fieldtree::run(
        ctx.persistence(),
        &ctx.doc_id(),
        &ctx.schema_id(),
        ctx.config.session_options(),
        std::slice::from_ref(&op),
    )
    .await?;

    for change in &report.changes {
        match change {
            Change::Field { address, value } => {
                let value = value
                    .as_ref()
                    .map(Value::to_string)
                    .unwrap_or_else(|| "-".into());
                println!("{} {address} = {value}", "set".green().bold());
            }
            Change::Structural { address, kind } => {
                println!("{} {address}", kind.to_string().green().bold());
            }
        }
    }
    if report.saved {
        info!("saved {}", ctx.doc.display());
        println!("{} {}", "saved".bold(), ctx.doc.display());
    }
    Ok(())
}

async fn check(ctx: &AppContext) -> Result<()> {
    let schema = ctx.persistence().load_schema(&ctx.schema_id()).await?;
    let issues = lint_schema(&schema, &FieldRegistry::with_builtins());
    if issues.is_empty() {
        println!("{} {}", "ok".green().bold(), ctx.schema.display());
        return Ok(());
    }
    for issue in &issues {
        let head = if issue.kind.is_collision() {
            "collision:".yellow().bold()
        } else {
            "error:".red().bold()
        };
        println!("{head} {issue}");
    }
    bail!("{} schema issue(s) in {}", issues.len(), ctx.schema.display())
}
